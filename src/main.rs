//! asm-sync - Attack Surface Inventory Sync
//!
//! Command-line entry point for the cloud, geolocation, delete and report tools.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use asm_sync::cli::{Cli, Commands};
use asm_sync::commands::add_by_geo::GeoOptions;
use asm_sync::commands::report::ReportOptions;
use asm_sync::commands::sync::SyncOptions;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Diagnostics go to stderr so listings on stdout stay pipeable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::CloudSync {
            provider,
            apikey,
            offset,
            limit,
            dry_run,
            sources_only,
        } => {
            let options = SyncOptions {
                offset,
                limit,
                dry_run,
                sources_only,
            };
            asm_sync::commands::sync::run(provider, apikey, options, &cli.config, cli.env).await
        }
        Commands::AddByGeo {
            ipv4_only,
            add_to_inventory,
            apikey,
            filter,
            database,
            cidr,
        } => {
            let options = GeoOptions {
                ipv4_only,
                add_to_inventory,
                filters: filter,
                databases: database,
                cidr,
            };
            asm_sync::commands::add_by_geo::run(options, apikey, &cli.config, cli.env).await
        }
        Commands::Delete {
            apikey,
            kind,
            value,
            offset,
            limit,
        } => {
            asm_sync::commands::delete::run(apikey, kind, &value, offset, limit, &cli.config, cli.env)
                .await
        }
        Commands::Report {
            apikey,
            offset,
            limit,
            multiple,
            output_dir,
            resource_dir,
        } => {
            let options = ReportOptions {
                offset,
                limit,
                multiple,
                output_dir,
                resource_dir,
            };
            asm_sync::commands::report::run(apikey, options, &cli.config, cli.env).await
        }
        Commands::InitConfig { force } => asm_sync::commands::init::run(&cli.config, force),
        Commands::Version => {
            println!("asm-sync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
