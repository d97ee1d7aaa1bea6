//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cloud::ProviderKind;
use crate::commands::delete::DeleteKind;
use crate::config::{Environment, SecureString, DEFAULT_CONFIG_PATH};
use crate::geo::FilterArg;

#[derive(Parser)]
#[command(name = "asm-sync")]
#[command(
    author,
    version,
    about = "Sync an attack surface management inventory with cloud and geolocation IP data"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Inventory environment (overrides the config file)
    #[arg(long, value_enum, global = true)]
    pub env: Option<Environment>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add live cloud IPs (and AWS S3 buckets) missing from the inventory
    CloudSync {
        /// Cloud provider to read
        #[arg(value_enum)]
        provider: ProviderKind,

        /// API key of the inventory
        #[arg(value_name = "APIKEY")]
        apikey: SecureString,

        /// Offset of the first page
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Page size for inventory searches
        #[arg(long, default_value_t = 5000)]
        limit: u64,

        /// Reconcile and report, but add nothing
        #[arg(long)]
        dry_run: bool,

        /// Compare against sources only, not discovered assets
        #[arg(long)]
        sources_only: bool,
    },

    /// List IP ranges by geography and optionally add them to the inventory
    AddByGeo {
        /// Do not report IPv6 ranges
        #[arg(short = '4', long = "ipv4-only")]
        ipv4_only: bool,

        /// Register the merged ranges as sources (requires --apikey)
        #[arg(long, requires = "apikey")]
        add_to_inventory: bool,

        /// API key scoped to a single inventory
        #[arg(long, value_name = "APIKEY")]
        apikey: Option<SecureString>,

        /// KEY=VALUE criteria, KEY in ANY, COUNTRY_CODE, COUNTRY_NAME, REGION, CITY
        #[arg(short, long, num_args = 1.., value_name = "KEY=VALUE")]
        filter: Vec<FilterArg>,

        /// Geolocation CSV files (default: geo.databases from the config)
        #[arg(long, value_name = "PATH")]
        database: Vec<PathBuf>,

        /// List CIDR blocks instead of start-end ranges
        #[arg(long, conflicts_with = "add_to_inventory")]
        cidr: bool,
    },

    /// Delete an IP or a source from the inventory
    Delete {
        /// API key of the inventory
        #[arg(value_name = "APIKEY")]
        apikey: SecureString,

        /// Type of the item to delete
        #[arg(value_enum, value_name = "TYPE")]
        kind: DeleteKind,

        /// The IP or source to delete
        #[arg(value_name = "IP/SOURCE")]
        value: String,

        /// Offset of the first page
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Page size for inventory searches
        #[arg(long, default_value_t = 5000)]
        limit: u64,
    },

    /// Render the PDF inventory report
    Report {
        /// API key of the inventory
        #[arg(value_name = "APIKEY")]
        apikey: SecureString,

        /// Offset into the inventory list
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Limit of the inventory list
        #[arg(long, default_value_t = 500)]
        limit: u64,

        /// One report for every inventory the key can list
        #[arg(long)]
        multiple: bool,

        /// Directory for finished reports (default: report.output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Directory with optional fonts (default: report.resource_dir)
        #[arg(long)]
        resource_dir: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}
