//! cloud-sync: push live cloud IPs and buckets into the inventory.

use anyhow::Result;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{current_inventory, paginate, InventoryApi};
use crate::cloud::{count_within, create_provider, CloudProvider, ProviderKind};
use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::{Environment, SecureString};
use crate::fetcher::Fetcher;
use crate::reconcile::{build_superset, remove_matches};
use crate::retry::with_retries;
use crate::utils::format_count_with_separator;

/// Source type of IP and IP range sources
const IPRANGE_SEARCH_TYPE: &str = "iprange";

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub offset: u64,
    pub limit: u64,
    pub dry_run: bool,
    /// Only compare against sources, ignoring discovered asset IPs
    pub sources_only: bool,
}

/// What one sync did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub inventory: String,
    pub added_ips: Vec<IpAddr>,
    pub added_buckets: Vec<String>,
    pub stale_ips: BTreeSet<IpAddr>,
}

/// Run the cloud-sync command
pub async fn run(
    kind: ProviderKind,
    api_key: SecureString,
    options: SyncOptions,
    config_path: &Path,
    env: Option<Environment>,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let api = super::connect(&config, env, api_key)?;
    let provider = create_provider(
        kind,
        Arc::new(Fetcher::new()?),
        Arc::new(RealCommandExecutor::new()),
    );

    if options.dry_run {
        info!("Dry run: nothing will be added to the inventory");
    }

    let summary = sync_inventory(&api, provider.as_ref(), &options, config.max_tries).await?;

    let verb = if options.dry_run { "Would add" } else { "Added" };
    println!(
        "{} {} {} IPs to {}.",
        verb,
        format_count_with_separator(summary.added_ips.len() as u64),
        provider.name(),
        summary.inventory
    );
    if !summary.added_buckets.is_empty() {
        println!(
            "{} {} buckets.",
            verb,
            format_count_with_separator(summary.added_buckets.len() as u64)
        );
    }
    println!(
        "{} inventory IPs are no longer live in {}.",
        format_count_with_separator(summary.stale_ips.len() as u64),
        provider.name()
    );
    Ok(())
}

/// Single IP keywords of every `iprange` source; ranges and CIDRs are skipped
pub async fn collect_source_ips(
    api: &dyn InventoryApi,
    options: &SyncOptions,
    max_tries: u32,
) -> Result<BTreeSet<IpAddr>> {
    let limit = options.limit;
    let pages = paginate(options.offset, limit, max_tries, "list sources", |cursor| {
        api.search_for_source(limit, cursor.offset, "")
    })
    .await?;

    Ok(pages
        .iter()
        .flat_map(|page| &page.searches)
        .filter(|source| source.search_type.as_deref() == Some(IPRANGE_SEARCH_TYPE))
        .filter_map(|source| source.keyword.as_deref())
        .filter_map(|keyword| keyword.trim().to_lowercase().parse::<IpAddr>().ok())
        .collect())
}

/// IP addresses of every discovered asset
pub async fn collect_asset_ips(
    api: &dyn InventoryApi,
    options: &SyncOptions,
    max_tries: u32,
) -> Result<BTreeSet<IpAddr>> {
    let limit = options.limit;
    let pages = paginate(options.offset, limit, max_tries, "search inventory", |cursor| {
        api.search_inventory(limit, cursor.after)
    })
    .await?;

    Ok(pages
        .iter()
        .flat_map(|page| &page.assets)
        .filter_map(|asset| asset.ip_address.as_deref())
        .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
        .collect())
}

/// Reconcile one inventory with a provider and add what is missing.
pub async fn sync_inventory(
    api: &dyn InventoryApi,
    provider: &dyn CloudProvider,
    options: &SyncOptions,
    max_tries: u32,
) -> Result<SyncSummary> {
    let inventory = current_inventory(api, options.offset, options.limit, max_tries).await?;
    info!("Starting sources for: {}.", inventory);

    let mut source_ips = collect_source_ips(api, options, max_tries).await?;
    let mut asset_ips = if options.sources_only {
        BTreeSet::new()
    } else {
        info!("\tCollecting asset IPs");
        collect_asset_ips(api, options, max_tries).await?
    };
    debug!(
        "{} source IPs, {} asset IPs",
        source_ips.len(),
        asset_ips.len()
    );
    let superset = build_superset(&asset_ips, &source_ips);

    info!("\tWe're on {}, so processing accordingly", provider.name());
    info!("\t\tGetting and parsing all of {}'s public IP space", provider.name());
    let ranges = provider.get_ip_ranges().await?;

    info!("\t\tGetting and parsing your public IPs");
    let live_ips = provider.get_instance_ips()?;
    info!(
        "\t\t{} live IPs, {} inside {}'s published ranges",
        live_ips.len(),
        count_within(&live_ips, &ranges),
        provider.name()
    );

    info!("\t\tIgnoring assets that haven't changed.");
    let result = remove_matches(superset, &mut asset_ips, &mut source_ips, live_ips);

    info!("\t\tAdding new IPs");
    let mut added_ips = Vec::with_capacity(result.new_ips.len());
    for ip in &result.new_ips {
        let ip_str = ip.to_string();
        if options.dry_run {
            info!("\t\t\t{} (dry run)", ip_str);
        } else {
            with_retries(max_tries, "add IP", || api.add_ip(&ip_str)).await?;
            debug!("\t\t\tAdded {}", ip_str);
        }
        added_ips.push(*ip);
    }

    let endpoints = provider.storage_endpoints()?;
    let mut added_buckets = Vec::with_capacity(endpoints.len());
    if !endpoints.is_empty() {
        info!("\t\tAdding storage buckets.");
    }
    for endpoint in endpoints {
        if options.dry_run {
            info!("\t\t\t{} (dry run)", endpoint);
        } else {
            with_retries(max_tries, "add source", || api.add_source(&endpoint)).await?;
        }
        added_buckets.push(endpoint);
    }

    info!(
        "\t{} inventory IPs are no longer live",
        result.stale_ips.len()
    );
    for ip in &result.stale_ips {
        debug!("\t\tStale: {}", ip);
    }

    Ok(SyncSummary {
        inventory,
        added_ips,
        added_buckets,
        stale_ips: result.stale_ips,
    })
}
