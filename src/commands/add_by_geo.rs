//! add-by-geo: list or register the IP ranges of a geography.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::aggregator::{count_addresses, merge_ranges, IpRange};
use crate::api::InventoryApi;
use crate::config::{Environment, SecureString};
use crate::geo::{load_databases, FilterArg, GeoFilter};
use crate::retry::{try_multiple_times, with_retries, Backoff};

#[derive(Debug, Clone, Default)]
pub struct GeoOptions {
    pub ipv4_only: bool,
    pub add_to_inventory: bool,
    pub filters: Vec<FilterArg>,
    /// Overrides the databases from the config file when not empty
    pub databases: Vec<PathBuf>,
    /// List CIDR blocks instead of start-end ranges
    pub cidr: bool,
}

/// Outcome of registering ranges
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddSummary {
    pub added: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Run the add-by-geo command
pub async fn run(
    options: GeoOptions,
    api_key: Option<SecureString>,
    config_path: &Path,
    env: Option<Environment>,
) -> Result<()> {
    let config = super::load_config(config_path)?;

    // Fail before reading the databases, which can take a while
    let api = match (options.add_to_inventory, api_key) {
        (true, Some(key)) => Some(super::connect(&config, env, key)?),
        (true, None) => anyhow::bail!("--add-to-inventory requires --apikey"),
        (false, Some(_)) => {
            warn!("--apikey is ignored without --add-to-inventory");
            None
        }
        (false, None) => None,
    };

    let databases = if options.databases.is_empty() {
        config.geo.databases.clone()
    } else {
        options.databases.clone()
    };

    let filter = GeoFilter::new(options.filters.iter().cloned());
    info!("Filter: {}", filter);

    let ranges = merge_ranges(load_databases(&databases, &filter, options.ipv4_only)?);
    info!(
        "{} merged ranges covering {} addresses",
        ranges.len(),
        count_addresses(&ranges)
    );

    match api {
        Some(api) => {
            ensure_single_inventory(&api, config.max_tries).await?;
            let backoff = Backoff::new(
                Duration::from_secs(config.geo.initial_backoff_secs),
                Duration::from_secs(config.geo.max_backoff_secs),
                Duration::from_secs(config.geo.max_wait_secs),
            );
            let summary = add_ranges(&api, &ranges, &backoff, config.max_tries).await?;
            println!(
                "Added {} ranges ({} failed, {} not confirmed).",
                summary.added, summary.failed, summary.timed_out
            );
        }
        None => {
            for line in format_listing(&ranges, options.cidr) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// One line per range, or per CIDR block with `cidr`, prefixed with the range index
pub fn format_listing(ranges: &[IpRange], cidr: bool) -> Vec<String> {
    let mut lines = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.iter().enumerate() {
        if cidr {
            for net in range.to_cidrs() {
                lines.push(format!("{:20}    {}", i, net));
            }
        } else {
            lines.push(format!("{:20}    {}", i, range));
        }
    }
    lines
}

/// Refuse keys that reach more than one inventory
pub async fn ensure_single_inventory(api: &dyn InventoryApi, max_tries: u32) -> Result<()> {
    let list = with_retries(max_tries, "list inventories", || api.find_inventories(0, 0)).await?;
    if !list.is_single_inventory_scope() {
        anyhow::bail!("The API key must be scoped to a single inventory to add ranges");
    }
    Ok(())
}

/// Register each range as a source and wait for the inventory to ingest it.
///
/// A range whose add call exhausts its retries is logged and skipped.
pub async fn add_ranges(
    api: &dyn InventoryApi,
    ranges: &[IpRange],
    backoff: &Backoff,
    max_tries: u32,
) -> Result<AddSummary> {
    let mut summary = AddSummary::default();

    for range in ranges {
        let keyword = range.to_string();
        if try_multiple_times(max_tries, || api.add_ip(&keyword))
            .await
            .is_none()
        {
            warn!("API call failed too many times for {}", keyword);
            summary.failed += 1;
            continue;
        }

        if wait_for_ingestion(api, &keyword, backoff.clone(), max_tries).await? {
            summary.added += 1;
        } else {
            summary.timed_out += 1;
        }
    }
    Ok(summary)
}

/// Poll until the first matching source has been processed.
///
/// An empty search counts as still processing. Returns false once the
/// backoff schedule runs out.
pub async fn wait_for_ingestion(
    api: &dyn InventoryApi,
    keyword: &str,
    mut backoff: Backoff,
    max_tries: u32,
) -> Result<bool> {
    loop {
        let page = with_retries(max_tries, "search sources", || {
            api.search_for_source(0, 0, keyword)
        })
        .await?;

        let processed = page
            .searches
            .first()
            .map(|source| source.dbdata.is_some())
            .unwrap_or(false);
        if processed {
            return Ok(true);
        }

        let remaining = backoff.remaining();
        match backoff.next() {
            Some(delay) => {
                info!("{}: max wait time remaining: {} s", keyword, remaining.as_secs());
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(
                    "{}: not processed after {} s, moving on",
                    keyword,
                    backoff.elapsed().as_secs()
                );
                return Ok(false);
            }
        }
    }
}
