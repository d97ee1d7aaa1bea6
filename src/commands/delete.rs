//! delete: archive assets with an IP and delete matching sources.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

use crate::api::{current_inventory, paginate, InventoryApi};
use crate::config::{Environment, SecureString};
use crate::retry::with_retries;

/// What to delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeleteKind {
    /// Archive assets with this IP, then delete sources matching it
    Ip,
    /// Delete sources matching the keyword
    Source,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub archived_assets: usize,
    pub deleted_sources: usize,
}

impl DeleteSummary {
    pub fn total(&self) -> usize {
        self.archived_assets + self.deleted_sources
    }
}

/// Run the delete command
pub async fn run(
    api_key: SecureString,
    kind: DeleteKind,
    value: &str,
    offset: u64,
    limit: u64,
    config_path: &Path,
    env: Option<Environment>,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let api = super::connect(&config, env, api_key)?;

    let summary = delete(&api, kind, value, offset, limit, config.max_tries).await?;
    println!("Deleted a total of {} items.", summary.total());
    Ok(())
}

/// Delete `value` from the inventory the API key is scoped to.
pub async fn delete(
    api: &dyn InventoryApi,
    kind: DeleteKind,
    value: &str,
    offset: u64,
    limit: u64,
    max_tries: u32,
) -> Result<DeleteSummary> {
    let inventory = current_inventory(api, offset, limit, max_tries).await?;
    let mut summary = DeleteSummary::default();

    if kind == DeleteKind::Ip {
        info!("Starting inventory: {}.", inventory);
        summary.archived_assets = archive_assets(api, value, offset, limit, max_tries).await?;
    }

    info!("Starting sources for: {}.", inventory);
    summary.deleted_sources = delete_sources(api, value, offset, limit, max_tries).await?;
    Ok(summary)
}

/// Archive every asset whose IP is exactly `ip`
async fn archive_assets(
    api: &dyn InventoryApi,
    ip: &str,
    offset: u64,
    limit: u64,
    max_tries: u32,
) -> Result<usize> {
    let pages = paginate(offset, limit, max_tries, "search IP address", |cursor| {
        api.search_for_ip_address(limit, cursor.after, ip)
    })
    .await?;

    let mut archived = 0;
    for asset in pages.iter().flat_map(|page| &page.assets) {
        if asset.ip_address.as_deref() == Some(ip) {
            with_retries(max_tries, "archive asset", || api.archive_asset(&asset.id)).await?;
            debug!("\tArchived asset {}", asset.id);
            archived += 1;
        }
    }
    Ok(archived)
}

/// Delete every source whose keyword equals `value`, ignoring case
async fn delete_sources(
    api: &dyn InventoryApi,
    value: &str,
    offset: u64,
    limit: u64,
    max_tries: u32,
) -> Result<usize> {
    let pages = paginate(offset, limit, max_tries, "search sources", |cursor| {
        api.search_for_source(limit, cursor.offset, value)
    })
    .await?;

    let wanted = value.to_lowercase();
    let mut deleted = 0;
    for source in pages.iter().flat_map(|page| &page.searches) {
        let matches = source
            .keyword
            .as_deref()
            .map(|keyword| keyword.to_lowercase() == wanted)
            .unwrap_or(false);
        if matches {
            with_retries(max_tries, "delete source", || api.delete_source(&source.id)).await?;
            debug!("\tDeleted source {}", source.id);
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Asset, InventoryList, InventorySummary, MockInventoryApi, SearchPage, Source};

    fn scoped_api() -> MockInventoryApi {
        let mut api = MockInventoryApi::new();
        api.expect_find_inventories().returning(|_, _| {
            Ok(InventoryList {
                actual_inventory: Some(InventorySummary {
                    inventory_name: "Acme".to_string(),
                    api_key: None,
                }),
                ..Default::default()
            })
        });
        api
    }

    fn source(id: &str, keyword: &str) -> Source {
        Source {
            id: id.to_string(),
            keyword: Some(keyword.to_string()),
            ..Default::default()
        }
    }

    fn asset(id: &str, ip: &str) -> Asset {
        Asset {
            id: id.to_string(),
            ip_address: Some(ip.to_string()),
        }
    }

    #[tokio::test]
    async fn test_delete_ip_archives_and_deletes() {
        let mut api = scoped_api();
        api.expect_search_for_ip_address()
            .withf(|_, after, ip| after.is_none() && ip == "10.0.0.1")
            .times(1)
            .returning(|_, _, _| {
                Ok(SearchPage {
                    total: 2,
                    assets: vec![asset("a1", "10.0.0.1"), asset("a2", "10.0.0.10")],
                    ..Default::default()
                })
            });
        api.expect_archive_asset()
            .withf(|id| id == "a1")
            .times(1)
            .returning(|_| Ok(()));
        api.expect_search_for_source()
            .withf(|_, _, search| search == "10.0.0.1")
            .times(1)
            .returning(|_, _, _| {
                Ok(SearchPage {
                    total: 2,
                    searches: vec![source("s1", "10.0.0.1"), source("s2", "10.0.0.1-10.0.0.9")],
                    ..Default::default()
                })
            });
        api.expect_delete_source()
            .withf(|id| id == "s1")
            .times(1)
            .returning(|_| Ok(()));

        let summary = delete(&api, DeleteKind::Ip, "10.0.0.1", 0, 5000, 5).await.unwrap();
        assert_eq!(
            summary,
            DeleteSummary {
                archived_assets: 1,
                deleted_sources: 1
            }
        );
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn test_delete_source_is_case_insensitive_and_skips_assets() {
        let mut api = scoped_api();
        api.expect_search_for_ip_address().times(0);
        api.expect_search_for_source().returning(|_, _, _| {
            Ok(SearchPage {
                total: 2,
                searches: vec![source("s1", "Example.COM"), source("s2", "sub.example.com")],
                ..Default::default()
            })
        });
        api.expect_delete_source()
            .withf(|id| id == "s1")
            .times(1)
            .returning(|_| Ok(()));

        let summary = delete(&api, DeleteKind::Source, "example.com", 0, 5000, 5)
            .await
            .unwrap();
        assert_eq!(summary.deleted_sources, 1);
        assert_eq!(summary.archived_assets, 0);
    }

    #[tokio::test]
    async fn test_source_pages_advance_by_offset() {
        let mut api = scoped_api();
        api.expect_search_for_source()
            .withf(|limit, offset, _| *limit == 1 && *offset == 0)
            .times(1)
            .returning(|_, _, _| {
                Ok(SearchPage {
                    total: 2,
                    searches: vec![source("s1", "x")],
                    ..Default::default()
                })
            });
        api.expect_search_for_source()
            .withf(|limit, offset, _| *limit == 1 && *offset == 1)
            .times(1)
            .returning(|_, _, _| {
                Ok(SearchPage {
                    total: 2,
                    searches: vec![source("s2", "x")],
                    ..Default::default()
                })
            });
        api.expect_search_for_source()
            .withf(|_, offset, _| *offset == 2)
            .times(1)
            .returning(|_, _, _| Ok(SearchPage::default()));
        api.expect_delete_source().times(2).returning(|_| Ok(()));

        let summary = delete(&api, DeleteKind::Source, "X", 0, 1, 5).await.unwrap();
        assert_eq!(summary.deleted_sources, 2);
    }

    #[tokio::test]
    async fn test_archive_exhaustion_aborts() {
        let mut api = scoped_api();
        api.expect_search_for_ip_address().returning(|_, _, _| {
            Ok(SearchPage {
                total: 1,
                assets: vec![asset("a1", "10.0.0.1")],
                ..Default::default()
            })
        });
        api.expect_archive_asset()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("HTTP 503")));

        let result = delete(&api, DeleteKind::Ip, "10.0.0.1", 0, 5000, 2).await;
        assert!(result.is_err());
    }
}
