//! report: render the PDF inventory report.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::{inventories, InventoryApi};
use crate::config::{Environment, SecureString};
use crate::report::{
    page_columns, report_filename, rows_by_column, ReportBuilder, ASSET_PAGE, DOMAIN_PAGE, PAGES,
    SUBDOMAIN_PAGE,
};
use crate::retry::with_retries;

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub offset: u64,
    pub limit: u64,
    /// One report per inventory the key can list
    pub multiple: bool,
    /// Override `report.output_dir`
    pub output_dir: Option<PathBuf>,
    /// Override `report.resource_dir`
    pub resource_dir: Option<PathBuf>,
}

/// Run the report command
pub async fn run(
    api_key: SecureString,
    options: ReportOptions,
    config_path: &Path,
    env: Option<Environment>,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.report.output_dir.clone());
    let resource_dir = options
        .resource_dir
        .clone()
        .unwrap_or_else(|| config.report.resource_dir.clone());

    info!("Initializing and pulling assets from Bit Discovery...");
    let api = super::connect(&config, env, api_key.clone())?;
    let targets = inventories(
        &api,
        &api_key,
        options.multiple,
        options.offset,
        options.limit,
        config.max_tries,
    )
    .await?;

    let date = Local::now().date_naive();
    for (name, key) in targets {
        info!("Starting inventory: {}.", name);
        let inventory_api = super::connect(&config, env, key)?;
        let path = render_inventory(
            &inventory_api,
            &name,
            &resource_dir,
            &output_dir,
            date,
            config.max_tries,
        )
        .await?;
        println!("Your report is located at: {}", path.display());
    }
    Ok(())
}

/// Fetch one inventory's dashboard and write its report into `output_dir`.
pub async fn render_inventory(
    api: &dyn InventoryApi,
    name: &str,
    resource_dir: &Path,
    output_dir: &Path,
    date: NaiveDate,
    max_tries: u32,
) -> Result<PathBuf> {
    let columns = page_columns();
    let dashboard = with_retries(max_tries, "get dashboard", || api.get_dashboard(&columns)).await?;
    let stats = &dashboard.stats;
    let data = rows_by_column(&dashboard);

    let mut builder = ReportBuilder::new(name, resource_dir)?;
    builder.add_title_page(date);
    builder.add_count_page(&ASSET_PAGE, stats.total);
    builder.add_count_page(&DOMAIN_PAGE, stats.domaincount);
    builder.add_count_page(&SUBDOMAIN_PAGE, stats.subdomaincount);

    for page in PAGES.iter() {
        info!("\tBuilding page for: {}", page.key);
        let rows = data.get(page.key).copied().unwrap_or(&[]);
        builder.add_graph_page(page, rows, stats.total);
    }

    builder.save(&output_dir.join(report_filename(name, date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Dashboard, MockInventoryApi};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_render_inventory_writes_pdf() {
        let mut api = MockInventoryApi::new();
        api.expect_get_dashboard()
            .withf(|columns| columns.len() == 11 && columns[0] == "ports.ports")
            .times(1)
            .returning(|_| {
                Ok(serde_json::from_str::<Dashboard>(
                    r#"{
                        "stats": {"total": 120, "domaincount": 1, "subdomaincount": 40},
                        "aggregations": [
                            {"column": "ports.ports", "data": [
                                {"name": 443, "value": 100},
                                {"name": 80, "value": 15},
                                {"name": "__missing__", "value": 5}
                            ]},
                            {"column": "ipgeo.country", "data": [{"name": "US", "value": 120}]}
                        ]
                    }"#,
                )
                .unwrap())
            });

        let out = TempDir::new().unwrap();
        let resources = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let path = render_inventory(&api, "Acme Corp", resources.path(), out.path(), date, 5)
            .await
            .unwrap();

        assert_eq!(path, out.path().join("Acme_Corp-20240502.pdf"));
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_dashboard_failure_writes_nothing() {
        let mut api = MockInventoryApi::new();
        api.expect_get_dashboard()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("HTTP 502")));

        let out = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let result = render_inventory(&api, "Acme", out.path(), out.path(), date, 2).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
