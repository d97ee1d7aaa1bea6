//! Inventory REST API client.
//!
//! The [`InventoryApi`] trait is the seam between command flows and the HTTP
//! transport, so flows can be exercised against a mock in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::config::SecureString;
use crate::error::AsmError;
use crate::retry::with_retries;
use crate::utils::truncate;

const TIMEOUT_SECS: u64 = 30;

/// Message returned by the inventory list endpoint for single-inventory keys
pub const SINGLE_INVENTORY_MESSAGE: &str = "Your API access is limited to a single inventory.";

/// Accept a JSON number, a numeric string or null as a count.
fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid count: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid count: {}", s))),
        other => Err(serde::de::Error::custom(format!("invalid count: {}", other))),
    }
}

/// Accept any JSON scalar as a string (ids and names come back as either).
fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Response of the inventory list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryList {
    #[serde(rename = "actualInventory", default)]
    pub actual_inventory: Option<InventorySummary>,
    #[serde(default)]
    pub list: Vec<InventorySummary>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl InventoryList {
    /// Whether the server reported that the key only reaches one inventory
    pub fn is_single_inventory_scope(&self) -> bool {
        self.code == Some(400) && self.message.as_deref() == Some(SINGLE_INVENTORY_MESSAGE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventorySummary {
    pub inventory_name: String,
    #[serde(default)]
    pub api_key: Option<SecureString>,
}

/// One page of an inventory or source search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(deserialize_with = "de_count")]
    pub total: u64,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub searches: Vec<Source>,
}

impl SearchPage {
    /// Id of the last entry on the page, used as the next cursor
    pub fn last_id(&self) -> Option<String> {
        self.assets
            .last()
            .map(|a| a.id.clone())
            .or_else(|| self.searches.last().map(|s| s.id.clone()))
            .filter(|id| !id.is_empty())
    }
}

/// Inventory asset; only the fields the tools read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Asset {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,
    #[serde(rename = "bd.ip_address", default)]
    pub ip_address: Option<String>,
}

/// Registered source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub search_type: Option<String>,
    /// Filled in once the service has processed the source
    #[serde(default)]
    pub dbdata: Option<Value>,
}

/// Dashboard aggregation response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    #[serde(default)]
    pub aggregations: Vec<Aggregation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardStats {
    #[serde(default, deserialize_with = "de_count")]
    pub total: u64,
    #[serde(default, deserialize_with = "de_count")]
    pub domaincount: u64,
    #[serde(default, deserialize_with = "de_count")]
    pub subdomaincount: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Aggregation {
    pub column: String,
    #[serde(default)]
    pub data: Vec<AggregationRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AggregationRow {
    #[serde(default, deserialize_with = "de_string")]
    pub name: String,
    #[serde(default, deserialize_with = "de_count")]
    pub value: u64,
}

/// Operations the tools need from the inventory service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// List inventories reachable with the key
    async fn find_inventories(&self, offset: u64, limit: u64) -> Result<InventoryList>;

    /// Aggregated statistics for the given columns
    async fn get_dashboard(&self, columns: &[String]) -> Result<Dashboard>;

    /// Page through all assets
    async fn search_inventory(&self, limit: u64, after: Option<String>) -> Result<SearchPage>;

    /// Page through assets whose IP equals `ip`
    async fn search_for_ip_address(
        &self,
        limit: u64,
        after: Option<String>,
        ip: &str,
    ) -> Result<SearchPage>;

    /// Page through sources matching `search`
    async fn search_for_source(&self, limit: u64, offset: u64, search: &str) -> Result<SearchPage>;

    /// Register an IP, IP range or CIDR as a source
    async fn add_ip(&self, ip: &str) -> Result<()>;

    /// Register a keyword (domain, bucket URL) as a source
    async fn add_source(&self, keyword: &str) -> Result<()>;

    /// Hide an asset from the inventory
    async fn archive_asset(&self, id: &str) -> Result<()>;

    /// Remove a source
    async fn delete_source(&self, id: &str) -> Result<()>;
}

/// HTTP implementation of [`InventoryApi`]
pub struct BitDiscoveryClient {
    client: Client,
    base_url: String,
    api_key: SecureString,
}

impl BitDiscoveryClient {
    /// Create a client for one API base URL and key
    pub fn new(base_url: &str, api_key: SecureString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("asm-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    fn with_client(client: Client, base_url: &str, api_key: SecureString) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, self.api_key.as_str())
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, self.api_key.as_str())
    }

    /// Filter body matching every hostname
    fn all_hostnames() -> Value {
        json!([{ "column": "bd.original_hostname", "type": "ends with", "value": "" }])
    }

    /// Parse a JSON body, failing on any non-2xx status
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AsmError::UnexpectedResponse(format!(
                "HTTP {}: '{}'",
                status,
                truncate(&body, 200)
            ))
            .into());
        }
        Self::parse_body(response).await
    }

    /// Parse a JSON body whatever the status. The inventory list answers a
    /// single-inventory key with a 400 whose body still has to be read.
    async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_server_error() {
            anyhow::bail!("HTTP {}", status);
        }
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        serde_json::from_str(&body).map_err(|e| {
            AsmError::UnexpectedResponse(format!(
                "HTTP {}: {} in '{}'",
                status,
                e,
                truncate(&body, 200)
            ))
            .into()
        })
    }

    async fn send_checked(request: RequestBuilder) -> Result<()> {
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl InventoryApi for BitDiscoveryClient {
    async fn find_inventories(&self, offset: u64, limit: u64) -> Result<InventoryList> {
        let response = self
            .get("/inventories/list")
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("forcescreenshots", "false".to_string()),
            ])
            .send()
            .await?;
        Self::parse_body(response).await
    }

    async fn get_dashboard(&self, columns: &[String]) -> Result<Dashboard> {
        let response = self
            .post("/dashboard")
            .query(&[("columns", columns.join(","))])
            .json(&Self::all_hostnames())
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn search_inventory(&self, limit: u64, after: Option<String>) -> Result<SearchPage> {
        let mut query = vec![("limit", limit.to_string())];
        match after {
            Some(after) => query.push(("after", after)),
            None => query.push(("offset", "0".to_string())),
        }
        query.push(("sortorder", "true".to_string()));
        query.push(("inventory", "false".to_string()));

        let response = self
            .post("/inventory")
            .query(&query)
            .json(&Self::all_hostnames())
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn search_for_ip_address(
        &self,
        limit: u64,
        after: Option<String>,
        ip: &str,
    ) -> Result<SearchPage> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after));
        }
        query.push(("sortorder", "true".to_string()));
        query.push(("columns", "id,bd.ip_address".to_string()));

        let response = self
            .post("/inventory")
            .query(&query)
            .json(&json!([{ "column": "bd.ip_address", "type": "is", "value": ip }]))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn search_for_source(&self, limit: u64, offset: u64, search: &str) -> Result<SearchPage> {
        let response = self
            .get("/sources")
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("search", search.to_string()),
            ])
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn add_ip(&self, ip: &str) -> Result<()> {
        debug!("Adding IP source {}", ip);
        Self::send_checked(self.post("/source/ip/add").json(&json!({ "ip": ip }))).await
    }

    async fn add_source(&self, keyword: &str) -> Result<()> {
        debug!("Adding source {}", keyword);
        Self::send_checked(
            self.post("/source/add")
                .query(&[("as_subdomain", "true"), ("dont_discover", "true")])
                .json(&json!({ "keyword": keyword })),
        )
        .await
    }

    async fn archive_asset(&self, id: &str) -> Result<()> {
        debug!("Archiving asset {}", id);
        Self::send_checked(
            self.post("/asset/hide")
                .json(&json!([{ "id": id, "hidden": true }])),
        )
        .await
    }

    async fn delete_source(&self, id: &str) -> Result<()> {
        debug!("Deleting source {}", id);
        Self::send_checked(self.post(&format!("/source/{}/delete", id))).await
    }
}

/// Position in a paginated search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    /// Id of the last entry seen, `None` for the first page
    pub after: Option<String>,
    /// Offset of the page being requested
    pub offset: u64,
}

/// Fetch every page of a search.
///
/// The first page is requested without a cursor id. After each page the
/// cursor takes that page's last id and the offset advances by `limit`;
/// paging stops once the offset passes the `total` reported by the first
/// page. Each page is retried up to `max_tries` times and exhaustion aborts.
pub async fn paginate<F, Fut>(
    start_offset: u64,
    limit: u64,
    max_tries: u32,
    operation: &str,
    mut fetch: F,
) -> Result<Vec<SearchPage>>
where
    F: FnMut(PageCursor) -> Fut,
    Fut: Future<Output = Result<SearchPage>>,
{
    if limit == 0 {
        return Err(AsmError::Config("page limit must be at least 1".to_string()).into());
    }

    let mut pages: Vec<SearchPage> = Vec::new();
    let mut cursor = PageCursor {
        after: None,
        offset: start_offset,
    };

    loop {
        let request = cursor.clone();
        let page = with_retries(max_tries, operation, || fetch(request.clone())).await?;
        let total = pages.first().map_or(page.total, |first| first.total);

        if let Some(id) = page.last_id() {
            cursor.after = Some(id);
        }
        cursor.offset += limit;
        pages.push(page);

        if cursor.offset > total {
            break;
        }
        info!(
            "\t\t{:.0}% complete.",
            cursor.offset as f64 / total.max(1) as f64 * 100.0
        );
    }

    Ok(pages)
}

/// Name of the inventory the key is scoped to
pub async fn current_inventory(
    api: &dyn InventoryApi,
    offset: u64,
    limit: u64,
    max_tries: u32,
) -> Result<String> {
    let list = with_retries(max_tries, "list inventories", || {
        api.find_inventories(offset, limit)
    })
    .await?;

    list.actual_inventory
        .map(|inventory| inventory.inventory_name)
        .ok_or_else(|| {
            AsmError::UnexpectedResponse("inventory list has no actualInventory".to_string())
                .into()
        })
}

/// Inventories to process as `(name, api key)` pairs.
///
/// With `multiple` every listed inventory is returned with its own key,
/// otherwise only the inventory the given key is scoped to.
pub async fn inventories(
    api: &dyn InventoryApi,
    api_key: &SecureString,
    multiple: bool,
    offset: u64,
    limit: u64,
    max_tries: u32,
) -> Result<Vec<(String, SecureString)>> {
    let list = with_retries(max_tries, "list inventories", || {
        api.find_inventories(offset, limit)
    })
    .await?;

    if multiple {
        return list
            .list
            .into_iter()
            .map(|inventory| match inventory.api_key {
                Some(key) => Ok((inventory.inventory_name, key)),
                None => Err(AsmError::UnexpectedResponse(format!(
                    "inventory '{}' has no api_key",
                    inventory.inventory_name
                ))
                .into()),
            })
            .collect();
    }

    let name = list
        .actual_inventory
        .map(|inventory| inventory.inventory_name)
        .ok_or_else(|| {
            AsmError::UnexpectedResponse("inventory list has no actualInventory".to_string())
        })?;
    Ok(vec![(name, api_key.clone())])
}
