//! Google Cloud adapter.

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use super::{parse_ips, parse_prefixes, CloudProvider};
use crate::cmd_abstraction::{run_json, CommandExecutor};
use crate::fetcher::Fetcher;

const GCP_IP_RANGES_URL: &str = "https://www.gstatic.com/ipranges/cloud.json";

#[derive(Debug, Deserialize)]
struct GcpRanges {
    #[serde(default)]
    prefixes: Vec<GcpPrefix>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcpPrefix {
    ipv4_prefix: Option<String>,
    ipv6_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

/// Google Cloud adapter: public feed for ranges, `gcloud` for instance IPs
pub struct GoogleCloudProvider {
    fetcher: Arc<Fetcher>,
    executor: Arc<dyn CommandExecutor>,
}

impl GoogleCloudProvider {
    pub fn new(fetcher: Arc<Fetcher>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { fetcher, executor }
    }
}

fn parse_gcp_ranges(content: &GcpRanges) -> BTreeSet<IpNet> {
    parse_prefixes(content.prefixes.iter().flat_map(|p| {
        p.ipv4_prefix
            .as_deref()
            .into_iter()
            .chain(p.ipv6_prefix.as_deref())
    }))
}

fn instance_nat_ips(instances: &[Instance]) -> BTreeSet<IpAddr> {
    parse_ips(
        instances
            .iter()
            .flat_map(|i| &i.network_interfaces)
            .flat_map(|n| &n.access_configs)
            .filter_map(|c| c.nat_ip.as_deref()),
    )
}

#[async_trait]
impl CloudProvider for GoogleCloudProvider {
    fn name(&self) -> &'static str {
        "Google Cloud"
    }

    async fn get_ip_ranges(&self) -> Result<BTreeSet<IpNet>> {
        let ranges: GcpRanges = self.fetcher.get_json(GCP_IP_RANGES_URL).await?;
        Ok(parse_gcp_ranges(&ranges))
    }

    fn get_instance_ips(&self) -> Result<BTreeSet<IpAddr>> {
        let instances: Vec<Instance> = run_json(
            self.executor.as_ref(),
            "gcloud",
            &["compute", "instances", "list", "--format=json"],
        )?;
        Ok(instance_nat_ips(&instances))
    }
}
