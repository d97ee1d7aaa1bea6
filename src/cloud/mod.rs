//! Cloud provider adapters (AWS, Google Cloud, Azure).

mod aws;
mod azure;
mod gcp;

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

pub use aws::AwsProvider;
pub use azure::AzureProvider;
pub use gcp::GoogleCloudProvider;

use crate::cmd_abstraction::CommandExecutor;
use crate::fetcher::Fetcher;

/// Supported providers, named as on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    #[value(name = "amazon-ec2")]
    AmazonEc2,
    #[value(name = "google-cloud")]
    GoogleCloud,
    #[value(name = "azure")]
    Azure,
}

/// Trait for cloud providers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Display name
    fn name(&self) -> &'static str;

    /// Every range the provider publishes as its own address space
    async fn get_ip_ranges(&self) -> Result<BTreeSet<IpNet>>;

    /// Public IPs of the logged-in account's running instances
    fn get_instance_ips(&self) -> Result<BTreeSet<IpAddr>>;

    /// Storage endpoints (bucket URLs) to register as sources
    fn storage_endpoints(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Create a provider adapter
pub fn create_provider(
    kind: ProviderKind,
    fetcher: Arc<Fetcher>,
    executor: Arc<dyn CommandExecutor>,
) -> Box<dyn CloudProvider> {
    match kind {
        ProviderKind::AmazonEc2 => Box::new(AwsProvider::new(fetcher, executor)),
        ProviderKind::GoogleCloud => Box::new(GoogleCloudProvider::new(fetcher, executor)),
        ProviderKind::Azure => Box::new(AzureProvider::new(fetcher, executor)),
    }
}

/// Parse CIDR strings, skipping anything malformed
pub(crate) fn parse_prefixes<'a>(prefixes: impl IntoIterator<Item = &'a str>) -> BTreeSet<IpNet> {
    prefixes
        .into_iter()
        .filter_map(|p| p.trim().parse::<IpNet>().ok())
        .collect()
}

/// Parse IP strings, skipping anything malformed
pub(crate) fn parse_ips<'a>(ips: impl IntoIterator<Item = &'a str>) -> BTreeSet<IpAddr> {
    ips.into_iter()
        .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Count how many addresses fall inside any of the ranges
pub fn count_within(ips: &BTreeSet<IpAddr>, ranges: &BTreeSet<IpNet>) -> usize {
    ips.iter()
        .filter(|ip| ranges.iter().any(|net| net.contains(*ip)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::MockCommandExecutor;

    #[test]
    fn test_parse_prefixes_skips_invalid() {
        let prefixes = parse_prefixes(["10.0.0.0/8", "bogus", " 2600:1f00::/24 ", "1.2.3.4/33"]);
        assert_eq!(prefixes.len(), 2);
    }

    #[test]
    fn test_parse_ips_skips_invalid() {
        let ips = parse_ips(["1.2.3.4", "", "None", "::1", "1.2.3.4"]);
        assert_eq!(ips.len(), 2);
    }

    #[test]
    fn test_count_within() {
        let ips = parse_ips(["10.1.2.3", "192.168.0.1", "10.9.9.9"]);
        let ranges = parse_prefixes(["10.0.0.0/8"]);
        assert_eq!(count_within(&ips, &ranges), 2);
    }

    #[test]
    fn test_create_provider_names() {
        let fetcher = Arc::new(Fetcher::new().unwrap());
        let executor: Arc<dyn CommandExecutor> = Arc::new(MockCommandExecutor::new());
        let cases = [
            (ProviderKind::AmazonEc2, "AWS"),
            (ProviderKind::GoogleCloud, "Google Cloud"),
            (ProviderKind::Azure, "Azure"),
        ];
        for (kind, name) in cases {
            let provider = create_provider(kind, fetcher.clone(), executor.clone());
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn test_default_storage_endpoints_empty() {
        let fetcher = Arc::new(Fetcher::new().unwrap());
        let provider = create_provider(
            ProviderKind::Azure,
            fetcher,
            Arc::new(MockCommandExecutor::new()),
        );
        assert!(provider.storage_endpoints().unwrap().is_empty());
    }
}
