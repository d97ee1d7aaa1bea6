//! Microsoft Azure adapter.

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use super::{parse_ips, parse_prefixes, CloudProvider};
use crate::cmd_abstraction::{run_json, CommandExecutor};
use crate::fetcher::Fetcher;

const AZURE_IP_RANGES_URL: &str = "https://azuredcip.azurewebsites.net/api/azuredcipranges";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmIpAddresses {
    virtual_machine: VirtualMachine,
}

#[derive(Debug, Deserialize)]
struct VirtualMachine {
    network: Option<VmNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmNetwork {
    #[serde(default)]
    public_ip_addresses: Vec<PublicIpAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicIpAddress {
    ip_address: Option<String>,
}

/// Azure adapter: datacenter range service for ranges, `az` for VM IPs
pub struct AzureProvider {
    fetcher: Arc<Fetcher>,
    executor: Arc<dyn CommandExecutor>,
}

impl AzureProvider {
    pub fn new(fetcher: Arc<Fetcher>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { fetcher, executor }
    }
}

/// The range service answers with a map of region name to prefix list
fn parse_azure_ranges(content: &BTreeMap<String, Vec<String>>) -> BTreeSet<IpNet> {
    parse_prefixes(content.values().flatten().map(String::as_str))
}

fn vm_public_ips(vms: &[VmIpAddresses]) -> BTreeSet<IpAddr> {
    parse_ips(
        vms.iter()
            .filter_map(|vm| vm.virtual_machine.network.as_ref())
            .flat_map(|n| &n.public_ip_addresses)
            .filter_map(|p| p.ip_address.as_deref()),
    )
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn name(&self) -> &'static str {
        "Azure"
    }

    async fn get_ip_ranges(&self) -> Result<BTreeSet<IpNet>> {
        let payload = json!({"region": "all", "request": "dcip"});
        let ranges: BTreeMap<String, Vec<String>> =
            self.fetcher.post_json(AZURE_IP_RANGES_URL, &payload).await?;
        Ok(parse_azure_ranges(&ranges))
    }

    fn get_instance_ips(&self) -> Result<BTreeSet<IpAddr>> {
        let vms: Vec<VmIpAddresses> = run_json(
            self.executor.as_ref(),
            "az",
            &["vm", "list-ip-addresses", "--output", "json"],
        )?;
        Ok(vm_public_ips(&vms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};

    #[test]
    fn test_parse_azure_ranges() {
        let json = r#"{
            "australiacentral": ["20.36.32.0/19", "20.36.104.0/21"],
            "westus": ["13.64.0.0/16", "20.36.32.0/19"],
            "empty": []
        }"#;
        let ranges: BTreeMap<String, Vec<String>> = serde_json::from_str(json).unwrap();
        let parsed = parse_azure_ranges(&ranges);
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_get_instance_ips() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "az" && args.first().map(|a| a == "vm").unwrap_or(false))
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: r#"[
                        {"virtualMachine": {"name": "vm1", "network": {
                            "privateIpAddresses": ["10.0.0.4"],
                            "publicIpAddresses": [{"ipAddress": "40.112.1.1", "name": "vm1-ip"}]
                        }}},
                        {"virtualMachine": {"name": "vm2", "network": {
                            "privateIpAddresses": ["10.0.0.5"],
                            "publicIpAddresses": []
                        }}},
                        {"virtualMachine": {"name": "vm3", "network": null}}
                    ]"#
                    .to_string(),
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let provider = AzureProvider::new(Arc::new(Fetcher::new().unwrap()), Arc::new(mock));
        let ips = provider.get_instance_ips().unwrap();
        assert_eq!(ips.len(), 1);
        assert!(ips.contains(&"40.112.1.1".parse::<IpAddr>().unwrap()));
    }
}
