//! Amazon Web Services adapter.

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::{parse_ips, parse_prefixes, CloudProvider};
use crate::cmd_abstraction::{run_json, CommandExecutor};
use crate::fetcher::Fetcher;

const AWS_IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

/// Region S3 reports as a null location constraint
const DEFAULT_S3_REGION: &str = "us-east-1";

#[derive(Debug, Deserialize)]
struct AwsRanges {
    #[serde(default)]
    prefixes: Vec<AwsPrefix>,
    #[serde(default)]
    ipv6_prefixes: Vec<AwsIpv6Prefix>,
}

#[derive(Debug, Deserialize)]
struct AwsPrefix {
    ip_prefix: String,
}

#[derive(Debug, Deserialize)]
struct AwsIpv6Prefix {
    ipv6_prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Regions {
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Region {
    region_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Addresses {
    #[serde(default)]
    addresses: Vec<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Address {
    public_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketLocation {
    location_constraint: Option<String>,
}

/// AWS adapter: public feed for ranges, `aws` CLI for the account's IPs and buckets
pub struct AwsProvider {
    fetcher: Arc<Fetcher>,
    executor: Arc<dyn CommandExecutor>,
}

impl AwsProvider {
    pub fn new(fetcher: Arc<Fetcher>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { fetcher, executor }
    }

    /// Every region enabled for the account
    pub fn find_regions(&self) -> Result<Vec<String>> {
        let regions: Regions = run_json(
            self.executor.as_ref(),
            "aws",
            &["ec2", "describe-regions", "--output", "json"],
        )?;
        Ok(regions.regions.into_iter().map(|r| r.region_name).collect())
    }

    /// Public IPs of running instances in one region
    pub fn find_dynamic_ips(&self, region: &str) -> Result<BTreeSet<IpAddr>> {
        // Reservations -> Instances -> [PublicIpAddress], null without a public IP
        let nested: Vec<Vec<Vec<Option<String>>>> = run_json(
            self.executor.as_ref(),
            "aws",
            &[
                "ec2",
                "describe-instances",
                "--region",
                region,
                "--query",
                "Reservations[*].Instances[*].[PublicIpAddress]",
                "--output",
                "json",
            ],
        )?;
        Ok(parse_ips(
            nested
                .iter()
                .flatten()
                .flatten()
                .filter_map(|ip| ip.as_deref()),
        ))
    }

    /// Elastic (static) IPs allocated in one region
    pub fn find_elastic_ips(&self, region: &str) -> Result<BTreeSet<IpAddr>> {
        let addresses: Addresses = run_json(
            self.executor.as_ref(),
            "aws",
            &[
                "ec2",
                "describe-addresses",
                "--region",
                region,
                "--output",
                "json",
            ],
        )?;
        Ok(parse_ips(
            addresses
                .addresses
                .iter()
                .filter_map(|a| a.public_ip.as_deref()),
        ))
    }

    /// Names of every S3 bucket the account owns
    pub fn find_s3_buckets(&self) -> Result<BTreeSet<String>> {
        run_json(
            self.executor.as_ref(),
            "aws",
            &[
                "s3api",
                "list-buckets",
                "--query",
                "Buckets[].Name",
                "--output",
                "json",
            ],
        )
    }

    /// Regional endpoint hostname of a bucket
    pub fn find_s3_region(&self, bucket: &str) -> Result<String> {
        let location: BucketLocation = run_json(
            self.executor.as_ref(),
            "aws",
            &[
                "s3api",
                "get-bucket-location",
                "--bucket",
                bucket,
                "--output",
                "json",
            ],
        )?;
        let region = location
            .location_constraint
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
        Ok(format!("{}.s3.{}.amazonaws.com", bucket, region))
    }
}

/// Extract IPv4 and IPv6 prefixes from the ip-ranges.json document
fn parse_aws_ranges(content: &AwsRanges) -> BTreeSet<IpNet> {
    parse_prefixes(
        content
            .prefixes
            .iter()
            .map(|p| p.ip_prefix.as_str())
            .chain(content.ipv6_prefixes.iter().map(|p| p.ipv6_prefix.as_str())),
    )
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &'static str {
        "AWS"
    }

    async fn get_ip_ranges(&self) -> Result<BTreeSet<IpNet>> {
        let ranges: AwsRanges = self.fetcher.get_json(AWS_IP_RANGES_URL).await?;
        Ok(parse_aws_ranges(&ranges))
    }

    fn get_instance_ips(&self) -> Result<BTreeSet<IpAddr>> {
        let mut ips = BTreeSet::new();
        for region in self.find_regions()? {
            debug!("Scanning region {}", region);
            ips.extend(self.find_dynamic_ips(&region)?);
            ips.extend(self.find_elastic_ips(&region)?);
        }
        Ok(ips)
    }

    fn storage_endpoints(&self) -> Result<Vec<String>> {
        self.find_s3_buckets()?
            .iter()
            .map(|bucket| self.find_s3_region(bucket))
            .collect()
    }
}
