//! Geolocation database loading and row filtering.
//!
//! Rows follow the IP2Location DB3 layout: `start, end, country code,
//! country name, region, city`, with start/end as decimal-encoded IPv6
//! addresses (IPv4 entries are stored IPv4-mapped).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::aggregator::IpRange;
use crate::error::AsmError;
use crate::utils::format_count;

/// `::ffff:0:0/96`
const IPV4_MAPPED_PREFIX: u128 = 0xffff_0000_0000;
const IPV4_MAPPED_MASK: u128 = !0xffff_ffff;

/// Column a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterCriterion {
    /// Matches when any column equals the value
    Any,
    CountryCode,
    CountryName,
    Region,
    City,
}

impl FilterCriterion {
    pub const ALL: [FilterCriterion; 5] = [
        FilterCriterion::Any,
        FilterCriterion::CountryCode,
        FilterCriterion::CountryName,
        FilterCriterion::Region,
        FilterCriterion::City,
    ];

    /// CSV column the criterion compares against (`None` for `Any`)
    pub fn column(self) -> Option<usize> {
        match self {
            FilterCriterion::Any => None,
            FilterCriterion::CountryCode => Some(2),
            FilterCriterion::CountryName => Some(3),
            FilterCriterion::Region => Some(4),
            FilterCriterion::City => Some(5),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            FilterCriterion::Any => "ANY",
            FilterCriterion::CountryCode => "COUNTRY_CODE",
            FilterCriterion::CountryName => "COUNTRY_NAME",
            FilterCriterion::Region => "REGION",
            FilterCriterion::City => "CITY",
        }
    }
}

impl fmt::Display for FilterCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FilterCriterion {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        FilterCriterion::ALL
            .into_iter()
            .find(|c| c.key() == upper)
            .ok_or_else(|| AsmError::InvalidFilter(s.to_string()))
    }
}

/// One `KEY=VALUE` command-line filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArg {
    pub criterion: FilterCriterion,
    pub value: String,
}

impl FromStr for FilterArg {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| AsmError::InvalidFilter(s.to_string()))?;
        let criterion = key
            .parse::<FilterCriterion>()
            .map_err(|_| AsmError::InvalidFilter(s.to_string()))?;
        Ok(Self {
            criterion,
            value: value.to_string(),
        })
    }
}

/// Row filter. Values are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct GeoFilter {
    criteria: BTreeMap<FilterCriterion, String>,
}

impl GeoFilter {
    /// Build a filter; a later argument for the same key replaces an earlier one.
    pub fn new(args: impl IntoIterator<Item = FilterArg>) -> Self {
        let criteria = args
            .into_iter()
            .map(|arg| (arg.criterion, arg.value.to_uppercase()))
            .collect();
        Self { criteria }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Decide whether a CSV row is kept.
    ///
    /// An empty filter keeps everything. Otherwise a row is kept when the
    /// `ANY` value equals one of its columns, or when every exact criterion
    /// (at least one) equals its column.
    pub fn matches(&self, row: &[&str]) -> bool {
        if self.criteria.is_empty() {
            return true;
        }

        if let Some(any) = self.criteria.get(&FilterCriterion::Any) {
            if row.iter().any(|col| col.to_uppercase() == *any) {
                return true;
            }
        }

        let mut exact = self
            .criteria
            .iter()
            .filter_map(|(criterion, value)| criterion.column().map(|col| (col, value)))
            .peekable();

        if exact.peek().is_none() {
            return false;
        }

        exact.all(|(col, value)| {
            row.get(col)
                .map(|cell| cell.to_uppercase() == *value)
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for GeoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.criteria.is_empty() {
            return f.write_str("(none)");
        }
        let parts: Vec<String> = self
            .criteria
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

fn ipv4_mapped(value: u128) -> Option<u32> {
    if value & IPV4_MAPPED_MASK == IPV4_MAPPED_PREFIX {
        Some(value as u32)
    } else {
        None
    }
}

/// Turn the decimal start/end columns into a range.
///
/// IPv4-mapped bounds are reduced to plain IPv4; bounds that both fit in
/// 32 bits are IPv4; anything else is IPv6. Returns `Ok(None)` for IPv6
/// ranges when `ipv4_only` is set.
pub fn parse_bounds(start: &str, end: &str, ipv4_only: bool) -> Result<Option<IpRange>, String> {
    let start: u128 = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid start address '{}'", start))?;
    let end: u128 = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid end address '{}'", end))?;

    if start > end {
        return Err(format!("start {} is greater than end {}", start, end));
    }

    let range = match (ipv4_mapped(start), ipv4_mapped(end)) {
        (Some(s), Some(e)) => IpRange::v4(s, e),
        _ if end <= u32::MAX as u128 => IpRange::v4(start as u32, end as u32),
        _ => IpRange::v6(start, end),
    };

    if ipv4_only && range.family != crate::aggregator::IpFamily::V4 {
        return Ok(None);
    }
    Ok(Some(range))
}

/// Read every row of a geolocation CSV, keep the rows the filter accepts
/// and return their ranges in file order.
pub fn load_ranges<R: Read>(reader: R, filter: &GeoFilter, ipv4_only: bool) -> Result<Vec<IpRange>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut ranges = Vec::new();
    let mut rows = 0usize;

    for record in csv_reader.records() {
        let record = record.context("Failed to read geolocation row")?;
        rows += 1;
        let line = record.position().map(|p| p.line()).unwrap_or(rows as u64);
        let row: Vec<&str> = record.iter().collect();

        if !filter.matches(&row) {
            continue;
        }

        if row.len() < 2 {
            return Err(AsmError::InvalidRow {
                line,
                reason: "expected start and end columns".to_string(),
            }
            .into());
        }

        match parse_bounds(row[0], row[1], ipv4_only) {
            Ok(Some(range)) => ranges.push(range),
            Ok(None) => {}
            Err(reason) => return Err(AsmError::InvalidRow { line, reason }.into()),
        }
    }

    debug!(
        "Scanned {} rows, kept {} ranges",
        format_count(rows),
        format_count(ranges.len())
    );
    Ok(ranges)
}

/// Load and concatenate the ranges of several database files.
pub fn load_databases<P: AsRef<Path>>(
    paths: &[P],
    filter: &GeoFilter,
    ipv4_only: bool,
) -> Result<Vec<IpRange>> {
    let mut ranges = Vec::new();
    for path in paths {
        let path = path.as_ref();
        info!("Reading geolocation database {}", path.display());
        let file = File::open(path)
            .with_context(|| format!("Failed to open geolocation database: {}", path.display()))?;
        let loaded = load_ranges(file, filter, ipv4_only)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        ranges.extend(loaded);
    }
    Ok(ranges)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Bound parsing never panics on arbitrary input
        #[test]
        fn prop_parse_bounds_no_panic(start in ".{0,40}", end in ".{0,40}", v4 in any::<bool>()) {
            let _ = parse_bounds(&start, &end, v4);
        }

        /// Any IPv4-mapped pair reduces to the embedded IPv4 range
        #[test]
        fn prop_mapped_reduces_to_ipv4(a in any::<u32>(), b in any::<u32>()) {
            let (lo, hi) = (a.min(b), a.max(b));
            let start = (IPV4_MAPPED_PREFIX | lo as u128).to_string();
            let end = (IPV4_MAPPED_PREFIX | hi as u128).to_string();
            let range = parse_bounds(&start, &end, true).unwrap().unwrap();
            prop_assert_eq!(range, IpRange::v4(lo, hi));
        }
    }
}
