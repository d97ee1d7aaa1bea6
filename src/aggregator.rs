//! Interval merging for geolocation IP ranges.

use ipnet::{IpNet, Ipv4Subnets, Ipv6Subnets};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Address family of a range. IPv4 sorts before IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

/// Inclusive range of integer-encoded addresses within one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpRange {
    pub family: IpFamily,
    pub start: u128,
    pub end: u128,
}

impl IpRange {
    pub fn v4(start: u32, end: u32) -> Self {
        Self {
            family: IpFamily::V4,
            start: start as u128,
            end: end as u128,
        }
    }

    pub fn v6(start: u128, end: u128) -> Self {
        Self {
            family: IpFamily::V6,
            start,
            end,
        }
    }

    /// Number of addresses covered
    pub fn address_count(&self) -> u128 {
        (self.end - self.start).saturating_add(1)
    }

    /// Split the range into the minimal list of CIDR blocks covering it.
    pub fn to_cidrs(&self) -> Vec<IpNet> {
        match self.family {
            IpFamily::V4 => Ipv4Subnets::new(
                Ipv4Addr::from(self.start as u32),
                Ipv4Addr::from(self.end as u32),
                0,
            )
            .map(IpNet::V4)
            .collect(),
            IpFamily::V6 => {
                Ipv6Subnets::new(Ipv6Addr::from(self.start), Ipv6Addr::from(self.end), 0)
                    .map(IpNet::V6)
                    .collect()
            }
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            IpFamily::V4 => write!(
                f,
                "{}-{}",
                Ipv4Addr::from(self.start as u32),
                Ipv4Addr::from(self.end as u32)
            ),
            IpFamily::V6 => write!(
                f,
                "{}-{}",
                Ipv6Addr::from(self.start),
                Ipv6Addr::from(self.end)
            ),
        }
    }
}

/// Merge overlapping and adjacent ranges into the minimal sorted set.
///
/// A range is folded into the previous one when it starts at most one past
/// the previous end. Ranges of different families never merge.
/// For example: [1-10, 11-20, 30-40] -> [1-20, 30-40]
pub fn merge_ranges<I>(ranges: I) -> Vec<IpRange>
where
    I: IntoIterator<Item = IpRange>,
{
    let mut sorted: Vec<IpRange> = ranges.into_iter().collect();
    sorted.sort_unstable();

    let mut merged: Vec<IpRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last)
                if last.family == range.family && range.start <= last.end.saturating_add(1) =>
            {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Total number of addresses covered by a list of ranges.
///
/// Uses saturating arithmetic so the full IPv6 space does not overflow.
pub fn count_addresses(ranges: &[IpRange]) -> u128 {
    ranges
        .iter()
        .fold(0u128, |acc, r| acc.saturating_add(r.address_count()))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// Small IPv4 ranges in a narrow space so overlaps are common
    fn range_strategy() -> impl Strategy<Value = IpRange> {
        (0u32..200, 0u32..20).prop_map(|(start, width)| IpRange::v4(start, start + width))
    }

    fn covered(ranges: &[IpRange]) -> BTreeSet<u128> {
        ranges.iter().flat_map(|r| r.start..=r.end).collect()
    }

    proptest! {
        /// Output is sorted, disjoint and never adjacent
        #[test]
        fn prop_merge_disjoint_non_adjacent(ranges in prop::collection::vec(range_strategy(), 0..60)) {
            let merged = merge_ranges(ranges);
            for pair in merged.windows(2) {
                prop_assert!(pair[1].start > pair[0].end + 1);
            }
        }

        /// Merging preserves exactly the covered addresses
        #[test]
        fn prop_merge_preserves_union(ranges in prop::collection::vec(range_strategy(), 0..60)) {
            let merged = merge_ranges(ranges.clone());
            prop_assert_eq!(covered(&ranges), covered(&merged));
        }

        /// Merging a merged set changes nothing
        #[test]
        fn prop_merge_idempotent(ranges in prop::collection::vec(range_strategy(), 0..60)) {
            let once = merge_ranges(ranges);
            let twice = merge_ranges(once.clone());
            prop_assert_eq!(once, twice);
        }

        /// Merging never increases the number of entries
        #[test]
        fn prop_merge_reduces_or_maintains_size(ranges in prop::collection::vec(range_strategy(), 0..60)) {
            let len = ranges.len();
            prop_assert!(merge_ranges(ranges).len() <= len);
        }

        /// CIDR split covers the same number of addresses
        #[test]
        fn prop_cidrs_cover_range(start in 0u32..u32::MAX - 5000, width in 0u32..5000) {
            let range = IpRange::v4(start, start + width);
            let total: u128 = range
                .to_cidrs()
                .iter()
                .map(|net| 1u128 << (32 - net.prefix_len()))
                .sum();
            prop_assert_eq!(total, range.address_count());
        }
    }
}
