//! Cloud-to-inventory set reconciliation.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Where an inventory IP was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    AssetOnly,
    SourceOnly,
    Both,
}

impl Origin {
    fn is_asset(self) -> bool {
        matches!(self, Origin::AssetOnly | Origin::Both)
    }

    fn is_source(self) -> bool {
        matches!(self, Origin::SourceOnly | Origin::Both)
    }
}

/// Outcome of comparing live cloud IPs with the inventory
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Live in the cloud, unknown to the inventory
    pub new_ips: BTreeSet<IpAddr>,
    /// Known to the inventory, no longer live in the cloud
    pub stale_ips: BTreeSet<IpAddr>,
}

/// Union of asset and source IPs, tagged with where each was seen
pub fn build_superset(
    asset_ips: &BTreeSet<IpAddr>,
    source_ips: &BTreeSet<IpAddr>,
) -> BTreeMap<IpAddr, Origin> {
    let mut superset = BTreeMap::new();
    for ip in asset_ips {
        superset.insert(*ip, Origin::AssetOnly);
    }
    for ip in source_ips {
        superset
            .entry(*ip)
            .and_modify(|origin| *origin = Origin::Both)
            .or_insert(Origin::SourceOnly);
    }
    superset
}

/// Remove every cloud IP already known to the inventory.
///
/// Matched IPs leave the superset, the asset and source sets their origin
/// names, and the cloud set. What is left of the cloud set is new; what is
/// left of the superset is stale.
pub fn remove_matches(
    mut superset: BTreeMap<IpAddr, Origin>,
    asset_ips: &mut BTreeSet<IpAddr>,
    source_ips: &mut BTreeSet<IpAddr>,
    mut cloud_ips: BTreeSet<IpAddr>,
) -> Reconciliation {
    cloud_ips.retain(|ip| match superset.remove(ip) {
        Some(origin) => {
            if origin.is_asset() {
                asset_ips.remove(ip);
            }
            if origin.is_source() {
                source_ips.remove(ip);
            }
            false
        }
        None => true,
    });

    Reconciliation {
        new_ips: cloud_ips,
        stale_ips: superset.into_keys().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(list: &[&str]) -> BTreeSet<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_build_superset_tags_origin() {
        let superset = build_superset(&ips(&["1.1.1.1", "2.2.2.2"]), &ips(&["2.2.2.2", "3.3.3.3"]));
        assert_eq!(superset[&"1.1.1.1".parse::<IpAddr>().unwrap()], Origin::AssetOnly);
        assert_eq!(superset[&"2.2.2.2".parse::<IpAddr>().unwrap()], Origin::Both);
        assert_eq!(superset[&"3.3.3.3".parse::<IpAddr>().unwrap()], Origin::SourceOnly);
    }

    #[test]
    fn test_known_source_ip_is_not_new() {
        let mut assets = BTreeSet::new();
        let mut sources = ips(&["10.0.0.1"]);
        let superset = build_superset(&assets, &sources);

        let result = remove_matches(superset, &mut assets, &mut sources, ips(&["10.0.0.1", "10.0.0.2"]));
        assert_eq!(result.new_ips, ips(&["10.0.0.2"]));
        assert!(result.stale_ips.is_empty());
        assert!(sources.is_empty());
    }

    #[test]
    fn test_stale_ips_remain() {
        let mut assets = ips(&["1.1.1.1", "2.2.2.2"]);
        let mut sources = ips(&["2.2.2.2", "3.3.3.3"]);
        let superset = build_superset(&assets, &sources);

        let result = remove_matches(superset, &mut assets, &mut sources, ips(&["2.2.2.2"]));
        assert!(result.new_ips.is_empty());
        assert_eq!(result.stale_ips, ips(&["1.1.1.1", "3.3.3.3"]));
        assert_eq!(assets, ips(&["1.1.1.1"]));
        assert_eq!(sources, ips(&["3.3.3.3"]));
    }

    #[test]
    fn test_empty_inventory_everything_new() {
        let mut assets = BTreeSet::new();
        let mut sources = BTreeSet::new();
        let result = remove_matches(
            BTreeMap::new(),
            &mut assets,
            &mut sources,
            ips(&["1.1.1.1", "2001:db8::1"]),
        );
        assert_eq!(result.new_ips.len(), 2);
        assert!(result.stale_ips.is_empty());
    }
}
