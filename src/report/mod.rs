//! Inventory PDF report.
//!
//! [`PAGES`] lists the dashboard columns that get a graph page. The table
//! and bar data for each page are derived here; [`pdf::ReportBuilder`]
//! lays them out.

pub mod pdf;

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::api::{AggregationRow, Dashboard};

pub use pdf::ReportBuilder;

/// Placeholder name the dashboard uses for assets without a value
pub const MISSING_NAME: &str = "__missing__";

/// Longest table name rendered before truncation
const MAX_NAME_LEN: usize = 75;

/// A graph page: dashboard column, heading and explanatory text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphPage {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

pub const PAGES: [GraphPage; 11] = [
    GraphPage {
        key: "ports.ports",
        title: "Listening Ports",
        description: "The most common listening ports on the Internet-accessible assets.",
    },
    GraphPage {
        key: "own_header.responsecode",
        title: "HTTP/S Response Codes",
        description: "The HTTP/S response codes for websites which represent whether the site is OK (200-299 responses), the page is redirecting (300-399 responses), content is not found (400 responses), or an error is found (500 responses).",
    },
    GraphPage {
        key: "wtech.Content Management Systems",
        title: "Content Management Systems",
        description: "A content management system (CMS) is a software application that can be used to manage the creation and modification of digital content.",
    },
    GraphPage {
        key: "wtech.Blogs",
        title: "Blogs",
        description: "A blog is a discussion or informational website published consisting of discrete, often informal diary-style text entries (posts).",
    },
    GraphPage {
        key: "ipgeo.asn",
        title: "ASNs",
        description: "The top Autonomous System Numbers (ASNs) where the Internet-accessible assets are located by IP-address range. ASNs are a unique number that's available globally to identify an autonomous system and which enables that system to exchange exterior routing information with other neighboring autonomous systems.",
    },
    GraphPage {
        key: "ssl.issuer_CN",
        title: "SSL/TLS Certificate Authorities",
        description: "The top SSL/TLS Certificate Authorities (CAs) seen in use by the Internet-accessible assets. A CA is an entity that issues digital certificates.",
    },
    GraphPage {
        key: "ssl.sslerror",
        title: "SSL/TLS Errors",
        description: "The SSL/TLS errors that are found on the website in question as seen by an Internet browser like Chrome.",
    },
    GraphPage {
        key: "rbls.rbls",
        title: "Reputation Block Lists",
        description: "Reputation Block Lists protect home and corporate users from visiting sites on the Internet that may have malware, or may be sending spam emails or advertising to users.",
    },
    GraphPage {
        key: "ipgeo.country",
        title: "Hosting Countries",
        description: "The top countries where the Internet-accessible assets are physically located as determined by third-party geolocation of IP-address ranges.",
    },
    GraphPage {
        key: "wtech.Content Delivery Networks",
        title: "Hosted by CDNs",
        description: "The top Content Delivery Networks (Akamai, Cloudflare, Fastly, and others) where the Internet-accessible assets are being delivered, which is determined by their well-known and published IP-address ranges. CDNs refers to a geographically distributed group of servers which work together to provide fast delivery of Internet content.",
    },
    GraphPage {
        key: "own_header.server",
        title: "Servers",
        description: "The top web servers running on the Internet-accessible assets based upon their HTTP response headers. The following data may include software distribution, major version, and minor version.",
    },
];

/// A count page: counted object and its definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountPage {
    pub name: &'static str,
    pub definition: &'static str,
}

pub const ASSET_PAGE: CountPage = CountPage {
    name: "asset",
    definition: "A domain name, subdomain, or IP address and/or combination thereof of a device connected to the Internet or internal network. An asset may include but is not limited to web servers, name servers, IoT devices, network printers, etc. Example: foo.tld, bar.foo.tld, x.x.x.x",
};

pub const DOMAIN_PAGE: CountPage = CountPage {
    name: "domain",
    definition: "A domain name is a label that identifies a network domain. Domain names are used to identify Internet resources, such as computers, networks and services, with an easy-to-remember text label that is easier to memorize than the numerical addresses used in Internet protocols.",
};

pub const SUBDOMAIN_PAGE: CountPage = CountPage {
    name: "subdomain",
    definition: "A subdomain is a domain name with a hostname appended, which is sometimes more accurately described as a fully qualified domain name (FQDN).",
};

/// Dashboard column keys for every graph page
pub fn page_columns() -> Vec<String> {
    PAGES.iter().map(|page| page.key.to_string()).collect()
}

/// Aggregation rows by dashboard column
pub fn rows_by_column(dashboard: &Dashboard) -> HashMap<&str, &[AggregationRow]> {
    dashboard
        .aggregations
        .iter()
        .map(|agg| (agg.column.as_str(), agg.data.as_slice()))
        .collect()
}

/// One rendered table row
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub name: String,
    pub count: u64,
    pub percent: f64,
}

/// Table rows for a graph page.
///
/// Named rows keep the order the API returned them in. Rows with an empty
/// name or named `__missing__` are folded into one trailing `__missing__`
/// row.
pub fn build_table_rows(data: &[AggregationRow], total: u64) -> Vec<TableRow> {
    let mut rows = Vec::with_capacity(data.len());
    let mut missing: Option<u64> = None;

    for row in data {
        if row.name.is_empty() || row.name == MISSING_NAME {
            *missing.get_or_insert(0) += row.value;
        } else {
            rows.push(table_row(&row.name, row.value, total));
        }
    }
    if let Some(count) = missing {
        rows.push(table_row(MISSING_NAME, count, total));
    }
    rows
}

fn table_row(name: &str, count: u64, total: u64) -> TableRow {
    let name = if name.chars().count() > MAX_NAME_LEN {
        format!("{}...", name.chars().take(MAX_NAME_LEN).collect::<String>())
    } else {
        name.to_string()
    };
    TableRow {
        name,
        count,
        percent: percent_of(count, total),
    }
}

/// Share of `total`, in percent rounded to two decimals; 0 when total is 0
pub fn percent_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Bar heights for the chart; the `__missing__` bucket is not drawn
pub fn bar_values(data: &[AggregationRow]) -> Vec<u64> {
    data.iter()
        .filter(|row| row.name != MISSING_NAME)
        .map(|row| row.value)
        .collect()
}

/// `<inventory name with spaces as _>-<YYYYMMDD>.pdf`
pub fn report_filename(inventory: &str, date: NaiveDate) -> String {
    format!("{}-{}.pdf", inventory.replace(' ', "_"), date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, value: u64) -> AggregationRow {
        AggregationRow {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_pages() {
        assert_eq!(PAGES.len(), 11);
        let columns = page_columns();
        assert_eq!(columns[0], "ports.ports");
        assert_eq!(columns[10], "own_header.server");
    }

    #[test]
    fn test_table_rows_fold_missing() {
        let data = vec![
            row("443", 60),
            row("", 5),
            row(MISSING_NAME, 10),
            row("80", 25),
        ];
        let rows = build_table_rows(&data, 100);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["443", "80", MISSING_NAME]);
        assert_eq!(rows[2].count, 15);
        assert_eq!(rows[2].percent, 15.0);
    }

    #[test]
    fn test_table_rows_empty_name_only() {
        let rows = build_table_rows(&[row("nginx", 3), row("", 1)], 4);
        assert_eq!(rows.last().unwrap().name, MISSING_NAME);
        assert_eq!(rows.last().unwrap().count, 1);
    }

    #[test]
    fn test_table_rows_truncate_long_names() {
        let long = "x".repeat(76);
        let rows = build_table_rows(&[row(&long, 1), row(&"y".repeat(75), 1)], 2);
        assert_eq!(rows[0].name, format!("{}...", "x".repeat(75)));
        assert_eq!(rows[1].name, "y".repeat(75));
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent_of(1, 3), 33.33);
        assert_eq!(percent_of(2, 3), 66.67);
        assert_eq!(percent_of(5, 0), 0.0);
    }

    #[test]
    fn test_bar_values_skip_missing() {
        let data = vec![row("a", 4), row(MISSING_NAME, 9), row("", 2)];
        assert_eq!(bar_values(&data), vec![4, 2]);
    }

    #[test]
    fn test_report_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(report_filename("Acme Corp Inc", date), "Acme_Corp_Inc-20240307.pdf");
    }

    #[test]
    fn test_rows_by_column() {
        let dashboard: Dashboard = serde_json::from_str(
            r#"{"stats": {"total": 5}, "aggregations": [{"column": "ports.ports", "data": [{"name": 443, "value": 5}]}]}"#,
        )
        .unwrap();
        let by_column = rows_by_column(&dashboard);
        assert_eq!(by_column["ports.ports"][0].name, "443");
        assert!(!by_column.contains_key("ssl.sslerror"));
    }
}
