//! # asm-sync - Attack Surface Inventory Sync
//!
//! Keeps an attack surface management inventory (the Bit Discovery REST API)
//! in step with the IP space an organization actually uses.
//!
//! ## Features
//!
//! - **Cloud sync** - Pull live instance IPs from AWS, Google Cloud or Azure,
//!   reconcile them with the inventory and add what is missing (plus S3 buckets)
//! - **Geo ranges** - Filter IP2Location-style CSV tables by country, region or
//!   city and merge the hits into the minimal set of ranges
//! - **Delete** - Archive assets by IP and remove matching sources
//! - **Reports** - Multi-page PDF with inventory counts, charts and tables
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        asm-sync                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: cloud-sync, add-by-geo, delete, report     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Environments, retry budget, backoff, report dirs     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Inventory API (InventoryApi trait, reqwest + rustls)       │
//! │    └── Pagination and bounded retries                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Cloud (CloudProvider trait)                                │
//! │    ├── Public range feeds (Fetcher)                         │
//! │    └── aws / gcloud / az CLIs (CommandExecutor trait)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Geo loader (csv) + Aggregator (ipnet)                      │
//! │    └── Row filter, interval merge, CIDR split               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Report (printpdf)                                          │
//! │    └── Title, count and graph pages                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use asm_sync::aggregator::merge_ranges;
//! use asm_sync::geo::{load_databases, GeoFilter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let filter = GeoFilter::new(vec!["COUNTRY_CODE=FR".parse()?]);
//!     let ranges = load_databases(&["ip2loc/IP2LOCATION-LITE-DB3.IPV6.CSV"], &filter, true)?;
//!
//!     for range in merge_ranges(ranges) {
//!         println!("{}", range);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - IP range type and interval merging
//! - [`api`] - Inventory REST client and pagination
//! - [`cli`] - Command-line interface definitions
//! - [`cloud`] - Cloud provider adapters
//! - [`cmd_abstraction`] - Subprocess seam for the cloud CLIs
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error categories
//! - [`fetcher`] - HTTP client for public range feeds
//! - [`geo`] - Geolocation CSV loading and filtering
//! - [`reconcile`] - Cloud-to-inventory set reconciliation
//! - [`report`] - PDF report layout
//! - [`retry`] - Bounded retries and backoff
//! - [`utils`] - Common utility functions (formatting, truncation)

pub mod aggregator;
pub mod api;
pub mod cli;
pub mod cloud;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod geo;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
