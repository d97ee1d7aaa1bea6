//! Configuration management for asm-sync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AsmError;
use crate::retry::DEFAULT_MAX_TRIES;

/// Base URL of the production inventory API
pub const DEFAULT_API_URL: &str = "https://bitdiscovery.com/api/1.0";

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "asm-sync.yaml";

/// Secure string type that zeroizes memory on drop.
/// Holds inventory API keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Inventory service environment
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment used when `--env` is not given
    pub environment: Environment,

    /// API base URL per environment
    pub environments: BTreeMap<Environment, String>,

    /// Attempts per inventory API call before giving up
    pub max_tries: u32,

    /// Geolocation range loading
    pub geo: GeoConfig,

    /// PDF report output
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            environments: default_environments(),
            max_tries: DEFAULT_MAX_TRIES,
            geo: GeoConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

fn default_environments() -> BTreeMap<Environment, String> {
    [Environment::Dev, Environment::Staging, Environment::Prod]
        .into_iter()
        .map(|env| (env, DEFAULT_API_URL.to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// IP2Location-style CSV files (start, end, country code, country name, region, city)
    pub databases: Vec<PathBuf>,
    /// Overall wait for the inventory to ingest one added range
    pub max_wait_secs: u64,
    /// First poll delay, doubled after every poll
    pub initial_backoff_secs: u64,
    /// Upper bound for a single poll delay
    pub max_backoff_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            databases: vec![PathBuf::from("ip2loc/IP2LOCATION-LITE-DB3.IPV6.CSV")],
            max_wait_secs: 7200,
            initial_backoff_secs: 1,
            max_backoff_secs: 514,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory holding optional fonts (avenir-book.ttf, avenir-black.ttf)
    pub resource_dir: PathBuf,
    /// Where finished reports are written
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            resource_dir: PathBuf::from("pdf"),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the config file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (env, url) in &self.environments {
            if !url.starts_with("https://") {
                return Err(AsmError::Config(format!(
                    "API URL for {:?} must use HTTPS: {}",
                    env, url
                ))
                .into());
            }
        }

        if self.max_tries == 0 {
            return Err(AsmError::Config("max_tries must be at least 1".to_string()).into());
        }

        let geo = &self.geo;
        if geo.initial_backoff_secs == 0 || geo.max_backoff_secs == 0 {
            return Err(AsmError::Config("backoff delays must be positive".to_string()).into());
        }
        if geo.initial_backoff_secs > geo.max_backoff_secs {
            return Err(AsmError::Config(format!(
                "initial_backoff_secs ({}) exceeds max_backoff_secs ({})",
                geo.initial_backoff_secs, geo.max_backoff_secs
            ))
            .into());
        }

        Ok(())
    }

    /// Resolve the API base URL for an environment
    pub fn api_url(&self, env: Environment) -> Result<&str> {
        self.environments
            .get(&env)
            .map(String::as_str)
            .ok_or_else(|| AsmError::Config(format!("No API URL configured for {:?}", env)).into())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        write_atomic(path.as_ref(), content.as_bytes())
    }

    /// Default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

/// Write `content` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;
    use tempfile::NamedTempFile;

    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent_dir))?;

    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to persist file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.max_tries, 5);
        assert_eq!(config.geo.max_wait_secs, 7200);
        assert_eq!(config.geo.max_backoff_secs, 514);
        assert_eq!(config.api_url(Environment::Prod).unwrap(), DEFAULT_API_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_template_parses_and_validates() {
        let config: Config = serde_yaml::from_str(&Config::generate_default_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.environments.len(), 3);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "environment: prod\nmax_tries: 2\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.max_tries, 2);
        assert_eq!(config.geo.initial_backoff_secs, 1);
        assert_eq!(config.report.resource_dir, PathBuf::from("pdf"));
    }

    #[test]
    fn test_validation_rejects_http_url() {
        let mut config = Config::default();
        config
            .environments
            .insert(Environment::Staging, "http://insecure.example".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_tries() {
        let config = Config {
            max_tries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.geo.initial_backoff_secs = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_environment_url() {
        let mut config = Config::default();
        config.environments.remove(&Environment::Staging);
        assert!(config.api_url(Environment::Staging).is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asm-sync.yaml");
        let mut config = Config::default();
        config.max_tries = 3;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.max_tries, 3);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.max_tries, 5);
    }

    #[test]
    fn test_secure_string_debug_redacted() {
        let secret = SecureString::from("my-api-key");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.as_str(), "my-api-key");
        assert!(!secret.is_empty());
        assert!(SecureString::default().is_empty());
    }
}
