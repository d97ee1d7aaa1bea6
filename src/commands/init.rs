//! init-config: write the default configuration file.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::config::{write_atomic, Config};

/// Run the init-config command
pub fn run(config_path: &Path, force: bool) -> Result<()> {
    write_default_config(config_path, force)?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Write the commented default config, refusing to clobber an existing file
pub fn write_default_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_atomic(config_path, Config::generate_default_yaml().as_bytes())?;
    info!("Configuration written to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("asm-sync.yaml");
        write_default_config(&path, false).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_tries, 5);
    }

    #[test]
    fn test_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asm-sync.yaml");
        std::fs::write(&path, "max_tries: 9\n").unwrap();

        assert!(write_default_config(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "max_tries: 9\n");

        write_default_config(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap().max_tries, 5);
    }
}
