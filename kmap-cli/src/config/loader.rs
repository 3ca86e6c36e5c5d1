use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kmap_recovery::KmapConfig;
use toml::{Table, Value};

/// Environment variable overriding the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "KMAP_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + explicit file)
    pub fn load(explicit: Option<&Path>) -> Result<KmapConfig> {
        let mut raw = Table::new();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_layer(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_layer(&project_path)?);
        }

        // Layer 3: Explicit file, which must exist
        if let Some(path) = explicit {
            raw = Self::merge_raw(raw, Self::read_layer(path)?);
        }

        Self::finalize(raw)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kmap").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with KMAP_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".kmap/config.toml")
        }
    }

    fn read_layer(path: &Path) -> Result<Table> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid TOML in {}", path.display()))
    }

    /// Merge two raw tables key by key; overlay values win, nested tables merge
    fn merge_raw(mut base: Table, overlay: Table) -> Table {
        for (key, value) in overlay {
            let merged = match (base.remove(&key), value) {
                (Some(Value::Table(base_table)), Value::Table(overlay_table)) => {
                    Value::Table(Self::merge_raw(base_table, overlay_table))
                }
                (_, value) => value,
            };
            base.insert(key, merged);
        }
        base
    }

    /// Convert raw table to final config with defaults applied, then validate
    fn finalize(raw: Table) -> Result<KmapConfig> {
        let config: KmapConfig = Value::Table(raw)
            .try_into()
            .context("Configuration does not match the expected schema")?;
        config.validate()?;
        Ok(config)
    }
}
