//! Configuration Module - User preferences from config.toml
//!
//! Supports:
//! - Default malformed-candidate recovery policy
//! - Log level
//! - Output defaults (base64 dump, run report)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::carve::RecoveryMode;

/// FinSpy Carve Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Scan settings
    pub scan: ScanConfig,
    /// Output settings
    pub output: OutputConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Scan settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Recovery policy for malformed hidden-data candidates
    pub recovery: RecoveryMode,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write the reconstructed base64 text to <apk>.b64
    pub write_b64: bool,
    /// Write a JSON run report by default
    pub write_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_b64: true,
            write_report: false,
        }
    }
}

impl Config {
    /// Load config from default path or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::default_path()).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("de", "ccc", "finspy-carve")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".finspy-carve")
                    .join("config.toml")
            })
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::default_path().exists()
    }

    /// Create default config file if it doesn't exist
    pub fn ensure_exists() -> Result<()> {
        let path = Self::default_path();
        if !path.exists() {
            let config = Config::default();
            config.save_to(&path)?;
            tracing::info!("Created default config at {}", path.display());
        }
        Ok(())
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# FinSpy Carve Configuration

[general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[scan]
# Recovery policy for malformed hidden-data candidates.
# "lenient": count decode failures, salvage printable prefixes, abort the
#            run after more than 10 cumulative failures.
# "strict":  stop accumulating permanently at the first broken candidate.
recovery = "lenient"

[output]
# Write the reconstructed base64 text to <apk>.b64
write_b64 = true

# Write a JSON run report to <apk>.report.json on every run
write_report = false
"#
    .to_string()
}
