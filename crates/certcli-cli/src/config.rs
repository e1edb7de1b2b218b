//! Global CLI configuration
//!
//! Optional defaults in ~/.certcli/config.json. Command-line flags and
//! environment variables take precedence over the file.

use anyhow::{Context, Result};
use certcli_issuer::IssuerConfig;
use certcli_renew::ReloadPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Issuer used by `add` when neither a flag nor the config file names one
pub const DEFAULT_SERVER: &str = "https://ca.example.com";

/// Global CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertcliConfig {
    /// Store root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Default issuer for new domains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Issuer request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Attempts for transient issuer failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    /// What a failing reload command does to the command's result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_failure: Option<ReloadPolicy>,
}

impl CertcliConfig {
    pub fn server(&self) -> &str {
        self.server.as_deref().unwrap_or(DEFAULT_SERVER)
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.reload_failure.unwrap_or_default()
    }

    /// Issuer settings, with `timeout_secs` overriding the file value
    pub fn issuer_config(&self, timeout_secs: Option<u64>) -> IssuerConfig {
        let mut config = IssuerConfig::default();
        if let Some(secs) = timeout_secs.or(self.timeout_secs) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = self.retry_attempts {
            config.retry_attempts = attempts.max(1);
        }
        config
    }

    /// Store root from the flag, falling back to the file
    pub fn store_dir(&self, flag: Option<&Path>) -> Result<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.dir.clone())
            .context("No store directory configured (use --dir or CERTCLI_DIR)")
    }
}

/// Configuration file access
pub struct ConfigManager;

impl ConfigManager {
    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".certcli").join("config.json"))
    }

    /// Load from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<CertcliConfig> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::default_path()?),
        }
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<CertcliConfig> {
        if !path.exists() {
            return Ok(CertcliConfig::default());
        }

        let json =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: CertcliConfig = serde_json::from_str(&json)
            .context(format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }
}
