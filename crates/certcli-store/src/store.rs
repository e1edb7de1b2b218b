//! Per-domain certificate storage

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::fsutil::{self, PRIVATE_MODE, PUBLIC_MODE};

const STATE_FILE: &str = "state";
const CERTIFICATE_FILE: &str = "server.cer";
const KEY_FILE: &str = "server.key";
const FULLCHAIN_FILE: &str = "fullchain.cer";

/// Issuer state as last applied to a domain's certificate set
///
/// The default value (empty serial, epoch renewal time) stands in for a
/// domain that has never completed a fetch and is therefore always due.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateState {
    /// Opaque issuer-assigned identifier, compared for equality only
    #[serde(alias = "Serial")]
    pub serial: String,
    /// Earliest time a renewal check should act
    #[serde(alias = "NextRenewTime")]
    pub next_renew_time: DateTime<Utc>,
}

impl CertificateState {
    pub fn new(serial: impl Into<String>, next_renew_time: DateTime<Utc>) -> Self {
        Self {
            serial: serial.into(),
            next_renew_time,
        }
    }

    /// Whether a renewal check at `now` should go on to query the issuer
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_renew_time <= now
    }
}

/// Handle on one domain's certificate directory
///
/// Owns the four artifact files inside the directory. Handles are created by
/// [`crate::DomainRegistry`]; the directory may not exist yet (or any more).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory holding this domain's artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the domain directory is present on disk
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.dir.join(CERTIFICATE_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    pub fn fullchain_path(&self) -> PathBuf {
        self.dir.join(FULLCHAIN_FILE)
    }

    /// Artifact locations as `(variable, path)` pairs for the reload hook
    pub fn environment(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("CERT_STATE", self.absolute(self.state_path())),
            ("CERT_CERT", self.absolute(self.certificate_path())),
            ("CERT_KEY", self.absolute(self.key_path())),
            ("CERT_FULL", self.absolute(self.fullchain_path())),
        ]
    }

    /// Artifact locations as `NAME=path` strings
    pub fn environment_variables(&self) -> Vec<String> {
        self.environment()
            .into_iter()
            .map(|(name, path)| format!("{}={}", name, path.display()))
            .collect()
    }

    fn absolute(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            return path;
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    }

    /// Load the persisted state
    ///
    /// A missing state file is not an error: it yields the default state so
    /// that a freshly added domain is always due for renewal.
    pub fn load_state(&self) -> Result<CertificateState, StoreError> {
        let path = self.state_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file, using default state");
                return Ok(CertificateState::default());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        serde_json::from_slice(&data).map_err(|source| StoreError::Decode { path, source })
    }

    /// Overwrite the state file, pretty-printed
    pub fn save_state(&self, state: &CertificateState) -> Result<(), StoreError> {
        let path = self.state_path();
        let mut json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Encode {
            path: path.clone(),
            source,
        })?;
        json.push(b'\n');

        fsutil::write_replace(&path, &json, PUBLIC_MODE)?;
        debug!(path = %path.display(), serial = %state.serial, "Saved certificate state");
        Ok(())
    }

    pub fn save_key(&self, data: &[u8]) -> Result<(), StoreError> {
        fsutil::write_replace(&self.key_path(), data, PRIVATE_MODE)
    }

    pub fn save_certificate(&self, data: &[u8]) -> Result<(), StoreError> {
        fsutil::write_replace(&self.certificate_path(), data, PUBLIC_MODE)
    }

    pub fn save_fullchain(&self, data: &[u8]) -> Result<(), StoreError> {
        fsutil::write_replace(&self.fullchain_path(), data, PUBLIC_MODE)
    }

    /// Delete the domain directory and everything under it
    pub fn remove(&self) -> Result<(), StoreError> {
        fsutil::remove_tree(&self.dir)
    }
}
