//! Domain registry
//!
//! The registry index (`domains.json`) is the single source of truth for
//! which domains exist. Every entry has a directory under `certs/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::fsutil::{self, PUBLIC_MODE};
use crate::store::CertificateStore;

/// Name of the index file at the store root
pub const INDEX_FILE: &str = "domains.json";

const CERTS_DIR: &str = "certs";

/// Issuance configuration for one domain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    /// Base URL of the issuing service
    #[serde(alias = "Server", default)]
    pub server: String,
    /// Command run after new certificate material was written
    #[serde(
        alias = "ReloadCmd",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub reload_command: Option<String>,
    /// Arguments passed to the reload command
    #[serde(alias = "Args", default, skip_serializing_if = "Vec::is_empty")]
    pub reload_args: Vec<String>,
}

impl DomainConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    pub fn with_reload(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.reload_command = Some(command.into());
        self.reload_args = args;
        self
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Persisted registry index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainIndex {
    #[serde(alias = "Certs", default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

/// Registry of known domains rooted at a store directory
#[derive(Debug)]
pub struct DomainRegistry {
    root: PathBuf,
    index: DomainIndex,
}

impl DomainRegistry {
    /// Initialize a new store root
    ///
    /// The directory is created if missing. It must be empty: existing
    /// content is never merged, so a partial earlier run has to be cleaned
    /// up by hand.
    pub fn init(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = absolute(root.as_ref());

        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        let mut entries = fs::read_dir(&root).map_err(|e| StoreError::io(&root, e))?;
        if entries.next().is_some() {
            return Err(StoreError::AlreadyInitialized(root));
        }

        let certs = root.join(CERTS_DIR);
        create_dir(&certs)?;

        let registry = Self {
            root,
            index: DomainIndex::default(),
        };
        registry.save_index(&registry.index)?;

        info!(root = %registry.root.display(), "Initialized certificate store");
        Ok(registry)
    }

    /// Open an initialized store root and load its index
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = absolute(root.as_ref());
        let mut registry = Self {
            root,
            index: DomainIndex::default(),
        };
        registry.index = registry.load_index()?;
        debug!(
            root = %registry.root.display(),
            domains = registry.index.domains.len(),
            "Opened certificate store"
        );
        Ok(registry)
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.root.join(CERTS_DIR).join(domain)
    }

    /// Read the index file from disk
    pub fn load_index(&self) -> Result<DomainIndex, StoreError> {
        let path = self.index_path();
        let data = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_slice(&data).map_err(|source| StoreError::Decode { path, source })
    }

    /// Write a complete replacement index file
    pub fn save_index(&self, index: &DomainIndex) -> Result<(), StoreError> {
        let path = self.index_path();
        let mut json = serde_json::to_vec_pretty(index).map_err(|source| StoreError::Encode {
            path: path.clone(),
            source,
        })?;
        json.push(b'\n');
        fsutil::write_replace(&path, &json, PUBLIC_MODE)
    }

    /// Look up a domain
    ///
    /// Unknown domains yield a default config. The store handle is returned
    /// either way and its directory is not checked.
    pub fn get(&self, domain: &str) -> (DomainConfig, CertificateStore) {
        let config = self.index.domains.get(domain).cloned().unwrap_or_default();
        (config, CertificateStore::new(self.domain_dir(domain)))
    }

    pub fn config(&self, domain: &str) -> Option<&DomainConfig> {
        self.index.domains.get(domain)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.index.domains.contains_key(domain)
    }

    /// Registered domains in name order
    pub fn domains(&self) -> impl Iterator<Item = (&str, &DomainConfig)> {
        self.index
            .domains
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.index.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.domains.is_empty()
    }

    /// Register a new domain and create its directory
    ///
    /// The directory is created before the index is touched. If persisting
    /// the index fails afterwards the directory stays behind without an
    /// entry; the in-memory index is rolled back.
    pub fn add(&mut self, domain: &str, config: DomainConfig) -> Result<CertificateStore, StoreError> {
        validate_domain(domain)?;
        if self.contains(domain) {
            return Err(StoreError::DomainExists(domain.to_string()));
        }

        let dir = self.domain_dir(domain);
        create_dir(&dir)?;

        self.index.domains.insert(domain.to_string(), config);
        if let Err(e) = self.save_index(&self.index) {
            self.index.domains.remove(domain);
            return Err(e);
        }

        info!(domain = %domain, dir = %dir.display(), "Added domain");
        Ok(CertificateStore::new(dir))
    }

    /// Delete a domain's directory and then its index entry
    ///
    /// If the directory cannot be deleted the index is left unchanged.
    pub fn remove(&mut self, domain: &str) -> Result<(), StoreError> {
        validate_domain(domain)?;
        if !self.contains(domain) {
            return Err(StoreError::UnknownDomain(domain.to_string()));
        }

        let (_, store) = self.get(domain);
        store.remove()?;

        let removed = self.index.domains.remove(domain);
        if let Err(e) = self.save_index(&self.index) {
            if let Some(config) = removed {
                self.index.domains.insert(domain.to_string(), config);
            }
            return Err(e);
        }

        info!(domain = %domain, "Removed domain");
        Ok(())
    }
}

/// Domain names become directory names, so they must be a single path component
pub fn validate_domain(domain: &str) -> Result<(), StoreError> {
    let invalid = domain.is_empty()
        || domain == "."
        || domain == ".."
        || domain.starts_with('.')
        || domain
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control());
    if invalid {
        return Err(StoreError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path).map_err(|e| StoreError::io(path, e))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
