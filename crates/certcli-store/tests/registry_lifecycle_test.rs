//! Store lifecycle: init, add, state round-trip, remove

use certcli_store::{
    CertificateState, DomainConfig, DomainRegistry, StoreError, INDEX_FILE,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;

#[test]
fn test_domain_lifecycle() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("certstore");

    let mut registry = DomainRegistry::init(&root).unwrap();
    let store = registry
        .add("example.com", DomainConfig::new("https://ca.test"))
        .unwrap();

    assert!(root.join("certs").join("example.com").is_dir());
    let index = registry.load_index().unwrap();
    assert_eq!(index.domains.len(), 1);
    assert_eq!(index.domains["example.com"].server, "https://ca.test");

    // Fresh domain: default state, always due
    let state = store.load_state().unwrap();
    assert!(state.is_due(Utc::now()));

    let next = CertificateState::new("A", Utc::now() + Duration::days(30));
    store.save_state(&next).unwrap();
    assert_eq!(store.load_state().unwrap(), next);

    registry.remove("example.com").unwrap();
    assert!(!root.join("certs").join("example.com").exists());

    let reopened = DomainRegistry::open(&root).unwrap();
    assert!(reopened.is_empty());

    let (config, store) = reopened.get("example.com");
    assert_eq!(config, DomainConfig::default());
    assert!(!store.exists());
    assert_eq!(store.load_state().unwrap(), CertificateState::default());
}

#[test]
fn test_add_duplicate_keeps_tree() {
    let temp = TempDir::new().unwrap();
    let mut registry = DomainRegistry::init(temp.path()).unwrap();

    let store = registry
        .add("example.com", DomainConfig::new("https://ca.test"))
        .unwrap();
    store.save_certificate(b"original").unwrap();
    let index_before = std::fs::read(temp.path().join(INDEX_FILE)).unwrap();

    let result = registry.add("example.com", DomainConfig::new("https://ca.test"));
    assert!(matches!(result, Err(StoreError::DomainExists(ref d)) if d == "example.com"));

    assert_eq!(std::fs::read(temp.path().join(INDEX_FILE)).unwrap(), index_before);
    assert_eq!(std::fs::read(store.certificate_path()).unwrap(), b"original");
}

#[test]
fn test_open_reads_legacy_index() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("certs")).unwrap();
    std::fs::create_dir(temp.path().join("certs").join("legacy.example")).unwrap();
    std::fs::write(
        temp.path().join(INDEX_FILE),
        r#"{"Certs": {"legacy.example": {"Server": "https://ca.legacy"}}}"#,
    )
    .unwrap();

    let registry = DomainRegistry::open(temp.path()).unwrap();
    let (config, store) = registry.get("legacy.example");
    assert_eq!(config.server, "https://ca.legacy");
    assert!(store.exists());
}

#[test]
fn test_open_corrupt_index() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(INDEX_FILE), "[1, 2").unwrap();

    let err = DomainRegistry::open(temp.path()).unwrap_err();
    assert!(matches!(err, StoreError::Decode { .. }));
}
