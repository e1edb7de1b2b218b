//! On-disk domain registry and per-domain certificate storage
//!
//! A store root looks like this:
//!
//! ```text
//! root/
//! ├── domains.json          # registry index
//! └── certs/
//!     └── example.com/
//!         ├── state         # issuer state (serial, next renewal time)
//!         ├── server.cer    # leaf certificate
//!         ├── server.key    # private key
//!         └── fullchain.cer # full chain
//! ```
//!
//! The store assumes a single cooperating process per root. Individual files
//! are replaced through a temporary file and a rename, but there is no
//! cross-process locking of the index.

pub mod error;
mod fsutil;
pub mod registry;
pub mod store;

pub use error::StoreError;
pub use registry::{validate_domain, DomainConfig, DomainIndex, DomainRegistry, INDEX_FILE};
pub use store::{CertificateState, CertificateStore};
