//! Client for the remote certificate issuing service
//!
//! The issuer exposes four endpoints per domain:
//!
//! - `GET {server}/cert/{domain}`: JSON state (`serial`, `nextRenewTime`)
//! - `GET {server}/cert/{domain}/certificate`: leaf certificate
//! - `GET {server}/cert/{domain}/fullchain`: full chain
//! - `GET {server}/cert/{domain}/key`: private key, bearer-authenticated

pub mod bearer;
pub mod client;
pub mod error;

pub use bearer::bearer_token;
pub use client::{HttpIssuer, Issuer, IssuerConfig};
pub use error::IssuerError;
pub use url::Url;
