use certcli_issuer::IssuerError;
use certcli_store::StoreError;
use thiserror::Error;

/// Renewal and enrollment errors
#[derive(Debug, Error)]
pub enum RenewError {
    #[error("Domain not found: {0}")]
    UnknownDomain(String),

    #[error("Invalid server URL {server:?}: {source}")]
    InvalidServerUrl {
        server: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Issuer(#[from] IssuerError),

    #[error("Failed to run reload command {command:?}: {source}")]
    ReloadSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Reload command {command:?} for {domain} failed ({status}): {output}")]
    ReloadHook {
        domain: String,
        command: String,
        status: String,
        output: String,
    },
}
