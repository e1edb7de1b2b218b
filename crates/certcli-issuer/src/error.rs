use thiserror::Error;

/// Issuer client errors
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("Invalid issuer URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Issuer returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid state payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl IssuerError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            IssuerError::Transport { .. } => true,
            IssuerError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
