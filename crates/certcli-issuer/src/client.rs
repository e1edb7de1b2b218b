//! Issuer trait and HTTP implementation

use std::time::Duration;

use async_trait::async_trait;
use certcli_store::CertificateState;
use tracing::{debug, warn};
use url::Url;

use crate::bearer::bearer_token;
use crate::error::IssuerError;

/// Fetch contract against the issuing service
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Current state (serial, next renewal time) for a domain
    async fn fetch_state(&self, server: &Url, domain: &str)
        -> Result<CertificateState, IssuerError>;

    /// Leaf certificate bytes
    async fn fetch_certificate(&self, server: &Url, domain: &str) -> Result<Vec<u8>, IssuerError>;

    /// Full chain bytes
    async fn fetch_fullchain(&self, server: &Url, domain: &str) -> Result<Vec<u8>, IssuerError>;

    /// Private key bytes, authorized by the domain passphrase
    async fn fetch_key(
        &self,
        server: &Url,
        domain: &str,
        passphrase: &str,
    ) -> Result<Vec<u8>, IssuerError>;
}

/// Request settings for [`HttpIssuer`]
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts for transient failures (at least one)
    pub retry_attempts: u32,
    /// Delay before the first retry, grows linearly
    pub retry_backoff: Duration,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Issuer client over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    client: reqwest::Client,
    config: IssuerConfig,
}

impl HttpIssuer {
    pub fn new(config: IssuerConfig) -> Result<Self, IssuerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("certcli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(IssuerError::Client)?;

        Ok(Self { client, config })
    }

    async fn get(&self, url: Url, bearer: Option<&str>) -> Result<Vec<u8>, IssuerError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.get_once(&url, bearer).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(url = %url, attempt, error = %e, "Issuer request failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &Url, bearer: Option<&str>) -> Result<Vec<u8>, IssuerError> {
        debug!(url = %url, "Fetching from issuer");

        let mut request = self.client.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let transport = |source| IssuerError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(IssuerError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        debug!(url = %url, bytes = body.len(), "Issuer response received");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Issuer for HttpIssuer {
    async fn fetch_state(
        &self,
        server: &Url,
        domain: &str,
    ) -> Result<CertificateState, IssuerError> {
        let url = endpoint(server, domain, None)?;
        let body = self.get(url.clone(), None).await?;
        serde_json::from_slice(&body).map_err(|source| IssuerError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn fetch_certificate(&self, server: &Url, domain: &str) -> Result<Vec<u8>, IssuerError> {
        self.get(endpoint(server, domain, Some("certificate"))?, None)
            .await
    }

    async fn fetch_fullchain(&self, server: &Url, domain: &str) -> Result<Vec<u8>, IssuerError> {
        self.get(endpoint(server, domain, Some("fullchain"))?, None)
            .await
    }

    async fn fetch_key(
        &self,
        server: &Url,
        domain: &str,
        passphrase: &str,
    ) -> Result<Vec<u8>, IssuerError> {
        let token = bearer_token(passphrase);
        self.get(endpoint(server, domain, Some("key"))?, Some(&token))
            .await
    }
}

/// Build `{server}/cert/{domain}[/{artifact}]`, keeping any base path on `server`
pub fn endpoint(server: &Url, domain: &str, artifact: Option<&str>) -> Result<Url, IssuerError> {
    let mut url = server.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| IssuerError::InvalidUrl(server.to_string()))?;
        segments.pop_if_empty().push("cert").push(domain);
        if let Some(artifact) = artifact {
            segments.push(artifact);
        }
    }
    Ok(url)
}
