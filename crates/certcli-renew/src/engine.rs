//! Renewal decision and fetch-and-replace sequence
//!
//! One renewal call walks through:
//!
//! ```text
//! start -> state loaded -> issuer queried -> skipped | renewing -> applied | failed
//! ```
//!
//! The time check happens before the issuer is contacted. During renewal the
//! certificate, fullchain and state are written in that order, so an updated
//! state file marks a completed renewal. The key is only fetched on
//! enrollment; renewal assumes the issuer keeps the key.

use std::fmt;

use certcli_issuer::{Issuer, Url};
use certcli_store::{
    validate_domain, CertificateState, CertificateStore, DomainConfig, DomainRegistry, StoreError,
};
use chrono::{DateTime, Local, Utc};
use tracing::{debug, error, info, warn};

use crate::error::RenewError;
use crate::notify::{Notifier, NotifyOutcome, ReloadHook, ReloadPolicy};

/// Why a renewal call made no changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The persisted renewal time is still in the future
    NotDue { next_renew_time: DateTime<Utc> },
    /// The issuer reports the serial that is already installed
    SameSerial { serial: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotDue { next_renew_time } => write!(
                f,
                "not renewal time yet ({})",
                next_renew_time.with_timezone(&Local)
            ),
            SkipReason::SameSerial { serial } => write!(f, "same serial ({})", serial),
        }
    }
}

/// Result of a single-domain renewal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Skipped(SkipReason),
    Renewed {
        state: CertificateState,
        /// Present when a reload hook ran
        reload: Option<NotifyOutcome>,
    },
}

/// Result of enrolling a new domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub store: CertificateStore,
    pub state: CertificateState,
    pub reload: Option<NotifyOutcome>,
}

/// Per-domain results of a batch renewal
#[derive(Debug, Default)]
pub struct RenewReport {
    pub renewed: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<(String, RenewError)>,
}

impl RenewReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Skip check against the persisted state, made before any issuer request
pub fn check_due(
    persisted: &CertificateState,
    now: DateTime<Utc>,
    force: bool,
) -> Option<SkipReason> {
    if force || persisted.is_due(now) {
        return None;
    }
    Some(SkipReason::NotDue {
        next_renew_time: persisted.next_renew_time,
    })
}

/// Skip check against the issuer's current state
///
/// A domain without a persisted serial never matches.
pub fn check_serial(
    persisted: &CertificateState,
    fresh: &CertificateState,
    force: bool,
) -> Option<SkipReason> {
    if force || persisted.serial.is_empty() || persisted.serial != fresh.serial {
        return None;
    }
    Some(SkipReason::SameSerial {
        serial: fresh.serial.clone(),
    })
}

/// Orchestrates renewal over a registry; holds no persisted state of its own
pub struct RenewalEngine<I, N> {
    issuer: I,
    notifier: N,
    reload_policy: ReloadPolicy,
}

impl<I: Issuer, N: Notifier> RenewalEngine<I, N> {
    pub fn new(issuer: I, notifier: N) -> Self {
        Self {
            issuer,
            notifier,
            reload_policy: ReloadPolicy::default(),
        }
    }

    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.reload_policy
    }

    /// Renew one domain
    ///
    /// With `force` both skip checks are bypassed. Any error aborts the
    /// domain; artifacts written before the failure stay in place while the
    /// state file keeps its previous value.
    pub async fn renew(
        &self,
        registry: &DomainRegistry,
        domain: &str,
        force: bool,
    ) -> Result<RenewOutcome, RenewError> {
        let config = registry
            .config(domain)
            .cloned()
            .ok_or_else(|| RenewError::UnknownDomain(domain.to_string()))?;
        let (_, store) = registry.get(domain);

        let persisted = store.load_state()?;
        debug!(
            domain = %domain,
            serial = %persisted.serial,
            next_renew_time = %persisted.next_renew_time,
            "State loaded"
        );

        if let Some(reason) = check_due(&persisted, Utc::now(), force) {
            info!(domain = %domain, "Skipping renewal: {}", reason);
            return Ok(RenewOutcome::Skipped(reason));
        }

        let server = parse_server(&config.server)?;
        let fresh = self.issuer.fetch_state(&server, domain).await?;
        debug!(domain = %domain, serial = %fresh.serial, "Issuer queried");

        if let Some(reason) = check_serial(&persisted, &fresh, force) {
            info!(domain = %domain, "Skipping renewal: {}", reason);
            return Ok(RenewOutcome::Skipped(reason));
        }

        info!(domain = %domain, serial = %fresh.serial, force, "Renewing certificate");
        let fullchain = self.issuer.fetch_fullchain(&server, domain).await?;
        let certificate = self.issuer.fetch_certificate(&server, domain).await?;

        store.save_certificate(&certificate)?;
        store.save_fullchain(&fullchain)?;
        store.save_state(&fresh)?;

        let reload = self.reload(domain, &config, &store).await?;
        info!(domain = %domain, serial = %fresh.serial, "Renewed");

        Ok(RenewOutcome::Renewed {
            state: fresh,
            reload,
        })
    }

    /// Renew every registered domain in name order
    ///
    /// A failing domain is logged and recorded; the remaining domains are
    /// still processed.
    pub async fn renew_all(&self, registry: &DomainRegistry, force: bool) -> RenewReport {
        let domains: Vec<String> = registry.domains().map(|(name, _)| name.to_string()).collect();
        let mut report = RenewReport::default();

        for domain in domains {
            match self.renew(registry, &domain, force).await {
                Ok(RenewOutcome::Renewed { .. }) => report.renewed.push(domain),
                Ok(RenewOutcome::Skipped(reason)) => report.skipped.push((domain, reason)),
                Err(e) => {
                    error!(domain = %domain, error = %e, "Renewal failed");
                    report.failed.push((domain, e));
                }
            }
        }

        info!(
            renewed = report.renewed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Renewal run finished"
        );
        report
    }

    /// Register a new domain with its initial key and certificate
    ///
    /// All material is fetched before the domain is added, so a fetch failure
    /// leaves the registry untouched.
    pub async fn enroll(
        &self,
        registry: &mut DomainRegistry,
        domain: &str,
        config: DomainConfig,
        passphrase: &str,
    ) -> Result<Enrollment, RenewError> {
        validate_domain(domain)?;
        if registry.contains(domain) {
            return Err(StoreError::DomainExists(domain.to_string()).into());
        }
        let server = parse_server(&config.server)?;

        let key = self.issuer.fetch_key(&server, domain, passphrase).await?;
        let state = self.issuer.fetch_state(&server, domain).await?;
        let fullchain = self.issuer.fetch_fullchain(&server, domain).await?;
        let certificate = self.issuer.fetch_certificate(&server, domain).await?;

        let store = registry.add(domain, config.clone())?;
        store.save_key(&key)?;
        store.save_certificate(&certificate)?;
        store.save_fullchain(&fullchain)?;
        store.save_state(&state)?;

        let reload = self.reload(domain, &config, &store).await?;
        info!(domain = %domain, serial = %state.serial, "Enrolled");

        Ok(Enrollment {
            store,
            state,
            reload,
        })
    }

    async fn reload(
        &self,
        domain: &str,
        config: &DomainConfig,
        store: &CertificateStore,
    ) -> Result<Option<NotifyOutcome>, RenewError> {
        let Some(hook) = ReloadHook::from_config(config) else {
            return Ok(None);
        };

        let env = store.environment();
        let outcome = match self.notifier.notify(&hook, &env).await {
            Ok(outcome) => outcome,
            Err(source) => {
                if self.reload_policy == ReloadPolicy::Warn {
                    warn!(
                        domain = %domain,
                        command = %hook.command,
                        error = %source,
                        "Reload command could not be started"
                    );
                    return Ok(None);
                }
                return Err(RenewError::ReloadSpawn {
                    command: hook.command,
                    source,
                });
            }
        };

        if outcome.success {
            debug!(domain = %domain, output = %outcome.output_lossy(), "Reload command finished");
            return Ok(Some(outcome));
        }

        match self.reload_policy {
            ReloadPolicy::Fatal => Err(RenewError::ReloadHook {
                domain: domain.to_string(),
                command: hook.command,
                status: outcome.status_description(),
                output: outcome.output_lossy(),
            }),
            ReloadPolicy::Warn => {
                warn!(
                    domain = %domain,
                    command = %hook.command,
                    status = %outcome.status_description(),
                    "Reload command failed"
                );
                Ok(Some(outcome))
            }
        }
    }
}

fn parse_server(server: &str) -> Result<Url, RenewError> {
    Url::parse(server).map_err(|source| RenewError::InvalidServerUrl {
        server: server.to_string(),
        source,
    })
}
