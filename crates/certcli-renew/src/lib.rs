//! Certificate renewal and enrollment
//!
//! [`RenewalEngine`] decides whether a domain needs new material, fetches it
//! from an [`certcli_issuer::Issuer`], writes it through the domain's
//! [`certcli_store::CertificateStore`] and runs the configured reload hook.
//! Domains are processed one at a time.

pub mod engine;
pub mod error;
pub mod notify;

pub use engine::{
    check_due, check_serial, Enrollment, RenewOutcome, RenewReport, RenewalEngine, SkipReason,
};
pub use error::RenewError;
pub use notify::{CommandNotifier, Notifier, NotifyOutcome, ReloadHook, ReloadPolicy};
