//! Reload hook notification

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;

use async_trait::async_trait;
use certcli_store::DomainConfig;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// External command signalling a consumer to pick up new certificate files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadHook {
    pub command: String,
    pub args: Vec<String>,
}

impl ReloadHook {
    /// Hook configured for a domain, if any
    pub fn from_config(config: &DomainConfig) -> Option<Self> {
        let command = config.reload_command.as_deref()?;
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command: command.to_string(),
            args: config.reload_args.clone(),
        })
    }
}

/// Result of running a reload hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Standard output followed by standard error
    pub output: Vec<u8>,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl NotifyOutcome {
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn status_description(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// What a failed reload hook does to the surrounding operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadPolicy {
    /// The operation fails
    #[default]
    Fatal,
    /// The failure is logged and the operation succeeds
    Warn,
}

impl FromStr for ReloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" => Ok(ReloadPolicy::Fatal),
            "warn" => Ok(ReloadPolicy::Warn),
            other => Err(format!(
                "unknown reload failure policy {:?} (expected fatal or warn)",
                other
            )),
        }
    }
}

impl fmt::Display for ReloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadPolicy::Fatal => write!(f, "fatal"),
            ReloadPolicy::Warn => write!(f, "warn"),
        }
    }
}

/// Runs reload hooks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Run `hook` to completion with `env` added to the inherited environment
    async fn notify(
        &self,
        hook: &ReloadHook,
        env: &[(&'static str, PathBuf)],
    ) -> std::io::Result<NotifyOutcome>;
}

/// Notifier spawning the hook as a child process
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandNotifier;

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(
        &self,
        hook: &ReloadHook,
        env: &[(&'static str, PathBuf)],
    ) -> std::io::Result<NotifyOutcome> {
        debug!(command = %hook.command, args = ?hook.args, "Running reload command");

        let output = Command::new(&hook.command)
            .args(&hook.args)
            .envs(env.iter().map(|(name, path)| (*name, path.as_os_str())))
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        Ok(NotifyOutcome {
            output: combined,
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }
}
