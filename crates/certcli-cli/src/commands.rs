//! Command handlers

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use certcli_issuer::HttpIssuer;
use certcli_renew::{CommandNotifier, NotifyOutcome, RenewOutcome, RenewalEngine};
use certcli_store::{DomainConfig, DomainRegistry};
use chrono::Local;
use tracing::{debug, warn};

use crate::config::CertcliConfig;

/// Settings shared by all commands after flags and config file are merged
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub config: CertcliConfig,
    /// `--dir` / `CERTCLI_DIR`
    pub dir: Option<PathBuf>,
    /// `--timeout`
    pub timeout_secs: Option<u64>,
}

impl CommandContext {
    pub fn new(config: CertcliConfig, dir: Option<PathBuf>, timeout_secs: Option<u64>) -> Self {
        Self {
            config,
            dir,
            timeout_secs,
        }
    }

    fn open_registry(&self) -> Result<DomainRegistry> {
        let dir = self.config.store_dir(self.dir.as_deref())?;
        DomainRegistry::open(&dir).context(format!("Failed to open store at {:?}", dir))
    }

    fn engine(&self) -> Result<RenewalEngine<HttpIssuer, CommandNotifier>> {
        let issuer = HttpIssuer::new(self.config.issuer_config(self.timeout_secs))
            .context("Failed to create issuer client")?;
        Ok(RenewalEngine::new(issuer, CommandNotifier)
            .with_reload_policy(self.config.reload_policy()))
    }
}

/// Arguments of the `add` command
#[derive(Debug, Clone, Default)]
pub struct AddArgs {
    pub domain: String,
    pub server: Option<String>,
    pub reload_cmd: Option<String>,
    pub reload_args: Vec<String>,
    pub passphrase: Option<String>,
}

pub fn handle_init(dir: &Path) -> Result<()> {
    let registry =
        DomainRegistry::init(dir).context(format!("Failed to initialize store at {:?}", dir))?;
    println!("✅ Initialized certificate store at {}", registry.root().display());
    Ok(())
}

pub async fn handle_add(ctx: &CommandContext, args: AddArgs) -> Result<()> {
    let mut registry = ctx.open_registry()?;

    let server = args
        .server
        .unwrap_or_else(|| ctx.config.server().to_string());
    let mut config = DomainConfig::new(server);
    match args.reload_cmd.filter(|c| !c.is_empty()) {
        Some(command) => config = config.with_reload(command, args.reload_args),
        None if !args.reload_args.is_empty() => {
            warn!("Ignoring --arg without --reloadcmd");
        }
        None => {}
    }

    let passphrase = passphrase_or_prompt(args.passphrase, read_passphrase)?;

    let engine = ctx.engine()?;
    let enrollment = engine
        .enroll(&mut registry, &args.domain, config, &passphrase)
        .await
        .context(format!("Failed to add domain '{}'", args.domain))?;

    print_reload_output(enrollment.reload.as_ref());
    println!(
        "✅ Domain '{}' added (serial {}, next renewal {})",
        args.domain,
        enrollment.state.serial,
        enrollment.state.next_renew_time.with_timezone(&Local)
    );
    Ok(())
}

pub async fn handle_renew(
    ctx: &CommandContext,
    domain: Option<String>,
    all: bool,
    force: bool,
) -> Result<()> {
    let registry = ctx.open_registry()?;
    let engine = ctx.engine()?;

    if all {
        let report = engine.renew_all(&registry, force).await;
        for name in &report.renewed {
            println!("✅ {} renewed", name);
        }
        for (name, reason) in &report.skipped {
            println!("{}: {}", name, reason);
        }
        for (name, error) in &report.failed {
            eprintln!("❌ {}: {}", name, error);
        }
        if report.has_failures() {
            anyhow::bail!(
                "{} of {} domain(s) failed to renew",
                report.failed.len(),
                registry.len()
            );
        }
        return Ok(());
    }

    let domain = domain.context("A domain or --all is required")?;
    let outcome = engine
        .renew(&registry, &domain, force)
        .await
        .context(format!("Failed to renew '{}'", domain))?;

    match outcome {
        RenewOutcome::Skipped(reason) => println!("{}: {}", domain, reason),
        RenewOutcome::Renewed { state, reload } => {
            print_reload_output(reload.as_ref());
            println!("✅ {} renewed (serial {})", domain, state.serial);
        }
    }
    Ok(())
}

pub fn handle_remove(ctx: &CommandContext, domain: &str) -> Result<()> {
    let mut registry = ctx.open_registry()?;
    registry
        .remove(domain)
        .context(format!("Failed to remove domain '{}'", domain))?;
    println!("✅ Domain '{}' removed", domain);
    Ok(())
}

pub fn handle_list(ctx: &CommandContext) -> Result<()> {
    let registry = ctx.open_registry()?;

    if registry.is_empty() {
        println!("No domains configured");
        println!("Add one with: certcli add <domain> --server <url>");
        return Ok(());
    }

    println!("{:<40} {:<30} {:<20} NEXT RENEWAL", "DOMAIN", "SERVER", "SERIAL");
    for (name, config) in registry.domains() {
        let (_, store) = registry.get(name);
        let (serial, next) = match store.load_state() {
            Ok(state) if !state.serial.is_empty() => (
                state.serial,
                state
                    .next_renew_time
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            ),
            Ok(_) => ("-".to_string(), "due".to_string()),
            Err(e) => {
                warn!(domain = %name, error = %e, "Failed to load state");
                ("?".to_string(), "?".to_string())
            }
        };
        println!("{:<40} {:<30} {:<20} {}", name, config.server, serial, next);
    }
    Ok(())
}

pub fn handle_show(ctx: &CommandContext, domain: &str) -> Result<()> {
    let registry = ctx.open_registry()?;
    let config = registry
        .config(domain)
        .with_context(|| format!("Domain '{}' not found", domain))?;
    let (_, store) = registry.get(domain);
    let state = store
        .load_state()
        .context(format!("Failed to load state for '{}'", domain))?;

    println!("Domain: {}", domain);
    println!("Server: {}", config.server);
    if let Some(command) = &config.reload_command {
        println!("Reload: {} {}", command, config.reload_args.join(" "));
    }
    if state.serial.is_empty() {
        println!("Serial: -");
        println!("Next renewal: due");
    } else {
        println!("Serial: {}", state.serial);
        println!(
            "Next renewal: {}",
            state.next_renew_time.with_timezone(&Local)
        );
    }
    println!("Files:");
    for var in store.environment_variables() {
        println!("  {}", var);
    }
    Ok(())
}

fn print_reload_output(outcome: Option<&NotifyOutcome>) {
    if let Some(outcome) = outcome {
        let output = outcome.output_lossy();
        if !output.is_empty() {
            println!("{}", output.trim_end());
        }
    }
}

/// Use the given passphrase, or ask for one without echoing it
fn passphrase_or_prompt<F>(given: Option<String>, prompt: F) -> Result<String>
where
    F: FnOnce() -> io::Result<String>,
{
    match given {
        Some(passphrase) => Ok(passphrase),
        None => {
            let passphrase = prompt().context("Failed to read passphrase")?;
            debug!("Passphrase read from terminal");
            Ok(passphrase)
        }
    }
}

fn read_passphrase() -> io::Result<String> {
    rpassword::prompt_password("Enter passphrase: ")
}
