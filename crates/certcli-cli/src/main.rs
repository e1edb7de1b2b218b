//! certcli - Fetch and renew certificates from a remote issuer

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certcli_cli::commands::{self, AddArgs, CommandContext};
use certcli_cli::config::ConfigManager;

/// certcli - Keep local certificates in sync with a remote issuer
#[derive(Parser, Debug)]
#[command(name = "certcli")]
#[command(about = "Fetch and renew certificates from a remote issuer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Certificate store directory
    #[arg(short, long, global = true, env = "CERTCLI_DIR")]
    dir: Option<PathBuf>,

    /// Config file (default: ~/.certcli/config.json)
    #[arg(long, global = true, env = "CERTCLI_CONFIG")]
    config: Option<PathBuf>,

    /// Issuer request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize an empty certificate store
    Init {
        /// Store directory (must be empty)
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },
    /// Add a domain and fetch its key and certificate
    Add {
        /// Domain name
        domain: String,
        /// Certification server (default: config file, then https://ca.example.com)
        #[arg(short, long)]
        server: Option<String>,
        /// Command run after new certificates are written
        #[arg(short = 'r', long = "reloadcmd")]
        reload_cmd: Option<String>,
        /// Argument to the reload command (repeatable)
        #[arg(
            short = 'a',
            long = "arg",
            value_delimiter = ',',
            allow_hyphen_values = true
        )]
        reload_args: Vec<String>,
        /// Passphrase for the key endpoint (prompted when absent)
        #[arg(long, env = "CERTCLI_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
    /// Renew a domain's certificate when the issuer has a new one
    Renew {
        /// Domain name
        #[arg(required_unless_present = "all")]
        domain: Option<String>,
        /// Renew every registered domain
        #[arg(long, conflicts_with = "domain")]
        all: bool,
        /// Skip the renewal time and serial checks
        #[arg(short, long)]
        force: bool,
    },
    /// Remove a domain and its certificate files
    Remove {
        /// Domain name
        domain: String,
    },
    /// List registered domains
    List,
    /// Show a domain's configuration and state
    Show {
        /// Domain name
        domain: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let Cli {
        command,
        dir,
        config,
        timeout,
        ..
    } = cli;

    // init reads no configuration
    let load_context = || -> Result<CommandContext> {
        let config = ConfigManager::load(config.as_deref())?;
        Ok(CommandContext::new(config, dir.clone(), timeout))
    };

    match command {
        Commands::Init { path } => commands::handle_init(&path),
        Commands::Add {
            domain,
            server,
            reload_cmd,
            reload_args,
            passphrase,
        } => {
            let ctx = load_context()?;
            commands::handle_add(
                &ctx,
                AddArgs {
                    domain,
                    server,
                    reload_cmd,
                    reload_args,
                    passphrase,
                },
            )
            .await
        }
        Commands::Renew { domain, all, force } => {
            let ctx = load_context()?;
            commands::handle_renew(&ctx, domain, all, force).await
        }
        Commands::Remove { domain } => commands::handle_remove(&load_context()?, &domain),
        Commands::List => commands::handle_list(&load_context()?),
        Commands::Show { domain } => commands::handle_show(&load_context()?, &domain),
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "certcli",
            "--dir",
            "/srv/certs",
            "add",
            "example.com",
            "-s",
            "https://ca.test",
            "-r",
            "systemctl",
            "-a",
            "reload",
            "--arg",
            "nginx",
        ])
        .unwrap();

        assert_eq!(cli.dir, Some(PathBuf::from("/srv/certs")));
        match cli.command {
            Commands::Add {
                domain,
                server,
                reload_cmd,
                reload_args,
                ..
            } => {
                assert_eq!(domain, "example.com");
                assert_eq!(server.as_deref(), Some("https://ca.test"));
                assert_eq!(reload_cmd.as_deref(), Some("systemctl"));
                assert_eq!(reload_args, vec!["reload", "nginx"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_add_comma_separated_args() {
        let cli =
            Cli::try_parse_from(["certcli", "add", "example.com", "-a", "reload,nginx"]).unwrap();
        match cli.command {
            Commands::Add { reload_args, .. } => assert_eq!(reload_args, vec!["reload", "nginx"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_renew() {
        let cli = Cli::try_parse_from(["certcli", "renew", "example.com", "--force"]).unwrap();
        match cli.command {
            Commands::Renew { domain, all, force } => {
                assert_eq!(domain.as_deref(), Some("example.com"));
                assert!(!all);
                assert!(force);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["certcli", "renew", "--all"]).unwrap();
        assert!(matches!(cli.command, Commands::Renew { all: true, .. }));
    }

    #[test]
    fn test_renew_requires_domain_or_all() {
        assert!(Cli::try_parse_from(["certcli", "renew"]).is_err());
        assert!(Cli::try_parse_from(["certcli", "renew", "example.com", "--all"]).is_err());
    }

    #[tokio::test]
    async fn test_init_ignores_broken_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = temp.path().join("config.json");
        std::fs::write(&config, "{ not json").unwrap();
        let store = temp.path().join("store");
        let config_arg = config.to_str().unwrap();
        let store_arg = store.to_str().unwrap();

        let cli =
            Cli::try_parse_from(["certcli", "--config", config_arg, "init", store_arg]).unwrap();
        run(cli).await.unwrap();
        assert!(store.join("domains.json").exists());

        // Commands that use the configuration still report the broken file
        let cli = Cli::try_parse_from([
            "certcli",
            "--config",
            config_arg,
            "--dir",
            store_arg,
            "list",
        ])
        .unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_parse_init() {
        let cli = Cli::try_parse_from(["certcli", "init", "/srv/certs"]).unwrap();
        assert!(
            matches!(cli.command, Commands::Init { ref path } if path == &PathBuf::from("/srv/certs"))
        );
    }
}
