//! Light-node wallet automator
//!
//! # WARNING
//! - wallets.json holds private keys in plain text. Keep it readable by you only.
//! - Every wallet should go through its own proxy; the service links wallets by IP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use lightnode_automator::cli::{commands, TaskChoice};
use lightnode_automator::config::Config;

/// Light-node wallet automator
#[derive(Parser)]
#[command(name = "lightnode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Interactive menu when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu
    Menu,

    /// Activate nodes, then claim daily points
    Activate {
        /// Keep running and repeat every cycle (24h by default)
        #[arg(long)]
        daily: bool,
    },

    /// Claim daily points
    Claim,

    /// Register wallets under the referral code
    Register,

    /// Run a verification task
    Tasks {
        #[arg(value_enum)]
        task: TaskChoice,

        /// Proof text for every wallet without one (prompted when omitted)
        #[arg(long)]
        proof: Option<String>,
    },

    /// Show the public IP behind each wallet's proxy
    Probe,

    /// Show per-wallet state
    Status,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lightnode_automator=info".parse()?),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = startup_checks(&config) {
        error!("Startup checks failed: {:#}", e);
        std::process::exit(1);
    }

    let result = match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => commands::menu(&config).await,
        Commands::Activate { daily } => commands::activate(&config, daily).await,
        Commands::Claim => commands::claim(&config).await,
        Commands::Register => commands::register(&config).await,
        Commands::Tasks { task, proof } => commands::tasks(&config, task, proof).await,
        Commands::Probe => commands::probe(&config).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Check the wallet file before anything touches it
fn startup_checks(config: &Config) -> Result<()> {
    let wallets = &config.files.wallets;
    if !wallets.exists() {
        warn!(
            "Wallet file {} not found; an empty one will be created",
            wallets.display()
        );
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(wallets)
            .map_err(|e| anyhow::anyhow!("Cannot read wallet file {}: {}", wallets.display(), e))?
            .permissions()
            .mode();

        // group or others can read the keys
        if mode & 0o077 != 0 {
            warn!(
                "Wallet file {} has permissions {:o}; run 'chmod 600 {}'",
                wallets.display(),
                mode & 0o777,
                wallets.display()
            );
        }
    }

    info!("Wallet file: {}", wallets.display());
    Ok(())
}
