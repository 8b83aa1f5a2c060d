//! gatewarden CLI
//!
//! Single binary for the bastion front-end:
//! - Interactive host browser (default)
//! - Allow-list listing and configuration management

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatewarden::commands;
use gatewarden::gateway::Gateway;
use gatewarden::tui::{self, BrowserController, CrosstermSurface};
use gw_core::config::{self, GatewayConfig};
use gw_core::identity::FileIdentityProvider;

#[derive(Parser)]
#[command(name = "gatewarden")]
#[command(author, version, about = "SSH bastion host browser")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "GATEWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Operator to act as (defaults to the login user)
    #[arg(short, long, global = true, env = "GATEWARDEN_USER")]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse allowed hosts and connect (default)
    Browse,

    /// Print the hosts the operator may reach
    List {
        /// Show detailed information
        #[arg(short, long)]
        long: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Show config directory path
    Path,
    /// Write a default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // Config commands work without a readable config
    if let Some(Commands::Config { action }) = &cli.command {
        init_logging(log_level, None)?;
        return match action {
            ConfigAction::Show => commands::config_show(&config_path),
            ConfigAction::Path => {
                commands::config_path();
                Ok(())
            }
            ConfigAction::Init { force } => commands::config_init(&config_path, *force),
        };
    }

    let config: GatewayConfig = config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let username = cli.user.clone().unwrap_or_else(whoami::username);

    let browsing = matches!(cli.command, None | Some(Commands::Browse));
    init_logging(log_level, browsing.then_some(config.log_file.as_path()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let command = cli.command;
    let result = runtime.block_on(async move {
        match command {
            None | Some(Commands::Browse) => browse(config, username).await,
            Some(Commands::List { long }) => commands::list_command(&config, &username, long).await,
            Some(Commands::Config { .. }) => Ok(()),
        }
    });

    // the browser's input reader may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(100));

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Set up tracing; with `log_file` the terminal stays free for the browser
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
    );

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
    Ok(())
}

async fn browse(config: GatewayConfig, username: String) -> Result<()> {
    tracing::info!("gatewarden {} starting for {}", env!("CARGO_PKG_VERSION"), username);

    let provider = Arc::new(FileIdentityProvider::from_config(&config.identity, config.ssh_port));
    let (gateway, completions) = Gateway::new(config, username.clone(), provider)
        .await
        .with_context(|| format!("Failed to load allowed hosts for {}", username))?;

    let shutdown = CancellationToken::new();
    #[cfg(unix)]
    let watcher = gatewarden::gateway::spawn_signal_watcher(gateway.active_session(), shutdown.clone());

    tui::install_panic_hook();
    let surface = CrosstermSurface::enter().context("Failed to initialize terminal")?;
    let mut controller =
        BrowserController::new(gateway, surface, completions).with_shutdown_token(shutdown.clone());
    let result = controller.run().await;

    // restores the terminal
    drop(controller);
    shutdown.cancel();
    #[cfg(unix)]
    let _ = watcher.await;

    tracing::info!("gatewarden exiting for {}", username);
    result
}
