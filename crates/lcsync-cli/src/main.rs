//! lcsync CLI - Mirror a low-code platform's artifacts as local files
//!
//! Provides commands for:
//! - Fetching the remote entities of an environment onto disk
//! - Watching the local tree and pushing edits as minimal patches
//! - One-shot sync of a file or the whole environment
//! - Settling folder deletions
//! - Managing the access token and the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;
mod prompt;

use commands::{
    auth::AuthCommand, config::ConfigCommand, delete::DeleteCommand, fetch::FetchCommand,
    sync::SyncCommand, watch::WatchCommand,
};
use context::AppContext;
use lcsync_core::config::Config;
use output::{Output, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "lcsync",
    version,
    about = "Edit low-code platform artifacts as local files"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download remote entities into the environment root
    Fetch(FetchCommand),
    /// Watch the environment root and push changes
    Watch(WatchCommand),
    /// Push local changes once
    Sync(SyncCommand),
    /// Settle the removal of a mirrored folder
    Delete(DeleteCommand),
    /// Access token commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Cancels `token` on Ctrl+C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    token.cancel();
}

fn init_tracing(verbose: u8, json: bool, config_path: Option<&PathBuf>) {
    let filter = match verbose {
        0 => {
            let path = config_path.cloned().unwrap_or_else(Config::default_path);
            Config::load_or_default(&path).logging.level
        }
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli, out: Output) -> Result<()> {
    let config_path = cli.config.as_deref();

    if let Commands::Config(cmd) = &cli.command {
        return cmd.execute(config_path, out).await;
    }

    let ctx = AppContext::load(config_path)?;
    match &cli.command {
        Commands::Fetch(cmd) => cmd.execute(&ctx, out).await,
        Commands::Watch(cmd) => {
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_signal(shutdown.clone()));
            cmd.execute(&ctx, out, shutdown).await
        }
        Commands::Sync(cmd) => cmd.execute(&ctx, out).await,
        Commands::Delete(cmd) => cmd.execute(&ctx, out).await,
        Commands::Auth(cmd) => cmd.execute(&ctx, out).await,
        Commands::Config(_) => Ok(()),
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json, cli.config.as_ref());

    let out = Output::new(if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    });

    match run(cli, out).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            out.error(&format!("{e:#}"));
            std::process::ExitCode::FAILURE
        }
    }
}
