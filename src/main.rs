//! Reconcile a JSON catalog with a mounted e-reader.

mod catalog;
mod error;

use crate::catalog::JsonCatalog;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use shelfsync_config::Config;
use shelfsync_reconcile::{Command, SessionContext, SyncReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SHELFSYNC_LOG";
/// `EX_TEMPFAIL`: the device is mounted but not settled yet.
const EXIT_TEMPFAIL: u8 = 75;

#[derive(Debug, Parser)]
#[command(name = "shelfsync", version, about)]
struct Cli {
    /// Configuration file. Defaults to `config.toml` in the platform
    /// configuration directory.
    #[arg(short, long, env = "SHELFSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// JSON catalog to reconcile with the device.
    #[arg(long, env = "SHELFSYNC_CATALOG")]
    catalog: PathBuf,
    /// One of: send-all, send-collections, send-read, send-favorite,
    /// send-ratings, send-reviews, load-all, load-collections, load-read,
    /// load-favorite, load-ratings, load-reviews, sync-positions,
    /// force-positions, extract-annotations, repair-authors.
    #[arg(value_parser = parse_command)]
    command: Command,
}

fn parse_command(value: &str) -> std::result::Result<Command, String> {
    value.parse()
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn execute(cli: Cli) -> Result<SyncReport> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let mut catalog = JsonCatalog::load(&cli.catalog).await?;
    let ctx = SessionContext::open(&config, &catalog).await.map_err(ErrorKind::reconcile)?;
    let outcome = shelfsync_reconcile::run(&ctx, &catalog, cli.command).await.map_err(ErrorKind::reconcile)?;
    ctx.explorer.close().await;

    if !outcome.changes.is_empty() {
        for change in outcome.changes.iter() {
            tracing::debug!(book = change.book, column = %change.column, value = ?change.value, "Catalog change");
        }
        let applied = outcome.changes.apply(&mut catalog).map_err(ErrorKind::reconcile)?;
        catalog.save().await?;
        tracing::info!(applied, path = %cli.catalog.display(), "Saved catalog");
    }
    Ok(outcome.report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    let command = cli.command;
    match execute(cli).await {
        Ok(report) => {
            println!("{command}: {report}");
            ExitCode::SUCCESS
        },
        Err(err) if err.is_retryable() => {
            tracing::error!(error = ?err, "Device is not ready, try again once it has finished indexing");
            ExitCode::from(EXIT_TEMPFAIL)
        },
        Err(err) => {
            tracing::error!(error = ?err, "Sync failed");
            ExitCode::FAILURE
        },
    }
}
