//! vtsql walkthrough
//!
//! Connects to a version-controlled SQL server configured through `DB_*`
//! environment variables (a `.env` file is honoured) and walks through
//! branching, committing, diffing, merging and resetting a small employees
//! database. Exits non-zero when any step fails.

mod logging;
mod scenario;

use anyhow::Context;
use std::process::ExitCode;
use vtsql_session::{ConnectionConfig, SessionOptions, VersionedSession};

use crate::scenario::Walkthrough;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; everything can come from the real environment
    let dotenv_path = dotenvy::dotenv().ok();

    let log_config = if cfg!(debug_assertions) {
        logging::LoggingConfig::development()
    } else {
        logging::LoggingConfig::default()
    }
    .with_env(|key| std::env::var(key).ok());
    let _log_guard = match logging::init(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            // Logging isn't up yet, so stderr is the only channel
            eprintln!("FATAL: failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    match run().await {
        Ok(()) => {
            tracing::info!("walkthrough complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "walkthrough failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ConnectionConfig::from_env().context("reading connection settings")?;
    let options = SessionOptions::from_env().context("reading session settings")?;
    tracing::info!(?config, ?options, "starting walkthrough");

    let session = VersionedSession::connect_with_options(&config, options)
        .await
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;

    let walkthrough = Walkthrough::new(&session);
    let outcome = tokio::select! {
        outcome = walkthrough.run() => outcome,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    // The pool is released on every path, including failures and Ctrl-C
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close session cleanly");
    }

    let outcome = outcome?;
    tracing::info!(
        head = %outcome.head.short(),
        employees = outcome.employee_count,
        summary_rows = outcome.summary_rows,
        "final state of main"
    );
    Ok(())
}
