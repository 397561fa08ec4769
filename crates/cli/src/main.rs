mod app;
mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nudge_core::Config;
use nudge_cycle::{run_loop, Trigger};
use nudge_history::JsonlLedger;
use tracing::{info, warn};

use crate::app::RunOptions;
use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    nudge_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };

    match cli.command {
        Command::Run { snapshots, dry_run } => {
            config.log_summary();
            let runner = app::build_runner(
                &config,
                RunOptions {
                    snapshots: snapshots.as_deref(),
                    dry_run,
                },
            )?;
            let report = runner.run_once().await?;
            report.log();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { run_on_start } => {
            config.log_summary();
            let trigger = Trigger::from_config(&config.schedule)?;
            let runner = Arc::new(app::build_runner(&config, RunOptions::default())?);
            run_loop(runner, trigger, run_on_start, shutdown_signal()).await;
        }
        Command::History { task } => {
            // read without the ledger lock so this works next to a running `serve`
            let records = JsonlLedger::read_latest(&config.paths.history)
                .with_context(|| format!("failed to read history {}", config.paths.history.display()))?;
            let records: Vec<_> = records
                .into_iter()
                .filter(|r| task.as_deref().map_or(true, |t| r.task_key.eq_ignore_ascii_case(t)))
                .collect();
            for record in &records {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.sent_at.to_rfc3339(),
                    record.task_key,
                    record.rule,
                    record.recipient,
                    record.status,
                    record.response_summary
                );
            }
            info!(records = records.len(), "history listed");
        }
        Command::CheckConfig => {
            let loaded = app::load(&config)?;
            println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
            println!("{}", serde_json::to_string_pretty(&loaded.rules)?);
            println!("directory entries: {}", loaded.directory.len());
            Trigger::from_config(&config.schedule)?;
            info!("configuration ok");
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    info!("shutdown signal received");
}
