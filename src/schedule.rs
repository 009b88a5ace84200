//! Cron-driven scheduled runs

use crate::error::{Error, Result};
use crate::pipeline::RunContext;
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

/// Parse a cron expression, mapping parse failures to config errors.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression)
        .map_err(|e| Error::Config(format!("Invalid cron expression '{expression}': {e}")))
}

/// Run the pipeline on the configured cron schedule until ctrl-c.
///
/// A failed run is logged and the loop keeps going; `RunLocked` from an
/// overlapping manual run is downgraded to a warning.
pub async fn run_scheduled(ctx: &RunContext, run_immediately: bool) -> Result<()> {
    let schedule = parse_schedule(&ctx.config.indexer.cron_schedule)?;

    if run_immediately {
        execute(ctx).await;
    }

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            return Err(Error::Config(format!(
                "Cron expression '{}' has no upcoming runs",
                ctx.config.indexer.cron_schedule
            )));
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(next = %next, wait_secs = wait.as_secs(), "Waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => execute(ctx).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping scheduler");
                return Ok(());
            }
        }
    }
}

async fn execute(ctx: &RunContext) {
    match ctx.run().await {
        Ok(report) => info!(
            processed = report.processed(),
            failed = report.failed,
            chunks = report.stats.total_chunks,
            "Scheduled run finished"
        ),
        Err(Error::RunLocked) => warn!("Skipping scheduled run, another run holds the lock"),
        Err(e) => error!("Scheduled run failed: {e}"),
    }
}
