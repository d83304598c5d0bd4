use crate::Result;
use crate::agent::ScanAgent;
use crate::config::Config;
use core::time::Duration;
use ohno::bail;
use std::path::PathBuf;
use tokio::time::Instant;

const LOG_TARGET: &str = "     scan";

/// Fixed cadence of the upload-status poll.
pub const POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Upload states that end polling successfully.
const SUCCESS_STATES: [&str; 2] = ["UPDATED", "FINISHED"];

/// Upload states that abort the run.
const FAILURE_STATES: [&str; 2] = ["UNKNOWN", "FAILED"];

/// Hand the resolved source directories to the scanning agent and wait for the upload to land.
///
/// A failed or unknown upload status is fatal; the reattribution stage would otherwise operate
/// on a stale inventory.
pub async fn dispatch(config: &Config, agent: &ScanAgent, scan_dirs: &[PathBuf]) -> Result<()> {
    let dirs: Vec<PathBuf> = scan_dirs
        .iter()
        .map(|dir| dir.canonicalize().unwrap_or_else(|_| dir.clone()))
        .collect();

    let submission = agent.scan(&dirs).await?;
    log::info!(target: LOG_TARGET, "{}", submission.summary);

    let timeout = (config.scan_status_timeout > 0).then(|| Duration::from_secs(config.scan_status_timeout));

    poll_upload_status(
        async || config.backend.get_scan_status(&submission.request_token).await,
        POLL_INTERVAL,
        timeout,
    )
    .await
}

/// Poll the upload status to a terminal state.
///
/// Success states return normally; failure states and an elapsed timeout are errors. Every
/// other state keeps polling at the given interval.
pub async fn poll_upload_status<F>(mut status: F, interval: Duration, timeout: Option<Duration>) -> Result<()>
where
    F: AsyncFnMut() -> Result<String>,
{
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let state = status().await?;
        log::info!(target: LOG_TARGET, "Scan data upload status: {state}");

        if SUCCESS_STATES.contains(&state.as_str()) {
            log::info!(target: LOG_TARGET, "scan upload completed");
            return Ok(());
        }

        if FAILURE_STATES.contains(&state.as_str()) {
            bail!("scan failed to upload; status is {state}");
        }

        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            bail!("scan upload did not reach a terminal state in time; last status is {state}");
        }

        tokio::time::sleep(interval).await;
    }
}
