//! The wait loop for a submitted job.
//!
//! The scheduler offers no change notifications, so every phase polls with a bounded sleep:
//!
//! 1. launch: poll the status until the job leaves `Pending`, printing a heartbeat when the
//!    status changes or the heartbeat interval passes.
//! 2. logs: forward each log chunk as it arrives until the stream is exhausted.
//! 3. completion: poll until the scheduler reports a terminal phase, for at most
//!    `completion_timeout`. Log output can end before the phase is updated.
//! 4. classify the outcome. A job that never reached a terminal phase is killed before the
//!    failure is returned, so nothing is left running once `wait_for_job` returns.

use crate::client::JobHandle;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::events::{JobState, JobStatus};
use tokio::time::{self, Instant};

fn starting_line(status: JobStatus) -> String {
    format!("Task is starting (status {})...", status)
}

/// Wait for the job to leave the starting phase. Returns the first non-pending state.
pub async fn wait_for_launch<E>(
    handle: &dyn JobHandle,
    config: &MonitorConfig,
    echo: &mut E,
) -> Result<JobState>
where
    E: FnMut(&str, &str),
{
    let mut status = handle.state().await?.status;
    echo(handle.id(), &starting_line(status));
    let mut last_heartbeat = Instant::now();
    loop {
        let state = handle.state().await?;
        if state.status.is_launched() {
            tracing::debug!(job = handle.name(), status = %state.status, "Job launched");
            return Ok(state);
        }
        if state.status != status || last_heartbeat.elapsed() > config.heartbeat_interval {
            status = state.status;
            echo(handle.id(), &starting_line(status));
            last_heartbeat = Instant::now();
        }
        time::sleep(config.launch_poll).await;
    }
}

/// Forward the job's log output until the stream is exhausted.
///
/// An empty chunk also ends the stream.
pub async fn stream_logs<E>(
    handle: &dyn JobHandle,
    config: &MonitorConfig,
    echo: &mut E,
) -> Result<()>
where
    E: FnMut(&str, &str),
{
    let mut logs = handle.logs().await?;
    loop {
        match time::timeout(config.log_poll, logs.recv()).await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                let text = String::from_utf8_lossy(&chunk);
                echo(handle.id(), text.trim_end_matches(&['\r', '\n'][..]));
            }
            Ok(_) => return Ok(()),
            // nothing yet, poll again
            Err(_) => continue,
        }
    }
}

/// Poll until the job reaches a terminal phase or `completion_timeout` passes.
pub async fn wait_for_completion(
    handle: &dyn JobHandle,
    config: &MonitorConfig,
) -> Result<JobState> {
    let deadline = Instant::now() + config.completion_timeout;
    loop {
        let state = handle.state().await?;
        if state.status.is_finished() || Instant::now() >= deadline {
            return Ok(state);
        }
        time::sleep(config.completion_poll).await;
    }
}

/// Turn the final observed state into the step's outcome.
pub async fn classify<E>(handle: &dyn JobHandle, state: JobState, echo: &mut E) -> Result<()>
where
    E: FnMut(&str, &str),
{
    match state.status {
        JobStatus::Done => {
            echo(
                handle.id(),
                &format!("Task finished with status {}.", state.status),
            );
            Ok(())
        }
        JobStatus::Crashed => Err(Error::Crashed {
            reason: state.reason,
        }),
        JobStatus::Killed => Err(Error::Killed {
            reason: state.reason,
        }),
        JobStatus::Pending | JobStatus::Running => {
            tracing::warn!(
                job = handle.name(),
                status = %state.status,
                "Job did not reach a terminal phase, killing it"
            );
            if let Err(err) = handle.kill().await {
                tracing::warn!(job = handle.name(), error = %err, "Failed to kill abandoned job");
            }
            Err(Error::TaskFailed {
                name: handle.name().to_string(),
            })
        }
    }
}

/// Drive a submitted job to completion, streaming its output to `echo(job_id, line)`.
pub async fn wait_for_job<E>(
    handle: &dyn JobHandle,
    config: &MonitorConfig,
    mut echo: E,
) -> Result<()>
where
    E: FnMut(&str, &str),
{
    wait_for_launch(handle, config, &mut echo).await?;
    stream_logs(handle, config, &mut echo).await?;
    let state = wait_for_completion(handle, config).await?;
    tracing::info!(job = handle.name(), status = %state.status, "Job wait finished");
    classify(handle, state, &mut echo).await
}
