use crate::client::{ClusterClient, JobHandleRef, JobRecord};
use crate::error::Result;
use crate::registry::find_jobs;

async fn kill_one(client: &dyn ClusterClient, job: &JobRecord) -> Result<()> {
    client.attach(&job.name, &job.namespace).await?.kill().await
}

/// Kill every unfinished job of a flow run, optionally only one user's.
///
/// A failure to kill one job is reported through `echo` and the remaining jobs are still
/// attempted. Returns how many jobs were killed.
pub async fn kill_jobs<E>(
    client: &dyn ClusterClient,
    flow_name: &str,
    run_id: &str,
    user: Option<&str>,
    mut echo: E,
) -> Result<usize>
where
    E: FnMut(&str),
{
    let jobs = find_jobs(client, flow_name, run_id, user).await?;
    if jobs.is_empty() {
        echo("No running jobs found.");
        return Ok(0);
    }

    let mut killed = 0;
    for job in &jobs {
        match kill_one(client, job).await {
            Ok(()) => {
                killed += 1;
                echo(&format!(
                    "Killing job: {} [{}] ({})",
                    job.name, job.id, job.status
                ));
            }
            Err(err) => {
                tracing::warn!(job = %job.name, error = %err, "Failed to kill job");
                echo(&format!(
                    "Failed to terminate job {} [{}]: {}",
                    job.name, job.id, err
                ));
            }
        }
    }
    Ok(killed)
}

/// Kills the job it tracks when dropped, so a controller never leaves an orphaned job behind.
///
/// Dropping an empty guard does nothing. Killing a job that already finished is harmless.
#[derive(Default)]
pub struct ExitGuard {
    job: Option<JobHandleRef>,
}

impl ExitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `job`, replacing any previously tracked job.
    pub fn track(&mut self, job: JobHandleRef) {
        self.job = Some(job);
    }

    pub fn job(&self) -> Option<&JobHandleRef> {
        self.job.as_ref()
    }

    /// Kill the tracked job now and stop tracking it. Errors are logged, not returned.
    pub async fn kill(&mut self) {
        if let Some(job) = self.job.take() {
            if let Err(err) = job.kill().await {
                tracing::warn!(job = job.name(), error = %err, "Failed to kill tracked job");
            }
        }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            tracing::debug!(job = job.name(), "Killing tracked job on exit");
            job.start_kill();
        }
    }
}
