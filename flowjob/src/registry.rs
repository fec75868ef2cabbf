use crate::client::{ClusterClient, JobRecord};
use crate::error::Result;
use crate::identity::{LABEL_FLOW_NAME, LABEL_RUN_ID, LABEL_USER};
use crate::types::Labels;

/// Label values a job must carry to belong to a flow run, optionally for one user.
pub fn required_labels(flow_name: &str, run_id: &str, user: Option<&str>) -> Labels {
    let mut required = Labels::from([
        (LABEL_FLOW_NAME.to_string(), flow_name.to_lowercase()),
        (LABEL_RUN_ID.to_string(), run_id.to_string()),
    ]);
    if let Some(user) = user {
        required.insert(LABEL_USER.to_string(), user.to_lowercase());
    }
    required
}

/// True when every required key is present with exactly the required value.
pub fn labels_match(labels: &Labels, required: &Labels) -> bool {
    required
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Scan the scheduler's unfinished jobs for the ones belonging to a flow run.
///
/// Leaving out `user` matches every user's jobs for that run.
pub async fn find_jobs(
    client: &dyn ClusterClient,
    flow_name: &str,
    run_id: &str,
    user: Option<&str>,
) -> Result<Vec<JobRecord>> {
    let required = required_labels(flow_name, run_id, user);
    let jobs: Vec<JobRecord> = client
        .unfinished_jobs()
        .await?
        .into_iter()
        .filter(|job| labels_match(&job.labels, &required))
        .collect();
    tracing::debug!(flow_name, run_id, ?user, found = jobs.len(), "Searched jobs");
    Ok(jobs)
}

/// Print the unfinished jobs of a flow run.
pub async fn list_jobs<E>(
    client: &dyn ClusterClient,
    flow_name: &str,
    run_id: &str,
    user: Option<&str>,
    mut echo: E,
) -> Result<Vec<JobRecord>>
where
    E: FnMut(&str),
{
    let jobs = find_jobs(client, flow_name, run_id, user).await?;
    if jobs.is_empty() {
        echo("No running jobs found.");
    }
    for job in &jobs {
        echo(&format!("{} [{}] ({})", job.name, job.id, job.status));
    }
    Ok(jobs)
}
