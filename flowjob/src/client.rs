use crate::error::Result;
use crate::events::{JobState, JobStatus};
use crate::spec::JobSpec;
use crate::types::{JobId, JobName, Labels, LogStream, Namespace};
use async_trait::async_trait;
use std::sync::Arc;

/// A live reference to a job on the scheduler.
#[async_trait]
pub trait JobHandle: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;

    /// The scheduler's current view of the job.
    async fn state(&self) -> Result<JobState>;

    /// Open the job's log output from the beginning.
    async fn logs(&self) -> Result<LogStream>;

    /// Kill the job. Killing a job that has already finished is not an error.
    async fn kill(&self) -> Result<()>;

    /// Request a kill from synchronous code. Safe to call from `Drop`, including while the
    /// caller's runtime shuts down. May block briefly until the request is delivered.
    fn start_kill(&self);
}

pub type JobHandleRef = Arc<dyn JobHandle>;

/// One row of the scheduler's job table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub name: JobName,
    pub namespace: Namespace,
    pub labels: Labels,
    pub status: JobStatus,
}

/// The scheduler, seen from the controller.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a job. `spec.name` must not already exist in its namespace.
    async fn submit(&self, spec: JobSpec) -> Result<JobHandleRef>;

    /// Every job that is still pending or running.
    async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>>;

    /// Get a handle to an existing job without submitting anything.
    async fn attach(&self, name: &str, namespace: &str) -> Result<JobHandleRef>;
}
