//! A single-host scheduler backed by child processes.

use crate::actors::{broadcaster::BroadcasterHandle, worker::WorkerHandle};
use crate::client::{ClusterClient, JobHandle, JobHandleRef, JobRecord};
use crate::error::{Error, Result};
use crate::events::JobState;
use crate::spec::JobSpec;
use crate::types::{JobId, JobName, LogStream, Namespace};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;

pub use crate::actors::coordinator::{LocalCluster, DEFAULT_RETAINED_FINISHED_JOBS};

/// A job running under a [`LocalCluster`].
///
/// Cheap to clone. The job's process is killed once the cluster and every handle to the job are gone.
#[derive(Clone, Debug)]
pub struct LocalJobHandle {
    pub(crate) id: JobId,
    pub(crate) name: JobName,
    pub(crate) namespace: Namespace,
    worker: WorkerHandle,
    broadcaster: BroadcasterHandle,
}

impl LocalJobHandle {
    pub(crate) fn new(
        id: JobId,
        name: JobName,
        namespace: Namespace,
        worker: WorkerHandle,
        broadcaster: BroadcasterHandle,
    ) -> Self {
        Self {
            id,
            name,
            namespace,
            worker,
            broadcaster,
        }
    }

    pub fn current_state(&self) -> JobState {
        self.worker.state()
    }
}

#[async_trait]
impl JobHandle for LocalJobHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn state(&self) -> Result<JobState> {
        Ok(self.current_state())
    }

    async fn logs(&self) -> Result<LogStream> {
        Ok(self.broadcaster.subscribe())
    }

    async fn kill(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.worker.stop(tx);
        match rx.await {
            Ok(Err(Error::AlreadyStopped(_))) | Err(_) => Ok(()),
            Ok(result) => result,
        }
    }

    fn start_kill(&self) {
        let (tx, _) = oneshot::channel();
        self.worker.stop(tx);
    }
}

#[async_trait]
impl ClusterClient for LocalCluster {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandleRef> {
        Ok(Arc::new(self.submit_job(spec).await?))
    }

    async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        self.unfinished().await
    }

    async fn attach(&self, name: &str, namespace: &str) -> Result<JobHandleRef> {
        Ok(Arc::new(self.attach_job(name, namespace).await?))
    }
}
