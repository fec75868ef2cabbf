mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{self, Attach, ListUnfinished, Submit},
};
use crate::client::JobRecord;
use crate::error::{self, Error};
use crate::local::LocalJobHandle;
use crate::spec::JobSpec;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// A scheduler that runs jobs as processes on this host.
///
/// This struct is actually an actor handle, the real work is done in the actor spawned by `LocalCluster::spawn`,
/// but from the user perspective all that matters is that this struct provides methods for managing jobs.
/// The actor-handle abstraction allows this struct to be cloned freely in a multi-thread async context,
/// without requiring an `Arc<Mutex>` or any other means of synchronization.
#[derive(Clone)]
pub struct LocalCluster {
    sender: mpsc::Sender<CoordinatorMessage>,
}

/// Finished jobs a cluster keeps for status and log queries unless told otherwise.
pub const DEFAULT_RETAINED_FINISHED_JOBS: usize = 1024;

fn exited<T>(_: T) -> Error {
    Error::Cluster("local cluster exited".into())
}

impl LocalCluster {
    /// Spawn a new cluster that runs jobs in the system temp directory.
    ///
    /// Specify the capacity for the coordinator's message queue. This limits the build-up of inbound messages.
    pub fn spawn(message_capacity: usize) -> Self {
        Self::spawn_in(message_capacity, std::env::temp_dir())
    }

    /// Spawn a new cluster that runs jobs in `workdir`.
    pub fn spawn_in(message_capacity: usize, workdir: PathBuf) -> Self {
        Self::spawn_with_retention(message_capacity, workdir, DEFAULT_RETAINED_FINISHED_JOBS)
    }

    /// Spawn a new cluster that keeps at most `retain_finished` finished jobs.
    ///
    /// Older finished jobs are forgotten as new jobs are submitted: status and log queries for
    /// them fail with `NotFound`, and their names still cannot be reused.
    pub fn spawn_with_retention(
        message_capacity: usize,
        workdir: PathBuf,
        retain_finished: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(message_capacity);
        JobCoordinator::spawn(receiver, workdir, retain_finished);
        Self { sender }
    }

    /// Start a job. Fails if the name was ever submitted in the namespace, finished or not.
    pub async fn submit_job(&self, spec: JobSpec) -> error::Result<LocalJobHandle> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Submit { spec, response: tx })
            .await
            .map_err(exited)?;
        rx.await.map_err(exited)?
    }

    /// Jobs that are pending or running, sorted by name.
    pub async fn unfinished(&self) -> error::Result<Vec<JobRecord>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ListUnfinished { response: tx })
            .await
            .map_err(exited)?;
        rx.await.map_err(exited)
    }

    pub async fn attach_job(&self, name: &str, namespace: &str) -> error::Result<LocalJobHandle> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Attach {
                name: name.to_string(),
                namespace: namespace.to_string(),
                response: tx,
            })
            .await
            .map_err(exited)?;
        rx.await.map_err(exited)?
    }
}
