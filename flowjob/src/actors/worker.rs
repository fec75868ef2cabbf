mod actor;
mod messages;

use crate::error;
use crate::events::{JobState, JobStatus, Output};
use crate::types::JobName;
use actor::Actor;
use messages::WorkerMessage;
use std::time::Duration;
use tokio::{
    process,
    sync::{mpsc, oneshot, watch},
};

/// Handle to the actor that runs one job's process.
///
/// The process is killed once every handle is dropped.
#[derive(Clone, Debug)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    state: watch::Receiver<JobState>,
}

impl WorkerHandle {
    /// Start the job. Spawn failures are reported through the job state, not here.
    pub fn spawn(
        name: JobName,
        command: process::Command,
        timeout: Option<Duration>,
        output_tx: mpsc::UnboundedSender<Output>,
    ) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(JobState::new(JobStatus::Pending));
        Actor::spawn(name, inbox, state_tx, output_tx, command, timeout);
        Self { sender, state }
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn stop(&self, response: oneshot::Sender<error::Result<()>>) {
        let _ = self.sender.send(WorkerMessage::Stop { response });
    }
}
