mod actor;
mod messages;
use crate::{events::Output, types::LogStream};
use actor::Actor;
use messages::Message;

use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Fans a job's output out to any number of log readers.
///
/// This struct is actually an actor handle. The real work is done in the actor spawned by `BroadcasterHandle::spawn`.
/// The actor exits once every handle is dropped.
#[derive(Clone, Debug)]
pub struct BroadcasterHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl BroadcasterHandle {
    pub fn spawn(output_rx: UnboundedReceiver<Output>) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox, output_rx);
        Self { sender }
    }

    /// Open the job's combined stdout and stderr from the beginning.
    pub fn subscribe(&self) -> LogStream {
        let (subscriber, logs) = mpsc::unbounded_channel();
        let _ = self.sender.send(Message::Subscribe { subscriber });
        logs
    }
}
