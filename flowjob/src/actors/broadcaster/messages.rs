use crate::types::OutputBlob;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum Message {
    /// Replay everything received so far, then forward new output until the job's pipes close.
    Subscribe {
        subscriber: mpsc::UnboundedSender<OutputBlob>,
    },
}
