use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub type JobName = String;
pub type JobId = String;
pub type Namespace = String;
pub type Argv = Vec<String>;
pub type Envs = Vec<(String, String)>;
pub type Labels = BTreeMap<String, String>;
pub type Parameters = BTreeMap<String, String>;
pub type OutputBlob = bytes::Bytes;

/// A job's log output. The stream is exhausted when the sender side closes.
pub type LogStream = mpsc::UnboundedReceiver<OutputBlob>;

pub const DEFAULT_NAMESPACE: &str = "default";
