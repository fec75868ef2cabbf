use crate::client::JobRecord;
use crate::error;
use crate::local::LocalJobHandle;
use crate::spec::JobSpec;
use crate::types::{JobName, Namespace};
use tokio::sync::oneshot;

pub enum CoordinatorMessage {
    Submit {
        spec: JobSpec,
        response: oneshot::Sender<error::Result<LocalJobHandle>>,
    },
    ListUnfinished {
        response: oneshot::Sender<Vec<JobRecord>>,
    },
    Attach {
        name: JobName,
        namespace: Namespace,
        response: oneshot::Sender<error::Result<LocalJobHandle>>,
    },
}
