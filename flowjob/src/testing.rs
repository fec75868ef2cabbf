//! In-memory stand-ins for the scheduler used by unit tests.

use crate::client::{ClusterClient, JobHandle, JobHandleRef, JobRecord};
use crate::error::{Error, Result};
use crate::events::{JobState, JobStatus};
use crate::identity::{LABEL_FLOW_NAME, LABEL_RUN_ID, LABEL_USER};
use crate::spec::JobSpec;
use crate::types::{Labels, LogStream, OutputBlob, DEFAULT_NAMESPACE};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A handle that replays a scripted sequence of states, repeating the last one.
pub struct MockHandle {
    name: String,
    states: Mutex<VecDeque<JobState>>,
    chunks: Vec<&'static str>,
    fail_kill: bool,
    kills: AtomicUsize,
    start_kills: AtomicUsize,
}

impl MockHandle {
    pub fn new(name: &str, states: Vec<JobState>) -> Self {
        Self {
            name: name.to_string(),
            states: Mutex::new(states.into()),
            chunks: Vec::new(),
            fail_kill: false,
            kills: AtomicUsize::new(0),
            start_kills: AtomicUsize::new(0),
        }
    }

    pub fn with_statuses(name: &str, statuses: &[JobStatus]) -> Self {
        Self::new(name, statuses.iter().copied().map(JobState::new).collect())
    }

    pub fn with_chunks(mut self, chunks: Vec<&'static str>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn failing_kill(mut self) -> Self {
        self.fail_kill = true;
        self
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn start_kills(&self) -> usize {
        self.start_kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandle for MockHandle {
    fn id(&self) -> &str {
        "mock-id"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        DEFAULT_NAMESPACE
    }

    async fn state(&self) -> Result<JobState> {
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        state.ok_or_else(|| Error::Cluster("no scripted state".into()))
    }

    async fn logs(&self) -> Result<LogStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in &self.chunks {
            let _ = tx.send(OutputBlob::from(*chunk));
        }
        Ok(rx)
    }

    async fn kill(&self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.fail_kill {
            Err(Error::Cluster(format!("refused to kill {}", self.name)))
        } else {
            Ok(())
        }
    }

    fn start_kill(&self) {
        self.start_kills.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn record(name: &str, user: &str, flow_name: &str, run_id: &str) -> JobRecord {
    JobRecord {
        id: format!("id-{}", name),
        name: name.to_string(),
        namespace: DEFAULT_NAMESPACE.to_string(),
        labels: Labels::from([
            (LABEL_USER.to_string(), user.to_string()),
            (LABEL_FLOW_NAME.to_string(), flow_name.to_string()),
            (LABEL_RUN_ID.to_string(), run_id.to_string()),
        ]),
        status: JobStatus::Running,
    }
}

/// A scheduler with a fixed job table.
#[derive(Default)]
pub struct MockCluster {
    records: Vec<JobRecord>,
    refuse_kill: HashSet<String>,
    pub next_handle: Mutex<Option<Arc<MockHandle>>>,
    attached: Mutex<HashMap<String, Arc<MockHandle>>>,
    pub attach_order: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<JobSpec>>,
}

impl MockCluster {
    pub fn with_records(records: Vec<JobRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn refusing_kill(mut self, name: &str) -> Self {
        self.refuse_kill.insert(name.to_string());
        self
    }

    pub fn with_next_handle(self, handle: Arc<MockHandle>) -> Self {
        *self.next_handle.lock().unwrap() = Some(handle);
        self
    }

    pub fn attached(&self, name: &str) -> Option<Arc<MockHandle>> {
        self.attached.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandleRef> {
        self.submitted.lock().unwrap().push(spec);
        match self.next_handle.lock().unwrap().take() {
            Some(handle) => Ok(handle),
            None => Err(Error::Submission("scheduler returned no job".into())),
        }
    }

    async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.records.clone())
    }

    async fn attach(&self, name: &str, _namespace: &str) -> Result<JobHandleRef> {
        self.attach_order.lock().unwrap().push(name.to_string());
        let mut handle = MockHandle::with_statuses(name, &[JobStatus::Running]);
        if self.refuse_kill.contains(name) {
            handle = handle.failing_kill();
        }
        let handle = Arc::new(handle);
        self.attached
            .lock()
            .unwrap()
            .insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}
