use super::messages::CoordinatorMessage;
use crate::actors::{broadcaster::BroadcasterHandle, worker::WorkerHandle};
use crate::client::JobRecord;
use crate::error::{self, Error};
use crate::local::LocalJobHandle;
use crate::spec::JobSpec;
use crate::types::{JobName, Labels, Namespace};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::{
    process::Command,
    sync::{mpsc, oneshot},
};

type JobKey = (Namespace, JobName);

struct LocalJob {
    handle: LocalJobHandle,
    labels: Labels,
    seq: u64,
}

pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    workdir: PathBuf,
    retain_finished: usize,
    next_seq: u64,
    jobs: HashMap<JobKey, LocalJob>,
    // every name ever submitted, evicted or not
    names: HashSet<JobKey>,
}

impl JobCoordinator {
    pub fn spawn(
        inbox: mpsc::Receiver<CoordinatorMessage>,
        workdir: PathBuf,
        retain_finished: usize,
    ) {
        let actor = Self {
            inbox,
            workdir,
            retain_finished,
            next_seq: 0,
            jobs: HashMap::new(),
            names: HashSet::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Submit { spec, response } => {
                    let _ = response.send(self.submit(spec));
                }
                ListUnfinished { response } => {
                    let _ = response.send(self.unfinished());
                }
                Attach {
                    name,
                    namespace,
                    response,
                } => {
                    self.attach(name, namespace, response);
                }
            }
        }
    }

    fn submit(&mut self, spec: JobSpec) -> error::Result<LocalJobHandle> {
        let key = (spec.namespace.clone(), spec.name.clone());
        if self.names.contains(&key) {
            return Err(Error::Submission(format!(
                "job {} already exists in namespace {}",
                spec.name, spec.namespace
            )));
        }
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| Error::Submission(format!("job {} has an empty command", spec.name)))?;

        // containers are not emulated, the command runs directly on this host
        tracing::debug!(
            job = %spec.name,
            image = %spec.image,
            resources = ?spec.resources,
            "Ignoring image and resources for local job"
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let (output_tx, output_rx) = mpsc::unbounded_channel(); // channel for piping child process output
        let broadcaster = BroadcasterHandle::spawn(output_rx);
        let worker = WorkerHandle::spawn(spec.name.clone(), command, spec.timeout, output_tx);
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(job = %spec.name, namespace = %spec.namespace, %id, "Started local job");

        let handle = LocalJobHandle::new(id, spec.name, spec.namespace, worker, broadcaster);
        self.evict_finished();
        self.names.insert(key.clone());
        self.jobs.insert(
            key,
            LocalJob {
                handle: handle.clone(),
                labels: spec.labels,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        Ok(handle)
    }

    /// Forget the oldest finished jobs beyond `retain_finished`, dropping their output buffers.
    fn evict_finished(&mut self) {
        let mut finished: Vec<_> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.handle.current_state().status.is_finished())
            .map(|(key, job)| (job.seq, key.clone()))
            .collect();
        if finished.len() <= self.retain_finished {
            return;
        }
        finished.sort_unstable_by_key(|(seq, _)| *seq);
        let excess = finished.len() - self.retain_finished;
        for (_, key) in finished.into_iter().take(excess) {
            tracing::debug!(job = %key.1, namespace = %key.0, "Evicting finished job");
            self.jobs.remove(&key);
        }
    }

    fn unfinished(&self) -> Vec<JobRecord> {
        let mut records: Vec<_> = self
            .jobs
            .values()
            .filter_map(|job| {
                let status = job.handle.current_state().status;
                (!status.is_finished()).then(|| JobRecord {
                    id: job.handle.id.clone(),
                    name: job.handle.name.clone(),
                    namespace: job.handle.namespace.clone(),
                    labels: job.labels.clone(),
                    status,
                })
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    fn attach(
        &self,
        name: JobName,
        namespace: Namespace,
        response: oneshot::Sender<error::Result<LocalJobHandle>>,
    ) {
        let result = self
            .jobs
            .get(&(namespace, name.clone()))
            .map(|job| job.handle.clone())
            .ok_or(Error::NotFound(name));
        let _ = response.send(result);
    }
}
