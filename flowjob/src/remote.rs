//! Client side of the `RemoteJobs` gRPC scheduler protocol.

use crate::client::{ClusterClient, JobHandle, JobHandleRef, JobRecord};
use crate::error::{Error, Result};
use crate::events::{JobState, JobStatus};
use crate::spec::{JobSpec, Resources};
use crate::types::{JobId, JobName, LogStream, Namespace, OutputBlob};
use async_trait::async_trait;
use protobuf::remote_jobs_client::RemoteJobsClient;
use protobuf::{
    EnvVar, JobPhase, JobRef, ListRequest, LogsRequest, StatusRequest, StopRequest, SubmitRequest,
};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

/// How long dropping a tracked job may block while its kill is delivered.
pub const DROP_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// A scheduler reached over gRPC.
#[derive(Clone)]
pub struct RemoteCluster {
    client: RemoteJobsClient<Channel>,
    endpoint: Endpoint,
}

impl RemoteCluster {
    /// Connect to `addr`, e.g. `http://127.0.0.1:50051`. Pass a TLS config for `https` endpoints.
    pub async fn connect(addr: &str, tls: Option<ClientTlsConfig>) -> Result<Self> {
        let mut endpoint = Channel::from_shared(addr.to_string())
            .map_err(|err| Error::Cluster(format!("invalid cluster address {}: {}", addr, err)))?;
        if let Some(tls) = tls {
            endpoint = endpoint.tls_config(tls)?;
        }
        let channel = endpoint.connect().await?;
        tracing::debug!(%addr, "Connected to cluster");
        Ok(Self {
            client: RemoteJobsClient::new(channel),
            endpoint,
        })
    }

    fn handle(&self, id: JobId, name: JobName, namespace: Namespace) -> RemoteJobHandle {
        RemoteJobHandle {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            id,
            name,
            namespace,
        }
    }
}

#[async_trait]
impl ClusterClient for RemoteCluster {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandleRef> {
        let name = spec.name.clone();
        let namespace = spec.namespace.clone();
        let response = self
            .client
            .clone()
            .submit_job(SubmitRequest {
                spec: Some(spec.into()),
            })
            .await
            .map_err(|status| Error::Submission(status.message().to_string()))?;
        let id = response.into_inner().job_id;
        Ok(Arc::new(self.handle(id, name, namespace)))
    }

    async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        let response = self.client.clone().list_unfinished(ListRequest {}).await?;
        Ok(response
            .into_inner()
            .jobs
            .into_iter()
            .map(JobRecord::from)
            .collect())
    }

    async fn attach(&self, name: &str, namespace: &str) -> Result<JobHandleRef> {
        // the status query doubles as an existence check and yields the id
        let response = self
            .client
            .clone()
            .query_status(StatusRequest {
                job: Some(job_ref(name, namespace)),
            })
            .await?;
        let id = response.into_inner().job_id;
        Ok(Arc::new(self.handle(
            id,
            name.to_string(),
            namespace.to_string(),
        )))
    }
}

fn job_ref(name: &str, namespace: &str) -> JobRef {
    JobRef {
        job_name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

pub struct RemoteJobHandle {
    client: RemoteJobsClient<Channel>,
    endpoint: Endpoint,
    id: JobId,
    name: JobName,
    namespace: Namespace,
}

impl RemoteJobHandle {
    fn job_ref(&self) -> JobRef {
        job_ref(&self.name, &self.namespace)
    }
}

#[async_trait]
impl JobHandle for RemoteJobHandle {
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
        let response = self
            .client
            .clone()
            .query_status(StatusRequest {
                job: Some(self.job_ref()),
            })
            .await?
            .into_inner();
        let status = JobStatus::from(response.phase());
        Ok(match response.reason {
            reason if reason.is_empty() => JobState::new(status),
            reason => JobState::with_reason(status, reason),
        })
    }

    async fn logs(&self) -> Result<LogStream> {
        let mut stream = self
            .client
            .clone()
            .stream_logs(LogsRequest {
                job: Some(self.job_ref()),
            })
            .await?
            .into_inner();
        let (tx, rx) = mpsc::unbounded_channel();
        let name = self.name.clone();
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(chunk)) => {
                        if tx.send(OutputBlob::from(chunk.data)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        tracing::warn!(job = %name, error = %status, "Log stream failed");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn kill(&self) -> Result<()> {
        self.client
            .clone()
            .stop_job(StopRequest {
                job: Some(self.job_ref()),
            })
            .await?;
        Ok(())
    }

    /// Blocks for up to [`DROP_KILL_TIMEOUT`] until the cluster has accepted the kill.
    ///
    /// The caller's runtime may already be shutting down, so the kill is sent from a separate
    /// thread over a fresh connection.
    fn start_kill(&self) {
        let endpoint = self.endpoint.clone();
        let job = self.job_ref();
        let (done_tx, done_rx) = std_mpsc::channel();
        let spawned = thread::Builder::new()
            .name("flowjob-kill".into())
            .spawn(move || {
                let _ = done_tx.send(stop_job_blocking(endpoint, job));
            });
        if let Err(err) = spawned {
            tracing::warn!(job = %self.name, error = %err, "Failed to start kill thread");
            return;
        }
        match done_rx.recv_timeout(DROP_KILL_TIMEOUT) {
            Ok(Ok(())) => tracing::debug!(job = %self.name, "Killed job"),
            Ok(Err(err)) => tracing::warn!(job = %self.name, error = %err, "Failed to kill job"),
            Err(_) => tracing::warn!(job = %self.name, "Timed out killing job"),
        }
    }
}

impl From<JobPhase> for JobStatus {
    fn from(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Pending => JobStatus::Pending,
            JobPhase::Running => JobStatus::Running,
            JobPhase::Succeeded => JobStatus::Done,
            JobPhase::Failed => JobStatus::Crashed,
            JobPhase::Killed => JobStatus::Killed,
        }
    }
}

impl From<JobStatus> for JobPhase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => JobPhase::Pending,
            JobStatus::Running => JobPhase::Running,
            JobStatus::Done => JobPhase::Succeeded,
            JobStatus::Crashed => JobPhase::Failed,
            JobStatus::Killed => JobPhase::Killed,
        }
    }
}

impl From<protobuf::JobRecord> for JobRecord {
    fn from(record: protobuf::JobRecord) -> Self {
        let status = JobStatus::from(record.phase());
        Self {
            id: record.id,
            name: record.job_name,
            namespace: record.namespace,
            labels: record.labels.into_iter().collect(),
            status,
        }
    }
}

impl From<JobRecord> for protobuf::JobRecord {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id,
            job_name: record.name,
            namespace: record.namespace,
            labels: record.labels.into_iter().collect(),
            phase: JobPhase::from(record.status) as i32,
        }
    }
}

impl From<JobSpec> for protobuf::JobSpec {
    fn from(spec: JobSpec) -> Self {
        Self {
            job_name: spec.name,
            namespace: spec.namespace,
            command: spec.command,
            image: spec.image,
            resources: Some(protobuf::Resources {
                cpu: spec.resources.cpu.unwrap_or_default(),
                gpu: spec.resources.gpu.unwrap_or_default(),
                memory_mb: spec.resources.memory_mb.unwrap_or_default(),
            }),
            timeout_ms: spec.timeout.map(timeout_millis).unwrap_or_default(),
            env: spec
                .env
                .into_iter()
                .map(|(name, value)| EnvVar { name, value })
                .collect(),
            labels: spec.labels.into_iter().collect(),
            parameters: spec.parameters.into_iter().collect(),
        }
    }
}

async fn stop_job(endpoint: Endpoint, job: JobRef) -> Result<()> {
    let mut client = RemoteJobsClient::new(endpoint.connect().await?);
    client.stop_job(StopRequest { job: Some(job) }).await?;
    Ok(())
}

fn stop_job_blocking(endpoint: Endpoint, job: JobRef) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        time::timeout(DROP_KILL_TIMEOUT, stop_job(endpoint, job))
            .await
            .map_err(|_| Error::Cluster("timed out stopping job".into()))?
    })
}

/// Zero on the wire means no limit, so any non-zero limit stays at least a millisecond.
fn timeout_millis(timeout: Duration) -> u64 {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if timeout.subsec_nanos() % 1_000_000 > 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then(|| value)
}

impl TryFrom<protobuf::JobSpec> for JobSpec {
    type Error = Error;

    fn try_from(spec: protobuf::JobSpec) -> Result<Self> {
        if spec.job_name.is_empty() {
            return Err(Error::Submission("job name is required".into()));
        }
        let resources = spec.resources.unwrap_or_default();
        Ok(Self {
            name: spec.job_name,
            namespace: non_zero(spec.namespace)
                .unwrap_or_else(|| crate::types::DEFAULT_NAMESPACE.to_string()),
            command: spec.command,
            image: spec.image,
            resources: Resources {
                cpu: non_zero(resources.cpu),
                gpu: non_zero(resources.gpu),
                memory_mb: non_zero(resources.memory_mb),
            },
            timeout: non_zero(spec.timeout_ms).map(Duration::from_millis),
            env: spec
                .env
                .into_iter()
                .map(|var| (var.name, var.value))
                .collect(),
            labels: spec.labels.into_iter().collect(),
            parameters: spec.parameters.into_iter().collect(),
        })
    }
}
