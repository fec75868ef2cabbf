use flowjob::{Error, JobHandle, JobSpec, LocalCluster, LocalJobHandle};
use futures::Stream;
use protobuf::remote_jobs_server::RemoteJobs;
use protobuf::{
    JobPhase, JobRef, ListRequest, ListResponse, LogsRequest, LogsResponse, StatusRequest,
    StatusResponse, StopRequest, StopResponse, SubmitRequest, SubmitResponse,
};
use std::pin::Pin;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};

/// Serves the `RemoteJobs` protocol on top of a [`LocalCluster`].
// tonic wraps this in Arc anyway internally, so we don't need Arc
pub struct RemoteJobsService {
    cluster: LocalCluster,
}

fn to_status(err: Error) -> Status {
    match err {
        Error::NotFound(_) => Status::not_found(err.to_string()),
        Error::Submission(_) => Status::failed_precondition(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

impl RemoteJobsService {
    pub fn new(cluster: LocalCluster) -> Self {
        Self { cluster }
    }

    async fn job(&self, job: Option<JobRef>) -> Result<LocalJobHandle, Status> {
        let job = job.ok_or_else(|| Status::invalid_argument("missing job reference"))?;
        self.cluster
            .attach_job(&job.job_name, &job.namespace)
            .await
            .map_err(to_status)
    }
}

#[tonic::async_trait]
impl RemoteJobs for RemoteJobsService {
    type StreamLogsStream = Pin<Box<dyn Stream<Item = Result<LogsResponse, Status>> + Send>>;

    async fn submit_job(
        &self,
        req: Request<SubmitRequest>,
    ) -> Result<Response<SubmitResponse>, Status> {
        let spec = req
            .into_inner()
            .spec
            .ok_or_else(|| Status::invalid_argument("missing job spec"))?;
        let spec = JobSpec::try_from(spec).map_err(|err| Status::invalid_argument(err.to_string()))?;
        let job = self.cluster.submit_job(spec).await.map_err(to_status)?;
        Ok(Response::new(SubmitResponse {
            job_id: job.id().to_string(),
        }))
    }

    async fn list_unfinished(
        &self,
        _req: Request<ListRequest>,
    ) -> Result<Response<ListResponse>, Status> {
        let jobs = self.cluster.unfinished().await.map_err(to_status)?;
        Ok(Response::new(ListResponse {
            jobs: jobs.into_iter().map(Into::into).collect(),
        }))
    }

    async fn query_status(
        &self,
        req: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let job = self.job(req.into_inner().job).await?;
        let state = job.current_state();
        Ok(Response::new(StatusResponse {
            job_id: job.id().to_string(),
            phase: JobPhase::from(state.status) as i32,
            reason: state.reason.unwrap_or_default(),
        }))
    }

    async fn stop_job(&self, req: Request<StopRequest>) -> Result<Response<StopResponse>, Status> {
        let job = self.job(req.into_inner().job).await?;
        job.kill().await.map_err(to_status)?;
        tracing::info!(job = job.name(), "Stopped job");
        Ok(Response::new(StopResponse {})) // empty response on success
    }

    async fn stream_logs(
        &self,
        req: Request<LogsRequest>,
    ) -> Result<Response<Self::StreamLogsStream>, Status> {
        let job = self.job(req.into_inner().job).await?;
        let receiver = job.logs().await.map_err(to_status)?;

        let output_stream = UnboundedReceiverStream::from(receiver);
        let response_stream = output_stream.map(|blob| {
            Ok(LogsResponse {
                data: blob.to_vec(),
            })
        });
        Ok(Response::new(
            Box::pin(response_stream) as Self::StreamLogsStream
        ))
    }
}
