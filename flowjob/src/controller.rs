use crate::client::{ClusterClient, JobHandleRef, JobRecord};
use crate::config::{MonitorConfig, ServiceEnv};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::monitor::wait_for_job;
use crate::registry::list_jobs;
use crate::spec::{build_spec, LaunchRequest};
use crate::termination::{kill_jobs, ExitGuard};
use std::sync::Arc;

/// Runs one workflow step on the cluster.
///
/// A controller tracks at most one job, the one it launched. That job is killed when the
/// controller is dropped, whether the step succeeded, failed, or the future driving it was
/// cancelled.
pub struct JobController {
    client: Arc<dyn ClusterClient>,
    environment: Arc<dyn Environment>,
    service: ServiceEnv,
    config: MonitorConfig,
    guard: ExitGuard,
}

impl JobController {
    pub fn new(client: Arc<dyn ClusterClient>, environment: Arc<dyn Environment>) -> Self {
        Self {
            client,
            environment,
            service: ServiceEnv::default(),
            config: MonitorConfig::default(),
            guard: ExitGuard::new(),
        }
    }

    pub fn with_service_env(mut self, service: ServiceEnv) -> Self {
        self.service = service;
        self
    }

    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// The job this controller launched, if any.
    pub fn job(&self) -> Option<&JobHandleRef> {
        self.guard.job()
    }

    /// Build the job spec for `request` and submit it.
    ///
    /// Fails without submitting anything while a previously launched job is still tracked.
    pub async fn launch(&mut self, request: LaunchRequest) -> Result<()> {
        if let Some(job) = self.guard.job() {
            return Err(Error::AlreadyLaunched(job.name().to_string()));
        }
        let spec = build_spec(&request, self.environment.as_ref(), &self.service);
        let name = spec.name.clone();
        let namespace = spec.namespace.clone();
        let job = self.client.submit(spec).await.map_err(|err| match err {
            Error::Submission(_) => err,
            other => Error::Submission(other.to_string()),
        })?;
        tracing::info!(job = %name, %namespace, id = job.id(), "Submitted job");
        self.guard.track(job);
        Ok(())
    }

    /// Wait for the launched job to finish, passing its progress and logs to `echo(job_id, line)`.
    pub async fn wait<E>(&self, echo: E) -> Result<()>
    where
        E: FnMut(&str, &str),
    {
        let job = self.guard.job().cloned().ok_or(Error::NotLaunched)?;
        wait_for_job(job.as_ref(), &self.config, echo).await
    }

    pub async fn list_jobs<E>(
        &self,
        flow_name: &str,
        run_id: &str,
        user: Option<&str>,
        echo: E,
    ) -> Result<Vec<JobRecord>>
    where
        E: FnMut(&str),
    {
        list_jobs(self.client.as_ref(), flow_name, run_id, user, echo).await
    }

    pub async fn kill_jobs<E>(
        &self,
        flow_name: &str,
        run_id: &str,
        user: Option<&str>,
        echo: E,
    ) -> Result<usize>
    where
        E: FnMut(&str),
    {
        kill_jobs(self.client.as_ref(), flow_name, run_id, user, echo).await
    }

    /// Kill the launched job and wait for the kill to be accepted.
    pub async fn shutdown(&mut self) {
        self.guard.kill().await;
    }
}
