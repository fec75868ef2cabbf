use crate::arg_parser::{ArgParser, LaunchArgs, RunArgs, ServiceArgs};
use flowjob::error::Result;
use flowjob::{
    BasicEnvironment, CodePackage, Error, JobController, JobCoordinate, LaunchRequest,
    MonitorConfig, RemoteCluster, Resources, ServiceEnv,
};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Certificate, ClientTlsConfig};

pub struct ClientCli {
    cluster: Arc<RemoteCluster>,
    controller: Option<JobController>,
}

fn print_line(line: &str) {
    println!("{}", line);
}

impl ClientCli {
    pub async fn connect(args: &ArgParser) -> Result<Self> {
        let tls = match &args.tls_ca {
            Some(ca_path) => {
                let ca_cert = tokio::fs::read(ca_path).await?;
                let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca_cert));
                if let Some(domain) = &args.tls_domain {
                    tls = tls.domain_name(domain.clone());
                }
                Some(tls)
            }
            None => None,
        };
        let cluster = RemoteCluster::connect(&args.server, tls).await?;
        Ok(Self {
            cluster: Arc::new(cluster),
            controller: None,
        })
    }

    fn new_controller(&self, args: Option<&LaunchArgs>) -> Result<JobController> {
        let mut environment = BasicEnvironment::new();
        let mut service = ServiceEnv::new();
        let mut config = MonitorConfig::default();
        if let Some(args) = args {
            environment = environment.with_python(args.python.clone());
            for package in &args.package {
                environment = environment.with_package(package.clone());
            }
            service = service_env(&args.service)?;
            config = config
                .with_heartbeat_interval(Duration::from_secs(args.heartbeat_secs))
                .with_completion_timeout(Duration::from_secs(args.completion_timeout_secs));
        }
        Ok(
            JobController::new(self.cluster.clone(), Arc::new(environment))
                .with_service_env(service)
                .with_monitor_config(config),
        )
    }

    pub async fn list_jobs(&self, args: &RunArgs) -> Result<()> {
        self.new_controller(None)?
            .list_jobs(&args.flow, &args.run, args.user.as_deref(), print_line)
            .await?;
        Ok(())
    }

    pub async fn kill_jobs(&self, args: &RunArgs) -> Result<()> {
        self.new_controller(None)?
            .kill_jobs(&args.flow, &args.run, args.user.as_deref(), print_line)
            .await?;
        Ok(())
    }

    /// Launch the step and stream its progress until it finishes.
    pub async fn launch(&mut self, args: LaunchArgs) -> Result<()> {
        let controller = self.new_controller(Some(&args))?;
        let controller = self.controller.insert(controller);
        controller.launch(launch_request(args)).await?;
        controller
            .wait(|job_id: &str, line: &str| println!("[{}] {}", job_id, line))
            .await
    }

    /// Kill whatever this session launched.
    pub async fn shutdown(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.shutdown().await;
        }
    }
}

fn service_env(args: &ServiceArgs) -> Result<ServiceEnv> {
    let mut service = ServiceEnv::new();
    if let Some(headers) = &args.service_headers {
        service = service.with_service_headers_json(headers).map_err(|err| {
            Error::Config(format!("invalid service headers: {}", err))
        })?;
    }
    service.service_url = args.service_url.clone();
    service.datastore_sysroot_local = args.datastore_sysroot_local.clone();
    service.datastore_sysroot_s3 = args.datastore_sysroot_s3.clone();
    service.datatools_s3root = args.datatools_s3root.clone();
    service.default_datastore = args.default_datastore.clone();
    service.aws_access_key_id = args.aws_access_key_id.clone();
    service.aws_secret_access_key = args.aws_secret_access_key.clone();
    service.aws_session_token = args.aws_session_token.clone();
    service.aws_default_region = args.aws_default_region.clone();
    Ok(service)
}

fn launch_request(args: LaunchArgs) -> LaunchRequest {
    let coordinate = JobCoordinate::new(
        args.user,
        args.flow,
        args.run,
        args.step,
        args.task,
        args.retry_count,
    );
    let mut request = LaunchRequest::new(coordinate, String::new(), args.image);
    request.step_cli = args.step_cli;
    request.code_package = CodePackage {
        sha: args.code_sha,
        url: args.code_url,
        datastore: args.code_ds,
    };
    request.resources = Resources {
        cpu: args.cpu,
        gpu: args.gpu,
        memory_mb: args.memory,
    };
    request.namespace = args.namespace;
    request.run_time_limit = args.timeout.map(Duration::from_secs);
    request.env = args.env;
    request
}
