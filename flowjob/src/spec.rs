use crate::config::ServiceEnv;
use crate::environment::Environment;
use crate::identity::JobCoordinate;
use crate::types::{Argv, Envs, JobName, Labels, Namespace, Parameters, DEFAULT_NAMESPACE};
use std::time::Duration;

pub const SHELL: &str = "/bin/sh";
pub const STARTUP_MARKER: &str = "echo 'Task is starting.'";

/// Requested compute for a job. `None` leaves the scheduler default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub cpu: Option<f64>,
    pub gpu: Option<u32>,
    pub memory_mb: Option<u64>,
}

/// Where the step's code lives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodePackage {
    pub sha: String,
    pub url: String,
    pub datastore: String,
}

/// Everything the scheduler needs to run a job. Not modified after it is built.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSpec {
    pub name: JobName,
    pub namespace: Namespace,
    pub command: Argv,
    pub image: String,
    pub resources: Resources,
    /// Scheduler-side run time limit.
    pub timeout: Option<Duration>,
    /// Later entries override earlier ones with the same name.
    pub env: Envs,
    pub labels: Labels,
    pub parameters: Parameters,
}

impl JobSpec {
    pub fn new(name: impl Into<JobName>, command: Argv, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            command,
            image: image.into(),
            resources: Resources::default(),
            timeout: None,
            env: Envs::new(),
            labels: Labels::new(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<Namespace>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn with_envs(mut self, envs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(envs);
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Effective value of an environment variable.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A request from the workflow engine to run one step on the cluster.
#[derive(Clone, Debug)]
pub struct LaunchRequest {
    pub coordinate: JobCoordinate,
    pub step_name: String,
    /// Commands that run the step once the environment is ready.
    pub step_cli: Vec<String>,
    pub code_package: CodePackage,
    pub image: String,
    pub resources: Resources,
    pub namespace: Option<Namespace>,
    pub run_time_limit: Option<Duration>,
    pub env: Envs,
    /// Extra scheduler parameters, added after the coordinate's own.
    pub parameters: Parameters,
}

impl LaunchRequest {
    pub fn new(
        coordinate: JobCoordinate,
        step_cli: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            step_name: coordinate.step_name.clone(),
            coordinate,
            step_cli: vec![step_cli.into()],
            code_package: CodePackage::default(),
            image: image.into(),
            resources: Resources::default(),
            namespace: None,
            run_time_limit: None,
            env: Envs::new(),
            parameters: Parameters::new(),
        }
    }
}

/// Build the job's argv: environment setup, a startup marker, then the step.
///
/// The commands are chained with `&&` under `/bin/sh -c` so that a failing setup command stops the
/// chain and the job ends in a crash instead of running the step in a broken environment.
pub fn build_command(
    code_package_url: &str,
    environment: &dyn Environment,
    step_name: &str,
    step_cli: &[String],
) -> Argv {
    let mut cmds = environment.package_commands(code_package_url);
    cmds.extend(environment.bootstrap_commands(step_name));
    cmds.push(STARTUP_MARKER.to_string());
    cmds.extend(step_cli.iter().cloned());
    vec![SHELL.to_string(), "-c".to_string(), cmds.join(" && ")]
}

pub fn build_spec(
    request: &LaunchRequest,
    environment: &dyn Environment,
    service: &ServiceEnv,
) -> JobSpec {
    let coordinate = &request.coordinate;
    let command = build_command(
        &request.code_package.url,
        environment,
        &request.step_name,
        &request.step_cli,
    );
    let namespace = request
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let mut parameters = coordinate.attrs();
    parameters.extend(request.parameters.clone());

    JobSpec::new(coordinate.job_name(), command, request.image.clone())
        .with_namespace(namespace)
        .with_resources(request.resources.clone())
        .with_timeout(request.run_time_limit)
        .with_env("FLOWJOB_CODE_SHA", request.code_package.sha.clone())
        .with_env("FLOWJOB_CODE_URL", request.code_package.url.clone())
        .with_env("FLOWJOB_CODE_DS", request.code_package.datastore.clone())
        .with_env("FLOWJOB_USER", coordinate.user.clone())
        .with_envs(service.vars())
        .with_envs(request.env.clone())
        .with_envs(service.runtime.clone())
        .with_labels(coordinate.labels())
        .with_parameters(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::BasicEnvironment;
    use crate::identity::{LABEL_FLOW_NAME, LABEL_RETRY_COUNT, LABEL_USER};

    struct FixedEnvironment;

    impl Environment for FixedEnvironment {
        fn package_commands(&self, code_package_url: &str) -> Vec<String> {
            vec![format!("fetch {}", code_package_url)]
        }

        fn bootstrap_commands(&self, step_name: &str) -> Vec<String> {
            vec![format!("bootstrap {}", step_name)]
        }

        fn executable(&self) -> String {
            "python3".into()
        }
    }

    fn request() -> LaunchRequest {
        let coordinate = JobCoordinate::new("Alice", "HelloFlow", "42", "start", "7", 1);
        let mut request = LaunchRequest::new(coordinate, "python3 flow.py step start", "alpine:3");
        request.code_package.url = "s3://bucket/pkg".into();
        request.code_package.sha = "abc123".into();
        request
    }

    #[test]
    fn command_chains_with_and() {
        let argv = build_command(
            "s3://bucket/pkg",
            &FixedEnvironment,
            "start",
            &["run step".to_string()],
        );
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0], "/bin/sh");
        assert_eq!(argv[1], "-c");
        assert_eq!(
            argv[2],
            "fetch s3://bucket/pkg && bootstrap start && echo 'Task is starting.' && run step"
        );
    }

    #[test]
    fn command_keeps_every_step_command() {
        let step_cli = vec!["one".to_string(), "two".to_string()];
        let argv = build_command("", &FixedEnvironment, "end", &step_cli);
        assert!(argv[2].ends_with("echo 'Task is starting.' && one && two"));
    }

    #[test]
    fn spec_carries_identity_and_labels() {
        let req = request();
        let spec = build_spec(&req, &FixedEnvironment, &ServiceEnv::new());
        assert_eq!(spec.name, req.coordinate.job_name());
        assert_eq!(spec.namespace, DEFAULT_NAMESPACE);
        assert_eq!(spec.image, "alpine:3");
        assert_eq!(spec.labels[LABEL_USER], "alice");
        assert_eq!(spec.labels[LABEL_FLOW_NAME], "helloflow");
        assert_eq!(spec.labels[LABEL_RETRY_COUNT], "1");
        assert_eq!(spec.parameters["flowjob.flow_name"], "HelloFlow");
    }

    #[test]
    fn spec_env_order_lets_callers_override() {
        let mut req = request();
        req.env.push(("FLOWJOB_USER".into(), "override".into()));
        let service = ServiceEnv::new()
            .with_service_url("http://md")
            .with_runtime_var("FLOWJOB_RUNTIME", "kube");
        let spec = build_spec(&req, &BasicEnvironment::new(), &service);
        assert_eq!(spec.env_var("FLOWJOB_CODE_SHA"), Some("abc123"));
        assert_eq!(spec.env_var("FLOWJOB_CODE_URL"), Some("s3://bucket/pkg"));
        assert_eq!(spec.env_var("FLOWJOB_SERVICE_URL"), Some("http://md"));
        assert_eq!(spec.env_var("FLOWJOB_USER"), Some("override"));
        assert_eq!(spec.env.last().unwrap().0, "FLOWJOB_RUNTIME");
    }

    #[test]
    fn spec_uses_requested_namespace_and_limits() {
        let mut req = request();
        req.namespace = Some("ml".into());
        req.run_time_limit = Some(Duration::from_secs(600));
        req.resources = Resources {
            cpu: Some(2.0),
            gpu: Some(1),
            memory_mb: Some(4096),
        };
        req.parameters.insert("queue".into(), "fast".into());
        let spec = build_spec(&req, &FixedEnvironment, &ServiceEnv::new());
        assert_eq!(spec.namespace, "ml");
        assert_eq!(spec.timeout, Some(Duration::from_secs(600)));
        assert_eq!(spec.resources.memory_mb, Some(4096));
        assert_eq!(spec.parameters["queue"], "fast");
    }
}
