use crate::types::Envs;
use std::collections::BTreeMap;
use std::time::Duration;

/// Timing of the wait loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Longest gap between progress messages while a job is starting.
    pub heartbeat_interval: Duration,
    /// Status poll period while a job is starting.
    pub launch_poll: Duration,
    /// Longest single wait for the next log chunk.
    pub log_poll: Duration,
    /// Status poll period after the log stream is exhausted.
    pub completion_poll: Duration,
    /// How long to wait for a terminal phase after the logs end before giving up on the job.
    pub completion_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            launch_poll: Duration::from_millis(200),
            log_poll: Duration::from_millis(200),
            completion_poll: Duration::from_millis(500),
            completion_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl MonitorConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_polls(mut self, launch: Duration, log: Duration, completion: Duration) -> Self {
        self.launch_poll = launch;
        self.log_poll = log;
        self.completion_poll = completion;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

/// Connection settings handed to every job so the step can reach the metadata service and datastore.
#[derive(Debug, Clone, Default)]
pub struct ServiceEnv {
    pub service_url: Option<String>,
    pub service_headers: BTreeMap<String, String>,
    pub datastore_sysroot_local: Option<String>,
    pub datastore_sysroot_s3: Option<String>,
    pub datatools_s3root: Option<String>,
    pub default_datastore: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub aws_default_region: Option<String>,
    /// Opaque variables from the metadata provider, appended after everything else.
    pub runtime: Envs,
}

impl ServiceEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    /// Parse metadata-service headers from a JSON object of strings.
    pub fn with_service_headers_json(mut self, json: &str) -> serde_json::Result<Self> {
        self.service_headers = serde_json::from_str(json)?;
        Ok(self)
    }

    pub fn with_runtime_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime.push((name.into(), value.into()));
        self
    }

    /// Variables in injection order; unset values are left out.
    pub fn vars(&self) -> Envs {
        let mut vars = Envs::new();
        if let Some(url) = &self.service_url {
            vars.push(("FLOWJOB_SERVICE_URL".to_string(), url.clone()));
        }
        let headers =
            serde_json::to_string(&self.service_headers).unwrap_or_else(|_| "{}".to_string());
        vars.push(("FLOWJOB_SERVICE_HEADERS".to_string(), headers));

        let optional = [
            ("FLOWJOB_DATASTORE_SYSROOT_LOCAL", &self.datastore_sysroot_local),
            ("FLOWJOB_DATASTORE_SYSROOT_S3", &self.datastore_sysroot_s3),
            ("FLOWJOB_DATATOOLS_S3ROOT", &self.datatools_s3root),
            ("FLOWJOB_DEFAULT_DATASTORE", &self.default_datastore),
            ("AWS_ACCESS_KEY_ID", &self.aws_access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &self.aws_secret_access_key),
            ("AWS_SESSION_TOKEN", &self.aws_session_token),
            ("AWS_DEFAULT_REGION", &self.aws_default_region),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                vars.push((name.to_string(), value.clone()));
            }
        }
        vars
    }
}
