use crate::types::JobName;
use std::{io, result};

/// How the caller should treat a failed step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Submission, transport or bookkeeping failure outside the task itself.
    Infrastructure,
    /// The task crashed; a retry may succeed.
    Crashed,
    /// The task was killed.
    Killed,
    /// The task never reached a terminal phase and was killed by the controller.
    TaskFailed,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error creating cluster job: {0}")]
    Submission(String),
    #[error("{}", crash_message(.reason.as_deref()))]
    Crashed { reason: Option<String> },
    #[error("Task {name} failed: it did not finish and has been killed")]
    TaskFailed { name: JobName },
    #[error("Task was killed{}", .reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default())]
    Killed { reason: Option<String> },
    #[error("No such job exists: {0}")]
    NotFound(JobName),
    #[error("Job {0} already stopped")]
    AlreadyStopped(JobName),
    #[error("No job has been launched by this controller")]
    NotLaunched,
    #[error("Job {0} is already tracked by this controller")]
    AlreadyLaunched(JobName),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Cluster error: {0}")]
    Cluster(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn crash_message(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!(
            "Task crashed due to {}. This could be a transient error. Use a retry policy to retry.",
            reason
        ),
        None => "Task crashed. This could be a transient error. Use a retry policy to retry."
            .to_string(),
    }
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Crashed { .. } => FailureKind::Crashed,
            Error::Killed { .. } => FailureKind::Killed,
            Error::TaskFailed { .. } => FailureKind::TaskFailed,
            _ => FailureKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Crashed
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::NotFound => Error::NotFound(status.message().to_string()),
            _ => Error::Cluster(status.to_string()),
        }
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Cluster(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_with_reason_is_retryable() {
        let err = Error::Crashed {
            reason: Some("OOMKilled".into()),
        };
        assert!(err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("OOMKilled"));
        assert!(msg.contains("retry"));
    }

    #[test]
    fn crash_without_reason_is_retryable() {
        let err = Error::Crashed { reason: None };
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Task crashed."));
    }

    #[test]
    fn classifications() {
        assert_eq!(
            Error::TaskFailed { name: "x".into() }.kind(),
            FailureKind::TaskFailed
        );
        assert_eq!(Error::Killed { reason: None }.kind(), FailureKind::Killed);
        assert_eq!(
            Error::Submission("boom".into()).kind(),
            FailureKind::Infrastructure
        );
        assert!(!Error::Killed { reason: None }.is_retryable());
        assert!(!Error::NotLaunched.is_retryable());
        assert_eq!(
            Error::AlreadyLaunched("x".into()).kind(),
            FailureKind::Infrastructure
        );
        assert_eq!(
            Error::Config("bad".into()).kind(),
            FailureKind::Infrastructure
        );
    }

    #[test]
    fn killed_message_includes_reason() {
        let err = Error::Killed {
            reason: Some("stopped by operator".into()),
        };
        assert_eq!(err.to_string(), "Task was killed (stopped by operator)");
        assert_eq!(Error::Killed { reason: None }.to_string(), "Task was killed");
    }
}
