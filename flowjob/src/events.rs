use crate::types::OutputBlob;
use std::fmt;

/// Scheduler-reported phase of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Accepted by the scheduler but not yet running.
    Pending,
    Running,
    /// Finished successfully.
    Done,
    Crashed,
    Killed,
}

impl JobStatus {
    /// The job can no longer change phase.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Crashed | JobStatus::Killed)
    }

    /// The job has left the starting phase.
    pub fn is_launched(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "succeeded"),
            JobStatus::Crashed => write!(f, "failed"),
            JobStatus::Killed => write!(f, "killed"),
        }
    }
}

/// A status together with the scheduler's explanation for it, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobState {
    pub status: JobStatus,
    pub reason: Option<String>,
}

impl JobState {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    pub fn with_reason(status: JobStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Output {
    Stdout(OutputBlob),
    Stderr(OutputBlob),
}

impl Output {
    pub fn blob(&self) -> &OutputBlob {
        match self {
            Output::Stdout(blob) | Output::Stderr(blob) => blob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_states() {
        assert!(!JobStatus::Pending.is_finished());
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Done.is_finished());
        assert!(JobStatus::Crashed.is_finished());
        assert!(JobStatus::Killed.is_finished());
    }

    #[test]
    fn only_pending_is_starting() {
        assert!(!JobStatus::Pending.is_launched());
        assert!(JobStatus::Running.is_launched());
        assert!(JobStatus::Crashed.is_launched());
    }
}
