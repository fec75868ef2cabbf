use crate::types::{JobName, Labels, Parameters};
use sha2::{Digest, Sha224};

/// Longest name `make_job_name` can produce: a SHA-224 hex digest, a separator and a `u16`.
pub const MAX_JOB_NAME_LEN: usize = 56 + 1 + 5;

pub const LABEL_FLOW_NAME: &str = "flow_name";
pub const LABEL_RUN_ID: &str = "run_id";
pub const LABEL_USER: &str = "user";
pub const LABEL_STEP_NAME: &str = "step_name";
pub const LABEL_TASK_ID: &str = "task_id";
pub const LABEL_RETRY_COUNT: &str = "retry_count";

/// One attempt of one step of one workflow run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobCoordinate {
    pub user: String,
    pub flow_name: String,
    pub run_id: String,
    pub step_name: String,
    pub task_id: String,
    pub retry_count: u16,
}

impl JobCoordinate {
    pub fn new(
        user: impl Into<String>,
        flow_name: impl Into<String>,
        run_id: impl Into<String>,
        step_name: impl Into<String>,
        task_id: impl Into<String>,
        retry_count: u16,
    ) -> Self {
        Self {
            user: user.into(),
            flow_name: flow_name.into(),
            run_id: run_id.into(),
            step_name: step_name.into(),
            task_id: task_id.into(),
            retry_count,
        }
    }

    pub fn job_name(&self) -> JobName {
        make_job_name(self)
    }

    /// Labels attached to the job so it can be found again without local state.
    pub fn labels(&self) -> Labels {
        Labels::from([
            (LABEL_FLOW_NAME.to_string(), self.flow_name.to_lowercase()),
            (LABEL_RUN_ID.to_string(), self.run_id.clone()),
            (LABEL_USER.to_string(), self.user.to_lowercase()),
            (LABEL_STEP_NAME.to_string(), self.step_name.to_lowercase()),
            (LABEL_TASK_ID.to_string(), self.task_id.clone()),
            (LABEL_RETRY_COUNT.to_string(), self.retry_count.to_string()),
        ])
    }

    /// The coordinate as scheduler parameters, values as given.
    pub fn attrs(&self) -> Parameters {
        Parameters::from([
            ("flowjob.user".to_string(), self.user.clone()),
            ("flowjob.flow_name".to_string(), self.flow_name.clone()),
            ("flowjob.run_id".to_string(), self.run_id.clone()),
            ("flowjob.step_name".to_string(), self.step_name.clone()),
            ("flowjob.task_id".to_string(), self.task_id.clone()),
            ("flowjob.retry_count".to_string(), self.retry_count.to_string()),
        ])
    }
}

fn name_str(coordinate: &JobCoordinate) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        coordinate.user.to_lowercase(),
        coordinate.flow_name.to_lowercase(),
        coordinate.run_id,
        coordinate.step_name.to_lowercase(),
        coordinate.task_id,
    )
}

/// Derive the scheduler-visible name of a job.
///
/// The name is the SHA-224 digest of the coordinate (user, flow and step case-folded) followed by
/// the retry count, so it has a fixed upper length no matter how long the coordinate fields are.
pub fn make_job_name(coordinate: &JobCoordinate) -> JobName {
    let digest = Sha224::digest(name_str(coordinate).as_bytes());
    format!("{:x}-{}", digest, coordinate.retry_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate(retry_count: u16) -> JobCoordinate {
        JobCoordinate::new("alice", "HelloFlow", "1234", "start", "5", retry_count)
    }

    #[test]
    fn retries_get_distinct_names() {
        assert_ne!(coordinate(0).job_name(), coordinate(1).job_name());
        assert!(coordinate(3).job_name().ends_with("-3"));
    }

    #[test]
    fn names_are_stable() {
        let c = coordinate(2);
        assert_eq!(make_job_name(&c), make_job_name(&c));
        assert_eq!(make_job_name(&c), make_job_name(&c.clone()));
    }

    #[test]
    fn names_are_case_folded() {
        let lower = JobCoordinate::new("alice", "helloflow", "1234", "start", "5", 0);
        let mixed = JobCoordinate::new("ALICE", "HelloFlow", "1234", "Start", "5", 0);
        assert_eq!(lower.job_name(), mixed.job_name());
    }

    #[test]
    fn run_and_task_ids_are_not_case_folded() {
        let a = JobCoordinate::new("alice", "flow", "Run-A", "start", "5", 0);
        let b = JobCoordinate::new("alice", "flow", "run-a", "start", "5", 0);
        assert_ne!(a.job_name(), b.job_name());
    }

    #[test]
    fn every_field_changes_the_name() {
        let base = coordinate(0);
        let variants = [
            JobCoordinate {
                user: "bob".into(),
                ..base.clone()
            },
            JobCoordinate {
                flow_name: "OtherFlow".into(),
                ..base.clone()
            },
            JobCoordinate {
                run_id: "1235".into(),
                ..base.clone()
            },
            JobCoordinate {
                step_name: "end".into(),
                ..base.clone()
            },
            JobCoordinate {
                task_id: "6".into(),
                ..base.clone()
            },
        ];
        for variant in variants {
            assert_ne!(variant.job_name(), base.job_name());
        }
    }

    #[test]
    fn long_inputs_stay_within_the_limit() {
        let long = "f".repeat(500);
        let c = JobCoordinate::new(&long, &long, &long, &long, &long, u16::MAX);
        let name = c.job_name();
        assert!(name.len() <= MAX_JOB_NAME_LEN);
        assert!(name.len() <= 63);
        assert_eq!(name.len(), 56 + 1 + 5);
    }

    #[test]
    fn names_are_dns_safe() {
        let name = JobCoordinate::new("Some User", "My_Flow", "r/1", "Step!", "t 1", 7).job_name();
        assert!(name
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '-'));
    }

    #[test]
    fn labels_lower_case_names_only() {
        let c = JobCoordinate::new("Alice", "HelloFlow", "Run1", "Start", "T5", 2);
        let labels = c.labels();
        assert_eq!(labels[LABEL_USER], "alice");
        assert_eq!(labels[LABEL_FLOW_NAME], "helloflow");
        assert_eq!(labels[LABEL_STEP_NAME], "start");
        assert_eq!(labels[LABEL_RUN_ID], "Run1");
        assert_eq!(labels[LABEL_TASK_ID], "T5");
        assert_eq!(labels[LABEL_RETRY_COUNT], "2");
        assert_eq!(labels.len(), 6);
    }
}
