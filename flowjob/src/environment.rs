/// Supplies the shell steps that prepare a job's runtime before the step itself runs.
pub trait Environment: Send + Sync {
    /// Commands that install dependencies and fetch the code package.
    fn package_commands(&self, code_package_url: &str) -> Vec<String>;

    /// Environment specific bootstrap for a step.
    fn bootstrap_commands(&self, _step_name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Interpreter used to run steps.
    fn executable(&self) -> String;
}

/// A plain shell environment: optional pip installs, a working directory and a tarball download.
#[derive(Clone, Debug)]
pub struct BasicEnvironment {
    python: String,
    packages: Vec<String>,
    workdir: String,
}

impl Default for BasicEnvironment {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            packages: Vec::new(),
            workdir: "flowjob".to_string(),
        }
    }
}

impl BasicEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.packages.push(package.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }
}

impl Environment for BasicEnvironment {
    fn package_commands(&self, code_package_url: &str) -> Vec<String> {
        let mut cmds = vec!["echo 'Setting up task environment.'".to_string()];
        if !self.packages.is_empty() {
            cmds.push(format!(
                "{} -m pip install {} --user -qqq",
                self.python,
                self.packages.join(" ")
            ));
        }
        cmds.push(format!("mkdir -p {}", self.workdir));
        cmds.push(format!("cd {}", self.workdir));
        if !code_package_url.is_empty() {
            cmds.push(format!("curl -fsSL {} -o job.tar", code_package_url));
            cmds.push("tar xf job.tar".to_string());
        }
        cmds
    }

    fn executable(&self) -> String {
        self.python.clone()
    }
}
