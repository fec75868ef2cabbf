use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run workflow steps on a flowjob cluster
#[derive(Debug, Parser)]
#[clap(name = "flowjob")]
pub struct ArgParser {
    /// The address of the cluster
    #[clap(
        short = 's',
        long = "server",
        env = "FLOWJOB_CLUSTER_URL",
        default_value = "http://127.0.0.1:50051"
    )]
    pub server: String,

    /// PEM CA certificate to verify the cluster with. Enables TLS
    #[clap(long, parse(from_os_str))]
    pub tls_ca: Option<PathBuf>,

    /// Domain name the cluster's certificate is issued for. Only used with --tls-ca
    #[clap(long)]
    pub tls_domain: Option<String>,

    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    /// list the unfinished jobs of a flow run
    List(RunArgs),
    /// kill the unfinished jobs of a flow run
    Kill(RunArgs),
    /// launch one step on the cluster and wait for it to finish
    Launch(LaunchArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// name of the flow
    #[clap(long)]
    pub flow: String,

    /// id of the run
    #[clap(long)]
    pub run: String,

    /// only match this user's jobs
    #[clap(long)]
    pub user: Option<String>,
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// user the step runs as
    #[clap(long, env = "FLOWJOB_USER")]
    pub user: String,

    #[clap(long)]
    pub flow: String,

    #[clap(long)]
    pub run: String,

    #[clap(long)]
    pub step: String,

    #[clap(long)]
    pub task: String,

    #[clap(long, default_value = "0")]
    pub retry_count: u16,

    /// command that runs the step, repeat for several commands
    #[clap(long, required = true)]
    pub step_cli: Vec<String>,

    /// container image
    #[clap(long)]
    pub image: String,

    #[clap(long)]
    pub cpu: Option<f64>,

    #[clap(long)]
    pub gpu: Option<u32>,

    /// memory in megabytes
    #[clap(long)]
    pub memory: Option<u64>,

    #[clap(long)]
    pub namespace: Option<String>,

    /// run time limit in seconds, enforced by the cluster
    #[clap(long)]
    pub timeout: Option<u64>,

    /// extra environment variables, as VAR=VAL
    #[clap(long, parse(try_from_str = var_eq_val))]
    pub env: Vec<(String, String)>,

    #[clap(long, default_value = "")]
    pub code_url: String,

    #[clap(long, default_value = "")]
    pub code_sha: String,

    #[clap(long, default_value = "")]
    pub code_ds: String,

    /// python interpreter for package installs
    #[clap(long, default_value = "python")]
    pub python: String,

    /// packages to pip install before the step
    #[clap(long)]
    pub package: Vec<String>,

    /// seconds between progress messages while the job starts
    #[clap(long, default_value = "30")]
    pub heartbeat_secs: u64,

    /// seconds to wait for a final status once the logs end
    #[clap(long, default_value = "300")]
    pub completion_timeout_secs: u64,

    #[clap(flatten)]
    pub service: ServiceArgs,
}

/// Settings passed through to the step so it can reach the metadata service and datastore.
#[derive(Debug, Args)]
pub struct ServiceArgs {
    #[clap(long, env = "FLOWJOB_SERVICE_URL")]
    pub service_url: Option<String>,

    /// JSON object of headers for the metadata service
    #[clap(long, env = "FLOWJOB_SERVICE_HEADERS")]
    pub service_headers: Option<String>,

    #[clap(long, env = "FLOWJOB_DATASTORE_SYSROOT_LOCAL")]
    pub datastore_sysroot_local: Option<String>,

    #[clap(long, env = "FLOWJOB_DATASTORE_SYSROOT_S3")]
    pub datastore_sysroot_s3: Option<String>,

    #[clap(long, env = "FLOWJOB_DATATOOLS_S3ROOT")]
    pub datatools_s3root: Option<String>,

    #[clap(long, env = "FLOWJOB_DEFAULT_DATASTORE")]
    pub default_datastore: Option<String>,

    #[clap(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    #[clap(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[clap(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    #[clap(long, env = "AWS_DEFAULT_REGION")]
    pub aws_default_region: Option<String>,
}

/// try_from_str parse function for command env variables
fn var_eq_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, val)) if !var.is_empty() => Ok((var.to_string(), val.to_string())),
        _ => Err("Required format is VAR=VAL".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_split_on_first_equals() {
        assert_eq!(
            var_eq_val("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(var_eq_val("A="), Ok(("A".to_string(), String::new())));
        assert!(var_eq_val("A").is_err());
        assert!(var_eq_val("=b").is_err());
    }

    #[test]
    fn launch_args_parse() {
        let args = ArgParser::try_parse_from([
            "flowjob",
            "launch",
            "--user",
            "alice",
            "--flow",
            "HelloFlow",
            "--run",
            "7",
            "--step",
            "start",
            "--task",
            "1",
            "--step-cli",
            "python flow.py step start",
            "--image",
            "python:3.9",
            "--env",
            "A=1",
            "--env",
            "B=2",
            "--service-url",
            "http://metadata:8080",
        ])
        .unwrap();
        match args.sub_command {
            SubCommand::Launch(launch) => {
                assert_eq!(launch.retry_count, 0);
                assert_eq!(launch.step_cli, vec!["python flow.py step start"]);
                assert_eq!(launch.env.len(), 2);
                assert_eq!(
                    launch.service.service_url.as_deref(),
                    Some("http://metadata:8080")
                );
            }
            other => panic!("unexpected sub-command {:?}", other),
        }
    }

    #[test]
    fn kill_requires_flow_and_run() {
        assert!(ArgParser::try_parse_from(["flowjob", "kill", "--flow", "f"]).is_err());
        assert!(ArgParser::try_parse_from(["flowjob", "kill", "--flow", "f", "--run", "1"]).is_ok());
    }
}
