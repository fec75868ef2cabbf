mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;

use clap::Parser;
use std::error;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = ArgParser::parse();
    let mut client = ClientCli::connect(&args).await?;

    let mut terminate = signal(SignalKind::terminate())?;

    let result = tokio::select! {
        result = run(&mut client, args.sub_command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, killing launched job");
            Err("interrupted".into())
        }
        _ = terminate.recv() => {
            tracing::warn!("Terminated, killing launched job");
            Err("terminated".into())
        }
    };
    // a launched job must not outlive the command
    client.shutdown().await;
    result
}

async fn run(client: &mut ClientCli, sub_command: SubCommand) -> Result<(), Box<dyn error::Error>> {
    match sub_command {
        SubCommand::List(run) => client.list_jobs(&run).await?,
        SubCommand::Kill(run) => client.kill_jobs(&run).await?,
        SubCommand::Launch(launch) => {
            if let Err(err) = client.launch(launch).await {
                tracing::error!(kind = ?err.kind(), retryable = err.is_retryable(), "Step failed");
                return Err(err.into());
            }
        }
    }
    Ok(())
}
