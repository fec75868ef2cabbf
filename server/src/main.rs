mod services;

use clap::Parser;
use flowjob::LocalCluster;
use protobuf::remote_jobs_server::RemoteJobsServer;
use services::jobservice::RemoteJobsService;
use std::{error, net::SocketAddr, path::PathBuf};
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing_subscriber::EnvFilter;

/// Run jobs submitted over gRPC as processes on this host
#[derive(Debug, Parser)]
#[clap(name = "clusterd")]
struct Args {
    /// Address to listen on
    #[clap(long, env = "FLOWJOB_CLUSTER_ADDR", default_value = "127.0.0.1:50051")]
    listen: SocketAddr,

    /// Directory jobs run in. Defaults to the system temp directory
    #[clap(long, env = "FLOWJOB_CLUSTER_WORKDIR", parse(from_os_str))]
    workdir: Option<PathBuf>,

    /// Capacity of the job coordinator's message queue
    #[clap(long, default_value = "64")]
    queue_capacity: usize,

    /// Finished jobs kept for status and log queries. Older ones are forgotten
    #[clap(long, env = "FLOWJOB_CLUSTER_RETAIN_FINISHED", default_value = "1024")]
    retain_finished: usize,

    /// PEM certificate to serve TLS with. Requires --tls-key
    #[clap(long, parse(from_os_str))]
    tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[clap(long, parse(from_os_str))]
    tls_key: Option<PathBuf>,

    /// PEM CA certificate that client certificates must be signed by
    #[clap(long, parse(from_os_str))]
    tls_client_ca: Option<PathBuf>,
}

async fn load_tls(args: &Args) -> Result<Option<ServerTlsConfig>, Box<dyn error::Error>> {
    let (cert, key) = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => return Err("--tls-cert and --tls-key must be given together".into()),
    };

    // load server identity
    let cert = tokio::fs::read(cert).await?;
    let key = tokio::fs::read(key).await?;
    let mut tls_config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    // load CA cert
    if let Some(ca_cert) = &args.tls_client_ca {
        let ca_cert = tokio::fs::read(ca_cert).await?;
        tls_config = tls_config.client_ca_root(Certificate::from_pem(ca_cert));
    }
    Ok(Some(tls_config))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let tls = load_tls(&args).await?;
    let workdir = args.workdir.unwrap_or_else(std::env::temp_dir);
    let cluster =
        LocalCluster::spawn_with_retention(args.queue_capacity, workdir, args.retain_finished);
    serve(args.listen, cluster, tls).await
}

async fn serve(
    addr: SocketAddr,
    cluster: LocalCluster,
    tls: Option<ServerTlsConfig>,
) -> Result<(), Box<dyn error::Error>> {
    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }

    let job_service = RemoteJobsService::new(cluster);
    tracing::info!(%addr, "Listening");

    builder
        .add_service(RemoteJobsServer::new(job_service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
