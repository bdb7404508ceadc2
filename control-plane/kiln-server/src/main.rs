use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use kube::Client;
use tracing::info;

use kiln_server::cluster::RunnerCluster;
use kiln_server::config::ServerConfig;
use kiln_server::service::activity::ActivityTracker;
use kiln_server::service::reaper::Reaper;
use kiln_server::service::RunnerService;
use kiln_server::{grpc, init_tracing};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = ServerConfig::init_from_env()?;
    info!(?cfg, "starting kiln control plane");

    let client = Client::try_default().await?;
    let cluster = Arc::new(RunnerCluster::new(client, cfg.clone()));
    let service = Arc::new(RunnerService::new(
        cluster,
        Arc::new(ActivityTracker::new()),
    ));

    let reaper = Reaper::new(
        service.clone(),
        service.activity().clone(),
        Duration::from_secs(cfg.reaper_interval_secs),
        Duration::from_secs(cfg.reaper_inactive_secs),
    );
    let reaper_handle = reaper.spawn();

    let grpc_addr: SocketAddr = ([0, 0, 0, 0], cfg.grpc_port).into();
    let grpc = tokio::spawn(grpc::run_grpc_server(grpc_addr, service));

    tokio::select! {
        res = grpc => res??,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    reaper_handle.stop().await;
    Ok(())
}
