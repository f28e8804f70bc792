//! Digital Twin scheduler binary.
//!
//! Seeds a demo topology, optionally loads an inter-cluster latency matrix,
//! and serves the gRPC adaptor.

use std::sync::Arc;
use std::time::Duration;

use dt_cluster_manager::ClusterManager;
use dt_scheduler::config::Config;
use dt_scheduler::{seed, DigitalTwin};
use dt_state::StateStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env();
    tracing::info!("starting Digital Twin scheduler");

    let state = Arc::new(StateStore::new());
    seed::seed_demo_topology(&state);

    let cluster_manager = match ClusterManager::from_path(&config.latency_matrix_path) {
        Ok(cm) => Some(Arc::new(cm)),
        Err(e) => {
            tracing::warn!(error = %e, path = %config.latency_matrix_path, "failed to load latency matrix, degrading to single-cluster mode");
            None
        }
    };

    let twin = Arc::new(DigitalTwin::new(state, cluster_manager));

    if config.auto_watchers {
        tokio::spawn(run_heartbeat());
    }

    dt_scheduler::grpc::start_grpc_server(twin, config.grpc_addr).await?;

    Ok(())
}

/// Stand-in for the background resource-report watchers a real actuator
/// fleet drives; just confirms the service loop is alive.
async fn run_heartbeat() {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        tracing::debug!("watcher heartbeat");
    }
}
