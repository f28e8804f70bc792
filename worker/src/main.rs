//! Digital Twin actuator agent.
//!
//! Runs on a worker node: reads local resource counters, registers the node
//! with the scheduler, and sends a periodic availability heartbeat. Job
//! execution itself is driven by `executor::JobExecutor` (Docker), invoked
//! out-of-band by whatever drives placements onto this node.

mod executor;

use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

mod proto {
    tonic::include_proto!("dt.scheduler.v1");
}

use proto::{scheduler_service_client::SchedulerServiceClient, ObserveAvailabilityRequest, RegisterNodeRequest};

#[derive(Debug, Clone)]
struct LocalResources {
    cpu_cores: u32,
    available_cpu: u32,
    total_memory_gb: f64,
    available_memory_gb: f64,
}

struct WorkerAgent {
    node_id: String,
    cluster_id: String,
    scheduler_url: String,
}

impl WorkerAgent {
    fn new(node_id: String, cluster_id: String, scheduler_url: String) -> Self {
        Self {
            node_id,
            cluster_id,
            scheduler_url,
        }
    }

    fn get_resources(&self) -> Result<LocalResources> {
        let (cpu_cores, available_cpu) = self.get_cpu_info()?;
        let (total_mem, available_mem) = self.get_memory_info()?;

        Ok(LocalResources {
            cpu_cores,
            available_cpu,
            total_memory_gb: total_mem,
            available_memory_gb: available_mem,
        })
    }

    fn get_cpu_info(&self) -> Result<(u32, u32)> {
        let cpuinfo = fs::read_to_string("/proc/cpuinfo")?;
        let cpu_count = cpuinfo.lines().filter(|line| line.starts_with("processor")).count() as u32;
        // Actual load sampling is out of scope; report full capacity as available.
        Ok((cpu_count, cpu_count))
    }

    fn get_memory_info(&self) -> Result<(f64, f64)> {
        let meminfo = fs::read_to_string("/proc/meminfo")?;

        let mut total_kb = 0u64;
        let mut available_kb = 0u64;

        for line in meminfo.lines() {
            if line.starts_with("MemTotal:") {
                total_kb = line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            } else if line.starts_with("MemAvailable:") {
                available_kb = line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            }
        }

        Ok((total_kb as f64 / 1024.0 / 1024.0, available_kb as f64 / 1024.0 / 1024.0))
    }

    async fn register(&self, client: &mut SchedulerServiceClient<tonic::transport::Channel>) -> Result<()> {
        let resources = self.get_resources()?;
        let request = RegisterNodeRequest {
            name: self.node_id.clone(),
            cpu_cores: resources.cpu_cores,
            memory_gb: resources.total_memory_gb as u32,
            gpu_vram_gb: 0,
            arch: std::env::consts::ARCH.to_string(),
            allocatable_cpu: resources.available_cpu,
            allocatable_mem_gb: resources.available_memory_gb as u32,
            cpu_util: 0.0,
            mem_util: 0.0,
            cluster_id: self.cluster_id.clone(),
        };
        client.register_node(request).await.context("registering node with scheduler")?;
        info!(node = %self.node_id, cluster = %self.cluster_id, "registered with scheduler");
        Ok(())
    }

    async fn send_heartbeat(&self, client: &mut SchedulerServiceClient<tonic::transport::Channel>) -> Result<()> {
        let resources = self.get_resources()?;
        info!(
            cpu = format!("{}/{}", resources.available_cpu, resources.cpu_cores),
            mem_gb = format!("{:.1}/{:.1}", resources.available_memory_gb, resources.total_memory_gb),
            "heartbeat"
        );
        client
            .observe_availability(ObserveAvailabilityRequest {
                node_name: self.node_id.clone(),
                available: true,
            })
            .await
            .context("sending availability heartbeat")?;
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        info!(node = %self.node_id, scheduler = %self.scheduler_url, "actuator starting");

        let mut client = SchedulerServiceClient::connect(self.scheduler_url.clone())
            .await
            .context("connecting to scheduler")?;

        self.register(&mut client).await?;

        loop {
            if let Err(e) = self.send_heartbeat(&mut client).await {
                warn!(error = %e, "heartbeat failed");
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let node_id = std::env::var("DT_NODE_ID").unwrap_or_else(|_| "worker-1".to_string());
    let cluster_id = std::env::var("DT_CLUSTER_ID").unwrap_or_else(|_| "dc-core".to_string());
    let scheduler_url = std::env::var("DT_SCHEDULER_URL").unwrap_or_else(|_| "http://127.0.0.1:50051".to_string());

    info!(%node_id, %cluster_id, %scheduler_url, "starting Digital Twin actuator");

    let worker = WorkerAgent::new(node_id, cluster_id, scheduler_url);
    worker.run().await?;

    Ok(())
}
