//! CLI client for exercising the Digital Twin scheduler's gRPC surface.
//!
//! Submits job specs, flips node availability, and inspects plans and
//! observed-outcome records without needing a real actuator fleet.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tonic::Request;
use tracing::info;

pub mod proto {
    tonic::include_proto!("dt.scheduler.v1");
}

use proto::{
    scheduler_service_client::SchedulerServiceClient, GetObservedRequest, ObserveAvailabilityRequest,
    PlanRequest, RecordObservedRequest, RegisterClusterRequest, RegisterNodeRequest, SnapshotRequest,
};

#[derive(Parser)]
#[command(name = "dt-client")]
#[command(about = "Digital Twin scheduler test client", long_about = None)]
struct Cli {
    /// Scheduler gRPC address
    #[arg(short, long, default_value = "http://127.0.0.1:50051")]
    scheduler: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job spec (JSON) for placement planning
    Plan {
        /// Path to a job spec JSON file
        #[arg(long)]
        job_spec: String,

        /// Placement strategy: greedy | resilient | cvar
        #[arg(long, default_value = "greedy")]
        strategy: String,

        /// Compute the plan without persisting it
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Override the job spec's deadline, in milliseconds
        #[arg(long, default_value_t = 0)]
        deadline_ms_override: u64,
    },

    /// Flip a node's availability flag
    ObserveAvailability {
        node_name: String,
        #[arg(long, default_value_t = true)]
        available: bool,
    },

    /// List the names of all registered nodes
    Snapshot,

    /// Register a node's hardware profile and current utilization
    RegisterNode {
        name: String,
        #[arg(long, default_value = "8")]
        cpu_cores: u32,
        #[arg(long, default_value = "32")]
        memory_gb: u32,
        #[arg(long, default_value = "0")]
        gpu_vram_gb: u32,
        #[arg(long, default_value = "amd64")]
        arch: String,
        #[arg(long, default_value = "dc-core")]
        cluster_id: String,
    },

    /// Register an inter-cluster latency edge's home cluster
    RegisterCluster { cluster_id: String },

    /// Record an observed outcome for a previously-returned plan
    RecordObserved {
        plan_id: String,
        #[arg(long)]
        latency_ms: f64,
        #[arg(long)]
        cpu_util: f64,
        #[arg(long)]
        mem_peak_gb: f64,
        #[arg(long)]
        energy_kwh: f64,
        #[arg(long)]
        completed_at: i64,
    },

    /// Fetch a previously recorded observed outcome
    GetObserved { plan_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();

    info!("connecting to scheduler at {}", cli.scheduler);
    let mut client = SchedulerServiceClient::connect(cli.scheduler.clone()).await?;
    info!("connected");

    match cli.command {
        Commands::Plan { job_spec, strategy, dry_run, deadline_ms_override } => {
            plan(&mut client, job_spec, strategy, dry_run, deadline_ms_override).await?;
        }
        Commands::ObserveAvailability { node_name, available } => {
            let resp = client
                .observe_availability(Request::new(ObserveAvailabilityRequest { node_name, available }))
                .await?;
            println!("ok: {}", resp.into_inner().ok);
        }
        Commands::Snapshot => {
            let resp = client.snapshot(Request::new(SnapshotRequest {})).await?;
            for name in resp.into_inner().node_names {
                println!("{name}");
            }
        }
        Commands::RegisterNode { name, cpu_cores, memory_gb, gpu_vram_gb, arch, cluster_id } => {
            let resp = client
                .register_node(Request::new(RegisterNodeRequest {
                    name,
                    cpu_cores,
                    memory_gb,
                    gpu_vram_gb,
                    arch,
                    allocatable_cpu: cpu_cores,
                    allocatable_mem_gb: memory_gb,
                    cpu_util: 0.0,
                    mem_util: 0.0,
                    cluster_id,
                }))
                .await?;
            println!("ok: {}", resp.into_inner().ok);
        }
        Commands::RegisterCluster { cluster_id } => {
            let resp = client.register_cluster(Request::new(RegisterClusterRequest { cluster_id })).await?;
            println!("ok: {}", resp.into_inner().ok);
        }
        Commands::RecordObserved { plan_id, latency_ms, cpu_util, mem_peak_gb, energy_kwh, completed_at } => {
            let resp = client
                .record_observed(Request::new(RecordObservedRequest {
                    plan_id,
                    latency_ms,
                    cpu_util,
                    mem_peak_gb,
                    energy_kwh,
                    completed_at,
                }))
                .await?;
            println!("ok: {}", resp.into_inner().ok);
        }
        Commands::GetObserved { plan_id } => {
            let resp = client.get_observed(Request::new(GetObservedRequest { plan_id })).await?;
            let obs = resp.into_inner();
            if obs.found {
                println!(
                    "latency_ms={} cpu_util={} mem_peak_gb={} energy_kwh={} completed_at={}",
                    obs.latency_ms, obs.cpu_util, obs.mem_peak_gb, obs.energy_kwh, obs.completed_at
                );
            } else {
                println!("not found");
            }
        }
    }

    Ok(())
}

async fn plan(
    client: &mut SchedulerServiceClient<tonic::transport::Channel>,
    job_spec_path: String,
    strategy: String,
    dry_run: bool,
    deadline_ms_override: u64,
) -> Result<()> {
    let job_spec_json = std::fs::read_to_string(&job_spec_path)?;
    info!("submitting job spec from {}", job_spec_path);

    let request = Request::new(PlanRequest { job_spec_json, strategy, dry_run, deadline_ms_override });
    let response = client.plan(request).await?;
    let plan = response.into_inner();

    println!("\nPlan: {}", plan.plan_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Predicted latency:  {:.2}ms", plan.predicted_latency_ms);
    println!("Predicted energy:   {:.4}kWh", plan.predicted_energy_kwh);
    println!("Risk score:         {:.4}", plan.risk_score);
    println!("\nPlacements:");
    for (stage_id, decision) in &plan.placements {
        println!("  {stage_id} -> {} ({})", decision.node_name, decision.exec_format);
    }
    if !plan.shadow_plan.is_empty() {
        println!("\nShadow plan (backups):");
        for (stage_id, node_name) in &plan.shadow_plan {
            println!("  {stage_id} -> {node_name}");
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    Ok(())
}
