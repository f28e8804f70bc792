//! gRPC adaptor over `DigitalTwin`. No planning logic of its own: parses the
//! wire request, delegates, encodes the response.

use std::sync::Arc;

use tonic::{transport::Server, Request, Response, Status};
use tracing::info;

use crate::DigitalTwin;

pub mod proto {
    tonic::include_proto!("dt.scheduler.v1");
}

use proto::{
    scheduler_service_server::{SchedulerService, SchedulerServiceServer},
    *,
};

pub struct SchedulerGrpc {
    twin: Arc<DigitalTwin>,
}

impl SchedulerGrpc {
    pub fn new(twin: Arc<DigitalTwin>) -> Self {
        Self { twin }
    }
}

#[tonic::async_trait]
impl SchedulerService for SchedulerGrpc {
    async fn plan(&self, request: Request<PlanRequest>) -> Result<Response<PlanResponse>, Status> {
        let req = request.into_inner();
        let job_spec: serde_json::Value =
            serde_json::from_str(&req.job_spec_json).map_err(|e| Status::invalid_argument(format!("invalid job_spec_json: {e}")))?;
        let job = dt_jobs::parse_job_spec(&job_spec).map_err(to_status)?;

        let strategy = if req.strategy.is_empty() { "greedy" } else { req.strategy.as_str() };
        let deadline = (req.deadline_ms_override > 0).then(|| std::time::Duration::from_millis(req.deadline_ms_override));

        let plan = self.twin.plan(&job, strategy, req.dry_run, deadline).map_err(to_status)?;
        info!(plan_id = %plan.plan_id, strategy, "plan computed");

        let placements = plan
            .placements
            .into_iter()
            .map(|(id, d)| {
                (
                    id,
                    PlacementDecisionProto {
                        stage_id: d.stage_id,
                        node_name: d.node_name,
                        exec_format: d.exec_format,
                    },
                )
            })
            .collect();

        Ok(Response::new(PlanResponse {
            plan_id: plan.plan_id,
            placements,
            predicted_latency_ms: plan.latency_ms,
            predicted_energy_kwh: plan.energy_kwh,
            risk_score: plan.risk_score,
            shadow_plan: plan.shadow_plan,
        }))
    }

    async fn observe_availability(
        &self,
        request: Request<ObserveAvailabilityRequest>,
    ) -> Result<Response<ObserveAvailabilityResponse>, Status> {
        let req = request.into_inner();
        self.twin.observe_availability(&req.node_name, req.available).map_err(to_status)?;
        Ok(Response::new(ObserveAvailabilityResponse { ok: true }))
    }

    async fn snapshot(&self, _request: Request<SnapshotRequest>) -> Result<Response<SnapshotResponse>, Status> {
        Ok(Response::new(SnapshotResponse {
            node_names: self.twin.snapshot(),
        }))
    }

    async fn record_observed(&self, request: Request<RecordObservedRequest>) -> Result<Response<RecordObservedResponse>, Status> {
        let req = request.into_inner();
        let metrics = dt_state::ObservedMetrics {
            plan_id: req.plan_id.clone(),
            latency_ms: req.latency_ms,
            cpu_util: req.cpu_util,
            mem_peak_gb: req.mem_peak_gb,
            energy_kwh: req.energy_kwh,
            completed_at: req.completed_at,
        };
        self.twin.record_observed(&req.plan_id, metrics).map_err(to_status)?;
        Ok(Response::new(RecordObservedResponse { ok: true }))
    }

    async fn get_observed(&self, request: Request<GetObservedRequest>) -> Result<Response<GetObservedResponse>, Status> {
        let req = request.into_inner();
        match self.twin.get_observed(&req.plan_id) {
            Some(m) => Ok(Response::new(GetObservedResponse {
                found: true,
                latency_ms: m.latency_ms,
                cpu_util: m.cpu_util,
                mem_peak_gb: m.mem_peak_gb,
                energy_kwh: m.energy_kwh,
                completed_at: m.completed_at,
            })),
            None => Ok(Response::new(GetObservedResponse {
                found: false,
                latency_ms: 0.0,
                cpu_util: 0.0,
                mem_peak_gb: 0.0,
                energy_kwh: 0.0,
                completed_at: 0,
            })),
        }
    }

    async fn register_node(&self, request: Request<RegisterNodeRequest>) -> Result<Response<RegisterNodeResponse>, Status> {
        let req = request.into_inner();
        let node = dt_state::Node::new(
            req.name,
            dt_state::HardwareProfile {
                cpu_cores: req.cpu_cores,
                memory_gb: req.memory_gb,
                gpu_vram_gb: req.gpu_vram_gb,
                arch: req.arch,
            },
            dt_state::K8sAllocatable {
                allocatable_cpu: req.allocatable_cpu,
                allocatable_mem_gb: req.allocatable_mem_gb,
            },
            dt_state::Telemetry {
                cpu_util: req.cpu_util,
                mem_util: req.mem_util,
            },
        );
        self.twin.register_node(node, &req.cluster_id);
        Ok(Response::new(RegisterNodeResponse { ok: true }))
    }

    async fn register_cluster(&self, request: Request<RegisterClusterRequest>) -> Result<Response<RegisterClusterResponse>, Status> {
        let req = request.into_inner();
        self.twin.register_cluster(&req.cluster_id);
        Ok(Response::new(RegisterClusterResponse { ok: true }))
    }
}

fn to_status(err: dt_errors::DtError) -> Status {
    use dt_errors::DtError::*;
    match err {
        BadJobSpec(msg) => Status::invalid_argument(msg),
        NoFeasiblePlacement(stages) => Status::failed_precondition(format!("no feasible placement for stages: {stages:?}")),
        NoFeasibleFormat(stage) => Status::failed_precondition(format!("no feasible exec format for stage {stage}")),
        NotFound(what) => Status::not_found(what),
        ConfigError(msg) => Status::internal(msg),
        AlreadyExists(what) => Status::already_exists(what),
        Timeout(d) => Status::deadline_exceeded(format!("timed out after {d:?}")),
        Internal(msg) => Status::internal(msg),
    }
}

/// Start the gRPC server; blocks until the server shuts down.
pub async fn start_grpc_server(twin: Arc<DigitalTwin>, addr: std::net::SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    info!("starting gRPC server on {}", addr);
    Server::builder().add_service(SchedulerServiceServer::new(SchedulerGrpc::new(twin))).serve(addr).await?;
    Ok(())
}
