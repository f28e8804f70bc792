//! `DigitalTwin`: the facade every adaptor (gRPC, CLI, tests) calls into.
//! No planning logic lives in the adaptors — only here and in `dt-policy` /
//! `dt-simulator`.

pub mod config;
pub mod grpc;
pub mod seed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dt_cluster_manager::ClusterManager;
use dt_errors::{DtError, DtResult};
use dt_policy::{GreedyLatencyPolicy, Policy, ResilientPolicy, RiskAwareCvarPolicy};
use dt_simulator::PredictiveSimulator;
use dt_state::{Job, Node, ObservedMetrics, PlacementDecision, Plan, StateStore};

/// The actuator side of the plan lifecycle: whatever submits a computed plan
/// onto the real cluster runtime. The core only depends on this interface,
/// never on a concrete transport (`worker`'s Docker executor is one such
/// implementation, reached out-of-process over its own channel).
pub trait ActuatorDispatch: Send + Sync {
    fn submit_plan(&self, job: &Job, placements: &HashMap<String, PlacementDecision>, plan_id: &str) -> DtResult<()>;
}

/// Default actuator: no out-of-process transport wired in, so there is
/// nothing to submit to. Kept distinct from "no actuator at all" so the
/// `Submitted` transition still logs, matching the original's shape even
/// when the call has nowhere real to go.
struct NoopActuator;

impl ActuatorDispatch for NoopActuator {
    fn submit_plan(&self, _job: &Job, _placements: &HashMap<String, PlacementDecision>, _plan_id: &str) -> DtResult<()> {
        Ok(())
    }
}

pub struct DigitalTwin {
    state: Arc<StateStore>,
    cluster_manager: Option<Arc<ClusterManager>>,
    simulator: Arc<PredictiveSimulator>,
    actuator: Arc<dyn ActuatorDispatch>,
}

impl DigitalTwin {
    pub fn new(state: Arc<StateStore>, cluster_manager: Option<Arc<ClusterManager>>) -> Self {
        Self::with_actuator(state, cluster_manager, Arc::new(NoopActuator))
    }

    pub fn with_actuator(
        state: Arc<StateStore>,
        cluster_manager: Option<Arc<ClusterManager>>,
        actuator: Arc<dyn ActuatorDispatch>,
    ) -> Self {
        let simulator = Arc::new(PredictiveSimulator::new(state.clone(), cluster_manager.clone()));
        Self {
            state,
            cluster_manager,
            simulator,
            actuator,
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn register_cluster(&self, cluster_id: &str) {
        self.state.register_cluster(cluster_id);
    }

    pub fn register_node(&self, node: Node, cluster_id: &str) {
        self.state.register_node(node, cluster_id);
    }

    pub fn observe_availability(&self, name: &str, available: bool) -> DtResult<()> {
        self.state.mark_node_availability(name, available)
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.list_nodes().into_iter().map(|n| n.name).collect();
        names.sort();
        names
    }

    pub fn record_observed(&self, plan_id: &str, metrics: ObservedMetrics) -> DtResult<()> {
        self.state.record_observed(plan_id, metrics)
    }

    pub fn get_observed(&self, plan_id: &str) -> Option<ObservedMetrics> {
        self.state.get_observed(plan_id)
    }

    fn build_policy(&self, strategy: &str) -> DtResult<Box<dyn Policy>> {
        match strategy {
            "greedy" => Ok(Box::new(GreedyLatencyPolicy::new(
                self.state.clone(),
                self.simulator.clone(),
                self.cluster_manager.clone(),
            ))),
            "resilient" => Ok(Box::new(ResilientPolicy::new(
                self.state.clone(),
                self.simulator.clone(),
                self.cluster_manager.clone(),
            ))),
            "cvar" => Ok(Box::new(RiskAwareCvarPolicy::new(
                self.state.clone(),
                self.simulator.clone(),
                self.cluster_manager.clone(),
            ))),
            other => Err(DtError::BadJobSpec(format!("unknown strategy: {other}"))),
        }
    }

    /// Computes a placement plan. `deadline`, if given, bounds wall-clock
    /// time for the whole synchronous computation; exceeding it after the
    /// fact surfaces `Timeout` rather than a stale plan.
    pub fn plan(&self, job: &Job, strategy: &str, dry_run: bool, deadline: Option<Duration>) -> DtResult<Plan> {
        let start = Instant::now();
        let policy = self.build_policy(strategy)?;

        let placements = policy.place(job);
        if placements.len() != job.stages.len() {
            let missing: Vec<String> = job
                .stages
                .iter()
                .map(|s| s.id.clone())
                .filter(|id| !placements.contains_key(id))
                .collect();
            return Err(DtError::NoFeasiblePlacement(missing));
        }

        let metrics = self.simulator.score_plan(job, &placements)?;
        let shadow_plan = self.derive_shadow_plan(job, &placements, policy.as_ref());

        if let Some(deadline) = deadline {
            if start.elapsed() > deadline {
                return Err(DtError::Timeout(deadline));
            }
        }

        let plan = Plan {
            plan_id: format!("plan-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            job_name: job.name.clone(),
            placements,
            latency_ms: metrics.latency_ms,
            energy_kwh: metrics.energy_kwh,
            risk_score: metrics.risk_score,
            shadow_plan,
        };

        if !dry_run {
            self.state.add_job(job.clone());
            self.state.store_plan(plan.clone());
            if let Err(e) = self.actuator.submit_plan(job, &plan.placements, &plan.plan_id) {
                tracing::error!(plan_id = %plan.plan_id, error = %e, "failed to submit plan to actuator");
            }
        }

        Ok(plan)
    }

    /// Per-stage backup node: the lexicographically-first other available
    /// candidate, distinct from the primary where one exists. Falls back to
    /// the primary itself when no second candidate is available.
    fn derive_shadow_plan(
        &self,
        job: &Job,
        placements: &HashMap<String, PlacementDecision>,
        policy: &dyn Policy,
    ) -> HashMap<String, String> {
        let mut shadow = HashMap::new();
        for stage in &job.stages {
            let Some(primary) = placements.get(&stage.id) else {
                continue;
            };
            let mut candidates: Vec<Node> = self
                .state
                .list_nodes()
                .into_iter()
                .filter(|n| n.available && n.name != primary.node_name)
                .collect();
            if policy.enforces_hard_resource_gate() {
                candidates.retain(|n| n.k8s.allocatable_cpu >= stage.compute.cpu && n.k8s.allocatable_mem_gb >= stage.compute.mem_gb);
            }
            candidates.sort_by(|a, b| a.name.cmp(&b.name));
            let backup_name = candidates.first().map(|n| n.name.clone()).unwrap_or_else(|| primary.node_name.clone());
            shadow.insert(format!("{}_backup", stage.id), backup_name);
        }
        shadow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_state::{HardwareProfile, JobStage, K8sAllocatable, StageCompute, StageConstraints, Telemetry, WorkloadType};

    fn node(name: &str, cpu_util: f64) -> Node {
        Node::new(
            name,
            HardwareProfile {
                cpu_cores: 8,
                memory_gb: 32,
                gpu_vram_gb: 0,
                arch: "amd64".to_string(),
            },
            K8sAllocatable {
                allocatable_cpu: 8,
                allocatable_mem_gb: 32,
            },
            Telemetry {
                cpu_util,
                mem_util: 10.0,
            },
        )
    }

    fn job(name: &str) -> Job {
        Job {
            name: name.to_string(),
            deadline_ms: 10_000,
            stages: vec![JobStage {
                id: "s1".to_string(),
                compute: StageCompute {
                    cpu: 1,
                    mem_gb: 1,
                    duration_ms: 1000,
                    gpu_vram_gb: 0,
                    workload_type: WorkloadType::CpuBound,
                },
                constraints: StageConstraints {
                    arch: vec!["amd64".to_string()],
                    formats: vec!["native".to_string()],
                    data_locality: None,
                    max_latency_to_predecessor_ms: None,
                },
                predecessor: None,
            }],
            origin: None,
        }
    }

    #[test]
    fn plan_succeeds_with_available_node() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 20.0), "dc-core");
        let twin = DigitalTwin::new(state, None);

        let plan = twin.plan(&job("job-1"), "greedy", false, None).unwrap();
        assert_eq!(plan.placements.len(), 1);
        assert!(plan.plan_id.starts_with("plan-"));
        assert!(plan.shadow_plan.contains_key("s1_backup"));
    }

    #[test]
    fn plan_fails_with_no_feasible_placement() {
        let state = Arc::new(StateStore::new());
        let twin = DigitalTwin::new(state, None);
        let err = twin.plan(&job("job-2"), "greedy", false, None).unwrap_err();
        assert!(matches!(err, DtError::NoFeasiblePlacement(_)));
    }

    #[test]
    fn unknown_strategy_is_bad_job_spec() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 20.0), "dc-core");
        let twin = DigitalTwin::new(state, None);
        let err = twin.plan(&job("job-3"), "quantum", false, None).unwrap_err();
        assert!(matches!(err, DtError::BadJobSpec(_)));
    }

    #[test]
    fn dry_run_does_not_persist_job_or_plan() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 20.0), "dc-core");
        let twin = DigitalTwin::new(state.clone(), None);
        let plan = twin.plan(&job("job-4"), "greedy", true, None).unwrap();
        assert!(state.get_job("job-4").is_none());
        assert!(state.get_plan(&plan.plan_id).is_none());
    }

    struct CountingActuator {
        calls: std::sync::Mutex<u32>,
    }

    impl ActuatorDispatch for CountingActuator {
        fn submit_plan(&self, _job: &Job, _placements: &HashMap<String, PlacementDecision>, _plan_id: &str) -> DtResult<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn non_dry_run_dispatches_to_actuator() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 20.0), "dc-core");
        let actuator = Arc::new(CountingActuator { calls: std::sync::Mutex::new(0) });
        let twin = DigitalTwin::with_actuator(state, None, actuator.clone());

        twin.plan(&job("job-6"), "greedy", false, None).unwrap();
        assert_eq!(*actuator.calls.lock().unwrap(), 1);
    }

    #[test]
    fn dry_run_does_not_dispatch_to_actuator() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 20.0), "dc-core");
        let actuator = Arc::new(CountingActuator { calls: std::sync::Mutex::new(0) });
        let twin = DigitalTwin::with_actuator(state, None, actuator.clone());

        twin.plan(&job("job-7"), "greedy", true, None).unwrap();
        assert_eq!(*actuator.calls.lock().unwrap(), 0);
    }

    #[test]
    fn shadow_plan_picks_a_distinct_backup_when_available() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n-aardvark", 10.0), "dc-core");
        state.register_node(node("n-zebra", 10.0), "dc-core");
        let twin = DigitalTwin::new(state, None);

        let plan = twin.plan(&job("job-5"), "greedy", false, None).unwrap();
        let primary = &plan.placements.get("s1").unwrap().node_name;
        let backup = plan.shadow_plan.get("s1_backup").unwrap();
        assert_ne!(primary, backup);
    }
}
