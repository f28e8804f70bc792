//! Chaos scenarios: run a plan against a deep-copied, perturbed state
//! snapshot to see how it would have degraded.

use std::collections::HashMap;
use std::sync::Arc;

use dt_state::{Plan, StateStore};
use serde::{Deserialize, Serialize};

use crate::{PlanMetrics, PredictiveSimulator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosResult {
    pub scenario: String,
    pub baseline: PlanMetrics,
    pub perturbed: PlanMetrics,
}

/// Runs plans against a cloned, perturbed `StateStore`; the live store is
/// never touched.
pub struct ChaosScenarioRunner {
    state: Arc<StateStore>,
}

impl ChaosScenarioRunner {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }

    /// Fails one node in a clone of the state, then re-scores the plan
    /// against the already-chosen placements.
    pub fn run_with_node_failure(&self, plan: &Plan, failed_node: &str) -> ChaosResult {
        let baseline_sim = PredictiveSimulator::new(self.state.clone(), None);
        let baseline = self.score_existing(&baseline_sim, plan);

        let perturbed_state = Arc::new(self.state.clone_for_simulation());
        let _ = perturbed_state.mark_node_availability(failed_node, false);
        let perturbed_sim = PredictiveSimulator::with_failure_rate(perturbed_state, None, 0.5);
        let perturbed = self.score_existing(&perturbed_sim, plan);

        ChaosResult {
            scenario: format!("node_failure:{failed_node}"),
            baseline,
            perturbed,
        }
    }

    /// Saturates every node's telemetry to the given CPU/mem utilization in a
    /// clone of the state, then re-scores the plan.
    pub fn run_cpu_saturation(&self, plan: &Plan, cpu_util: f64, mem_util: f64) -> ChaosResult {
        let baseline_sim = PredictiveSimulator::new(self.state.clone(), None);
        let baseline = self.score_existing(&baseline_sim, plan);

        let perturbed_state = self.saturate_state(cpu_util, mem_util);
        let perturbed_sim = PredictiveSimulator::new(Arc::new(perturbed_state), None);
        let perturbed = self.score_existing(&perturbed_sim, plan);

        ChaosResult {
            scenario: "cpu_saturation".to_string(),
            baseline,
            perturbed,
        }
    }

    fn saturate_state(&self, cpu_util: f64, mem_util: f64) -> StateStore {
        let clone = self.state.clone_for_simulation();
        for node in clone.list_nodes() {
            let mut saturated = node.clone();
            saturated.tel.cpu_util = cpu_util;
            saturated.tel.mem_util = mem_util;
            let cluster = clone.get_cluster(&node.name).unwrap_or_default();
            clone.register_node(saturated, &cluster);
        }
        clone
    }

    fn score_existing(&self, sim: &PredictiveSimulator, plan: &Plan) -> PlanMetrics {
        let Some(job) = sim.state().get_job(&plan.job_name) else {
            return PlanMetrics {
                latency_ms: plan.latency_ms,
                energy_kwh: plan.energy_kwh,
                risk_score: plan.risk_score,
                sla_violations: 0,
            };
        };
        sim.score_plan(&job, &placements_from_plan(plan)).unwrap_or(PlanMetrics {
            latency_ms: plan.latency_ms,
            energy_kwh: plan.energy_kwh,
            risk_score: plan.risk_score,
            sla_violations: 0,
        })
    }
}

fn placements_from_plan(plan: &Plan) -> HashMap<String, dt_state::PlacementDecision> {
    plan.placements.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_state::{HardwareProfile, JobStage, K8sAllocatable, Node, PlacementDecision, StageCompute, StageConstraints, Telemetry};
    use dt_state::{Job, WorkloadType};

    fn node(name: &str) -> Node {
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
                cpu_util: 10.0,
                mem_util: 10.0,
            },
        )
    }

    fn stage(id: &str) -> JobStage {
        JobStage {
            id: id.to_string(),
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
        }
    }

    #[test]
    fn node_failure_does_not_mutate_live_state() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1"), "dc-core");
        let job = Job {
            name: "job".to_string(),
            deadline_ms: 5000,
            stages: vec![stage("s1")],
            origin: None,
        };
        state.add_job(job);

        let mut placements = HashMap::new();
        placements.insert(
            "s1".to_string(),
            PlacementDecision {
                stage_id: "s1".to_string(),
                node_name: "n1".to_string(),
                exec_format: "native".to_string(),
            },
        );
        let plan = Plan {
            plan_id: "plan-1".to_string(),
            job_name: "job".to_string(),
            placements,
            latency_ms: 0.0,
            energy_kwh: 0.0,
            risk_score: 0.0,
            shadow_plan: HashMap::new(),
        };

        let runner = ChaosScenarioRunner::new(state.clone());
        let result = runner.run_with_node_failure(&plan, "n1");

        assert!(state.get_node("n1").unwrap().available);
        assert_eq!(result.scenario, "node_failure:n1");
    }
}
