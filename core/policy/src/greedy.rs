//! Greedy latency-minimising policy: per stage, pick whichever candidate
//! minimises predicted latency. No notion of reliability or risk.

use std::collections::HashMap;
use std::sync::Arc;

use dt_cluster_manager::ClusterManager;
use dt_simulator::PredictiveSimulator;
use dt_state::{Job, Node, PlacementDecision, StateStore};

use crate::{base_candidate_nodes, hard_resource_fit, origin_latency, Policy};

pub struct GreedyLatencyPolicy {
    state: Arc<StateStore>,
    simulator: Arc<PredictiveSimulator>,
    cluster_manager: Option<Arc<ClusterManager>>,
}

impl GreedyLatencyPolicy {
    pub fn new(
        state: Arc<StateStore>,
        simulator: Arc<PredictiveSimulator>,
        cluster_manager: Option<Arc<ClusterManager>>,
    ) -> Self {
        Self {
            state,
            simulator,
            cluster_manager,
        }
    }

    fn candidate_nodes(&self, stage: &dt_state::JobStage) -> Vec<Node> {
        base_candidate_nodes(&self.state, stage)
            .into_iter()
            .filter(|n| hard_resource_fit(stage, n))
            .collect()
    }
}

impl Policy for GreedyLatencyPolicy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn place(&self, job: &Job) -> HashMap<String, PlacementDecision> {
        let mut placements = HashMap::new();
        let mut prev_node_for: HashMap<String, Node> = HashMap::new();

        for stage in &job.stages {
            let mut best: Option<(Node, String, f64)> = None;

            let mut candidates = self.candidate_nodes(stage);
            candidates.sort_by(|a, b| a.name.cmp(&b.name));

            for node in candidates {
                let Ok(exec_format) = self.simulator.choose_exec_format(stage, &node) else {
                    continue;
                };
                let mut latency_ms = self.simulator.compute_stage_latency_ms(stage, &node, &exec_format);

                if let Some(pred_id) = &stage.predecessor {
                    if let Some(pred_node) = prev_node_for.get(pred_id) {
                        latency_ms += self.simulator.compute_network_delay_ms(pred_node, &node);
                    }
                } else {
                    latency_ms += origin_latency(&self.state, self.cluster_manager.as_ref(), job, &node);
                }

                let better = match &best {
                    Some((_, _, best_latency)) => latency_ms < *best_latency,
                    None => true,
                };
                if better {
                    best = Some((node, exec_format, latency_ms));
                }
            }

            match best {
                Some((node, exec_format, _)) => {
                    placements.insert(
                        stage.id.clone(),
                        PlacementDecision {
                            stage_id: stage.id.clone(),
                            node_name: node.name.clone(),
                            exec_format,
                        },
                    );
                    prev_node_for.insert(stage.id.clone(), node);
                }
                None => {
                    tracing::warn!(stage = %stage.id, "no feasible node found for stage");
                }
            }
        }

        placements
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
    fn picks_least_congested_node() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n-busy", 90.0), "dc-core");
        state.register_node(node("n-idle", 5.0), "dc-core");
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let policy = GreedyLatencyPolicy::new(state, sim, None);

        let job = Job {
            name: "job".to_string(),
            deadline_ms: 10_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        let placements = policy.place(&job);
        assert_eq!(placements.get("s1").unwrap().node_name, "n-idle");
    }

    #[test]
    fn no_candidates_drops_stage() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let policy = GreedyLatencyPolicy::new(state, sim, None);

        let job = Job {
            name: "job".to_string(),
            deadline_ms: 10_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert!(policy.place(&job).is_empty());
    }
}
