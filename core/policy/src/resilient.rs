//! Resilient multi-criteria policy: blends capacity fit, reliability, and
//! utilization headroom, with a small latency penalty as a tiebreaker.

use std::collections::HashMap;
use std::sync::Arc;

use dt_cluster_manager::ClusterManager;
use dt_resiliency::ResiliencyScorer;
use dt_simulator::PredictiveSimulator;
use dt_state::{Job, JobStage, Node, PlacementDecision, StateStore};

use crate::{base_candidate_nodes, hard_resource_fit, origin_latency, Policy};

const DEFAULT_CAPACITY_WEIGHT: f64 = 0.3;
const DEFAULT_RESILIENCY_WEIGHT: f64 = 0.5;
const DEFAULT_UTILIZATION_WEIGHT: f64 = 0.2;
const LATENCY_PENALTY_COEFFICIENT: f64 = 0.001;

pub struct ResilientPolicy {
    state: Arc<StateStore>,
    simulator: Arc<PredictiveSimulator>,
    cluster_manager: Option<Arc<ClusterManager>>,
    resiliency_scorer: ResiliencyScorer,
    capacity_weight: f64,
    resiliency_weight: f64,
    utilization_weight: f64,
}

impl ResilientPolicy {
    pub fn new(state: Arc<StateStore>, simulator: Arc<PredictiveSimulator>, cluster_manager: Option<Arc<ClusterManager>>) -> Self {
        Self::with_weights(
            state,
            simulator,
            cluster_manager,
            DEFAULT_CAPACITY_WEIGHT,
            DEFAULT_RESILIENCY_WEIGHT,
            DEFAULT_UTILIZATION_WEIGHT,
        )
    }

    pub fn with_weights(
        state: Arc<StateStore>,
        simulator: Arc<PredictiveSimulator>,
        cluster_manager: Option<Arc<ClusterManager>>,
        mut capacity_weight: f64,
        mut resiliency_weight: f64,
        mut utilization_weight: f64,
    ) -> Self {
        let total = capacity_weight + resiliency_weight + utilization_weight;
        if (total - 1.0).abs() > 1e-9 {
            tracing::warn!(total, "ResilientPolicy weights do not sum to 1.0, normalizing");
            capacity_weight /= total;
            resiliency_weight /= total;
            utilization_weight /= total;
        }
        Self {
            state,
            simulator,
            cluster_manager,
            resiliency_scorer: ResiliencyScorer::new(),
            capacity_weight,
            resiliency_weight,
            utilization_weight,
        }
    }

    fn candidate_nodes(&self, stage: &JobStage) -> Vec<Node> {
        base_candidate_nodes(&self.state, stage)
            .into_iter()
            .filter(|n| hard_resource_fit(stage, n))
            .collect()
    }

    fn capacity_fit(&self, stage: &JobStage, node: &Node) -> f64 {
        if node.k8s.allocatable_cpu == 0 || node.k8s.allocatable_mem_gb == 0 {
            return 0.0;
        }
        let cpu_fit = 1.0 - (stage.compute.cpu as f64 / node.k8s.allocatable_cpu as f64);
        let mem_fit = 1.0 - (stage.compute.mem_gb as f64 / node.k8s.allocatable_mem_gb as f64);
        cpu_fit.min(mem_fit).max(0.0)
    }

    fn utilization_headroom(&self, node: &Node) -> f64 {
        let util = node.tel.cpu_util.max(node.tel.mem_util) / 100.0;
        (1.0 - util).max(0.0)
    }
}

impl Policy for ResilientPolicy {
    fn name(&self) -> &'static str {
        "resilient"
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

                let capacity_score = self.capacity_fit(stage, &node);
                let resiliency_score = self.resiliency_scorer.compute_node_score(&self.state, &node.name);
                let utilization_score = self.utilization_headroom(&node);

                let composite = self.capacity_weight * capacity_score
                    + self.resiliency_weight * resiliency_score
                    + self.utilization_weight * utilization_score
                    - LATENCY_PENALTY_COEFFICIENT * latency_ms;

                let better = match &best {
                    Some((_, _, best_composite)) => composite > *best_composite,
                    None => true,
                };
                if better {
                    best = Some((node, exec_format, composite));
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
