//! Predictive scoring simulator.
//!
//! Stage-latency, network-delay, exec-format choice, and whole-plan scoring.
//! All of it is a closed-form, deterministic computation over cached
//! telemetry when `failure_rate == 0`; no I/O.

pub mod chaos;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dt_cluster_manager::ClusterManager;
use dt_errors::{DtError, DtResult};
use dt_resiliency::ResiliencyScorer;
use dt_state::{Job, JobStage, Node, PlacementDecision, StateStore, WorkloadType};
use serde::{Deserialize, Serialize};

const SAME_CLUSTER_FLOOR_MS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub latency_ms: f64,
    pub energy_kwh: f64,
    pub risk_score: f64,
    pub sla_violations: u32,
}

pub struct PredictiveSimulator {
    state: Arc<StateStore>,
    cluster_manager: Option<Arc<ClusterManager>>,
    resiliency: ResiliencyScorer,
    failure_rate: f64,
}

impl PredictiveSimulator {
    pub fn new(state: Arc<StateStore>, cluster_manager: Option<Arc<ClusterManager>>) -> Self {
        Self {
            state,
            cluster_manager,
            resiliency: ResiliencyScorer::new(),
            failure_rate: 0.0,
        }
    }

    /// Chaos-mode constructor: stage latency gains a stochastic penalty whose
    /// expectation grows with `failure_rate`. Deterministic only when
    /// `failure_rate == 0`.
    pub fn with_failure_rate(
        state: Arc<StateStore>,
        cluster_manager: Option<Arc<ClusterManager>>,
        failure_rate: f64,
    ) -> Self {
        Self {
            state,
            cluster_manager,
            resiliency: ResiliencyScorer::new(),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Prefer `native` when the node's arch matches; fall back to `wasm`;
    /// otherwise the remaining allowed format with the lowest overhead.
    pub fn choose_exec_format(&self, stage: &JobStage, node: &Node) -> DtResult<String> {
        if stage.constraints.formats.is_empty() {
            return Err(DtError::NoFeasibleFormat(stage.id.clone()));
        }
        let arch_matches = stage.constraints.arch.iter().any(|a| a == &node.hardware.arch);
        if arch_matches && stage.constraints.formats.iter().any(|f| f == "native") {
            return Ok("native".to_string());
        }
        if stage.constraints.formats.iter().any(|f| f == "wasm") {
            return Ok("wasm".to_string());
        }
        stage
            .constraints
            .formats
            .iter()
            .min_by(|a, b| format_overhead(a).partial_cmp(&format_overhead(b)).unwrap())
            .cloned()
            .ok_or_else(|| DtError::NoFeasibleFormat(stage.id.clone()))
    }

    pub fn compute_stage_latency_ms(&self, stage: &JobStage, node: &Node, format: &str) -> f64 {
        let base = stage.compute.duration_ms as f64 * workload_coefficient(stage, node);
        let congestion = 1.0 + 0.5 * (node.tel.cpu_util / 100.0) + 0.3 * (node.tel.mem_util / 100.0);
        let overhead = format_overhead(format);
        let mut latency = base * congestion * overhead;

        if self.failure_rate > 0.0 {
            let jitter: f64 = rand::random::<f64>();
            latency *= 1.0 + self.failure_rate * jitter;
        }

        latency
    }

    pub fn compute_network_delay_ms(&self, node_a: &Node, node_b: &Node) -> f64 {
        if node_a.name == node_b.name {
            return 0.0;
        }
        let cluster_a = self.state.get_cluster(&node_a.name);
        let cluster_b = self.state.get_cluster(&node_b.name);
        match (cluster_a, cluster_b) {
            (Some(a), Some(b)) if a == b => SAME_CLUSTER_FLOOR_MS,
            (Some(a), Some(b)) => self
                .cluster_manager
                .as_ref()
                .map(|cm| cm.get_latency_between(&a, &b, Some(&node_a.name), Some(&node_b.name)))
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn origin_latency(&self, job: &Job, node: &Node) -> f64 {
        let Some(origin) = &job.origin else {
            return 0.0;
        };
        let Some(node_cluster) = self.state.get_cluster(&node.name) else {
            return 0.0;
        };
        if origin.cluster == node_cluster {
            return SAME_CLUSTER_FLOOR_MS;
        }
        self.cluster_manager
            .as_ref()
            .map(|cm| cm.get_latency_between(&origin.cluster, &node_cluster, origin.node.as_deref(), Some(&node.name)))
            .unwrap_or(0.0)
    }

    /// Walks the predecessor chain in declaration order, accumulating finish
    /// times. `predicted_latency_ms` is the maximum finish time over leaf
    /// stages (stages nobody else depends on), i.e. the critical path.
    pub fn score_plan(&self, job: &Job, placements: &HashMap<String, PlacementDecision>) -> DtResult<PlanMetrics> {
        let mut finish_times: HashMap<String, f64> = HashMap::new();
        let mut referenced_as_predecessor: HashSet<String> = HashSet::new();
        let mut sla_violations = 0u32;
        let mut total_energy = 0.0;
        let mut resiliency_scores = Vec::new();

        for stage in &job.stages {
            let Some(decision) = placements.get(&stage.id) else {
                continue;
            };
            let Some(node) = self.state.get_node(&decision.node_name) else {
                continue;
            };

            if let Some(pred_id) = &stage.predecessor {
                referenced_as_predecessor.insert(pred_id.clone());
            }

            let stage_latency = self.compute_stage_latency_ms(stage, &node, &decision.exec_format);

            let start = match &stage.predecessor {
                Some(pred_id) => match (finish_times.get(pred_id), placements.get(pred_id)) {
                    (Some(&pred_finish), Some(pred_decision)) => {
                        let pred_node = self.state.get_node(&pred_decision.node_name);
                        let delay = pred_node
                            .map(|pn| self.compute_network_delay_ms(&pn, &node))
                            .unwrap_or(0.0);
                        pred_finish + delay
                    }
                    // Dangling predecessor (dropped for infeasibility): the
                    // network-delay term is silently omitted; the stage is
                    // still scored from its own start.
                    _ => 0.0,
                },
                None => self.origin_latency(job, &node),
            };

            let finish = start + stage_latency;
            finish_times.insert(stage.id.clone(), finish);

            if finish > job.deadline_ms as f64 {
                sla_violations += 1;
            }

            total_energy += power_profile_kw(&node) * (stage_latency / 3_600_000.0);
            resiliency_scores.push(self.resiliency.compute_node_score(&self.state, &decision.node_name));
        }

        let leaf_finish_times: Vec<f64> = finish_times
            .iter()
            .filter(|(id, _)| !referenced_as_predecessor.contains(*id))
            .map(|(_, finish)| *finish)
            .collect();

        let latency_ms = leaf_finish_times.iter().cloned().fold(0.0, f64::max);

        let placed_count = finish_times.len().max(1) as f64;
        let violation_rate = sla_violations as f64 / placed_count;
        let avg_resiliency = if resiliency_scores.is_empty() {
            0.0
        } else {
            resiliency_scores.iter().sum::<f64>() / resiliency_scores.len() as f64
        };
        let risk_score = (0.6 * violation_rate + 0.4 * (1.0 - avg_resiliency)).clamp(0.0, 1.0);

        Ok(PlanMetrics {
            latency_ms,
            energy_kwh: total_energy,
            risk_score,
            sla_violations,
        })
    }
}

fn format_overhead(format: &str) -> f64 {
    match format {
        "native" => 1.00,
        "wasm" => 1.15,
        _ => 1.30,
    }
}

fn workload_coefficient(stage: &JobStage, node: &Node) -> f64 {
    match stage.compute.workload_type {
        WorkloadType::GpuBound => {
            if node.hardware.gpu_vram_gb > 0 {
                (8.0 / node.hardware.gpu_vram_gb as f64).max(0.3)
            } else {
                2.0
            }
        }
        WorkloadType::CpuBound => {
            let headroom = (1.0 - node.tel.cpu_util / 100.0).max(0.05);
            1.0 / headroom
        }
        WorkloadType::MemBound => {
            let headroom = (1.0 - node.tel.mem_util / 100.0).max(0.05);
            1.0 / headroom
        }
        WorkloadType::IoBound => 1.0,
    }
}

fn power_profile_kw(node: &Node) -> f64 {
    0.01 * node.hardware.cpu_cores as f64 + 0.05 * node.hardware.gpu_vram_gb as f64
}
