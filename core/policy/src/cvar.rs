//! Risk-averse policy: hedges tail latency via Conditional Value at Risk
//! (CVaR) over Monte-Carlo-sampled multiplicative noise.
//!
//! No hard resource gate — candidates are filtered only by availability and
//! GPU fit; the scoring itself is expected to push overcommitted nodes down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dt_cluster_manager::ClusterManager;
use dt_resiliency::ResiliencyScorer;
use dt_simulator::PredictiveSimulator;
use dt_state::{Job, JobStage, Node, PlacementDecision, StateStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};

use crate::{origin_latency, Policy};

const DEFAULT_ALPHA: f64 = 0.95;
const DEFAULT_RISK_WEIGHT: f64 = 0.6;
const DEFAULT_RUNS: usize = 16;
const NOISE_SIGMA: f64 = 0.15;

pub struct RiskAwareCvarPolicy {
    state: Arc<StateStore>,
    simulator: Arc<PredictiveSimulator>,
    cluster_manager: Option<Arc<ClusterManager>>,
    resiliency_scorer: ResiliencyScorer,
    alpha: f64,
    risk_weight: f64,
    runs: usize,
    rng: Mutex<StdRng>,
}

impl RiskAwareCvarPolicy {
    pub fn new(state: Arc<StateStore>, simulator: Arc<PredictiveSimulator>, cluster_manager: Option<Arc<ClusterManager>>) -> Self {
        Self::with_params(state, simulator, cluster_manager, DEFAULT_ALPHA, DEFAULT_RISK_WEIGHT, DEFAULT_RUNS, None)
    }

    /// `seed: None` draws from process entropy; a fixed seed makes repeated
    /// invocations against the same state bit-for-bit identical.
    pub fn with_params(
        state: Arc<StateStore>,
        simulator: Arc<PredictiveSimulator>,
        cluster_manager: Option<Arc<ClusterManager>>,
        alpha: f64,
        risk_weight: f64,
        runs: usize,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            state,
            simulator,
            cluster_manager,
            resiliency_scorer: ResiliencyScorer::new(),
            alpha: alpha.clamp(0.0, 1.0),
            risk_weight: risk_weight.max(0.0),
            runs: runs.max(1),
            rng: Mutex::new(rng),
        }
    }

    fn candidate_nodes(&self, stage: &JobStage) -> Vec<Node> {
        self.state
            .list_nodes()
            .into_iter()
            .filter(|n| n.available)
            .filter(|n| stage.compute.gpu_vram_gb == 0 || n.hardware.gpu_vram_gb >= stage.compute.gpu_vram_gb)
            .collect()
    }

    fn sample_cost(&self, job: &Job, tentative: &HashMap<String, PlacementDecision>) -> f64 {
        let base_latency = self
            .simulator
            .score_plan(job, tentative)
            .map(|m| m.latency_ms)
            .unwrap_or(0.0);

        let origin_lat = job
            .origin
            .as_ref()
            .and_then(|_| job.stages.first())
            .and_then(|first_stage| tentative.get(&first_stage.id))
            .and_then(|decision| self.state.get_node(&decision.node_name))
            .map(|node| origin_latency(&self.state, self.cluster_manager.as_ref(), job, &node))
            .unwrap_or(0.0);

        let total_latency = base_latency + origin_lat;

        let dist = LogNormal::new(0.0, NOISE_SIGMA).expect("valid lognormal params");
        let mut rng = self.rng.lock().unwrap();
        let mut samples: Vec<f64> = (0..self.runs).map(|_| total_latency * dist.sample(&mut *rng)).collect();
        drop(rng);

        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((self.alpha * (samples.len() - 1) as f64).round() as usize).min(samples.len() - 1);
        let q = samples[idx];
        let tail: Vec<f64> = samples.iter().copied().filter(|&s| s >= q).collect();

        if tail.is_empty() {
            q
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        }
    }
}

impl Policy for RiskAwareCvarPolicy {
    fn name(&self) -> &'static str {
        "cvar"
    }

    fn enforces_hard_resource_gate(&self) -> bool {
        false
    }

    fn place(&self, job: &Job) -> HashMap<String, PlacementDecision> {
        let mut placements: HashMap<String, PlacementDecision> = HashMap::new();

        for stage in &job.stages {
            let mut best: Option<(PlacementDecision, f64)> = None;

            let mut candidates = self.candidate_nodes(stage);
            candidates.sort_by(|a, b| a.name.cmp(&b.name));

            for node in candidates {
                let Ok(exec_format) = self.simulator.choose_exec_format(stage, &node) else {
                    continue;
                };

                let mut tentative = placements.clone();
                let decision = PlacementDecision {
                    stage_id: stage.id.clone(),
                    node_name: node.name.clone(),
                    exec_format,
                };
                tentative.insert(stage.id.clone(), decision.clone());

                let cvar = self.sample_cost(job, &tentative);
                let resiliency = self.resiliency_scorer.compute_node_score(&self.state, &node.name);
                let adjusted = cvar * (1.0 + self.risk_weight * (1.0 - resiliency));

                let better = match &best {
                    Some((_, best_adjusted)) => adjusted < *best_adjusted,
                    None => true,
                };
                if better {
                    best = Some((decision, adjusted));
                }
            }

            match best {
                Some((decision, _)) => {
                    placements.insert(stage.id.clone(), decision);
                }
                None => {
                    tracing::warn!(stage = %stage.id, "no CVaR candidate for stage");
                }
            }
        }

        placements
    }
}
