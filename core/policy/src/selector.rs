//! Adaptive policy selection based on recent failure history, job urgency,
//! and average fleet utilization.
//!
//! Supplemental to the three placement strategies; not part of the core
//! placement contract, but useful enough to demo-seed as the scheduler's
//! default dispatch path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dt_cluster_manager::ClusterManager;
use dt_simulator::PredictiveSimulator;
use dt_state::{Job, StateStore};

use crate::{GreedyLatencyPolicy, Policy, ResilientPolicy, RiskAwareCvarPolicy};

const FAILURE_WINDOW: Duration = Duration::from_secs(300);
const URGENT_DEADLINE_MS: u64 = 5_000;
const HIGH_UTILIZATION_THRESHOLD: f64 = 0.75;
/// Rolling-window cap on performance records kept per policy name.
const MAX_PERFORMANCE_RECORDS: usize = 100;

struct PerformanceRecord {
    success: bool,
    completion_time_ms: f64,
}

/// Aggregate outcome stats for one policy name, as returned by `get_policy_stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyStats {
    pub total_jobs: usize,
    pub success_rate: f64,
    pub avg_completion_ms: f64,
}

pub struct PolicySelector {
    state: Arc<StateStore>,
    greedy: GreedyLatencyPolicy,
    resilient: ResilientPolicy,
    cvar: RiskAwareCvarPolicy,
    recent_failures: Mutex<Vec<Instant>>,
    policy_performance: Mutex<HashMap<String, Vec<PerformanceRecord>>>,
}

impl PolicySelector {
    pub fn new(state: Arc<StateStore>, simulator: Arc<PredictiveSimulator>, cluster_manager: Option<Arc<ClusterManager>>) -> Self {
        Self {
            state: state.clone(),
            greedy: GreedyLatencyPolicy::new(state.clone(), simulator.clone(), cluster_manager.clone()),
            resilient: ResilientPolicy::new(state.clone(), simulator.clone(), cluster_manager.clone()),
            cvar: RiskAwareCvarPolicy::new(state, simulator, cluster_manager),
            recent_failures: Mutex::new(Vec::new()),
            policy_performance: Mutex::new(HashMap::new()),
        }
    }

    /// Records a single completed job's outcome against `policy_name`, for
    /// later review via `get_policy_stats`. Keeps only the most recent
    /// `MAX_PERFORMANCE_RECORDS` per policy.
    pub fn record_policy_performance(&self, policy_name: &str, success: bool, completion_time_ms: f64) {
        let mut performance = self.policy_performance.lock().unwrap();
        let records = performance.entry(policy_name.to_string()).or_default();
        records.push(PerformanceRecord { success, completion_time_ms });
        if records.len() > MAX_PERFORMANCE_RECORDS {
            let overflow = records.len() - MAX_PERFORMANCE_RECORDS;
            records.drain(0..overflow);
        }
    }

    /// Success rate and average completion time (over successful jobs only)
    /// per policy name, from the rolling performance window.
    pub fn get_policy_stats(&self) -> HashMap<String, PolicyStats> {
        let performance = self.policy_performance.lock().unwrap();
        performance
            .iter()
            .map(|(name, records)| {
                if records.is_empty() {
                    return (
                        name.clone(),
                        PolicyStats { total_jobs: 0, success_rate: 0.0, avg_completion_ms: 0.0 },
                    );
                }
                let successes = records.iter().filter(|r| r.success).count();
                let successful_times: Vec<f64> = records.iter().filter(|r| r.success).map(|r| r.completion_time_ms).collect();
                let avg_completion_ms = if successful_times.is_empty() {
                    0.0
                } else {
                    successful_times.iter().sum::<f64>() / successful_times.len() as f64
                };
                (
                    name.clone(),
                    PolicyStats {
                        total_jobs: records.len(),
                        success_rate: successes as f64 / records.len() as f64,
                        avg_completion_ms,
                    },
                )
            })
            .collect()
    }

    pub fn record_failure(&self) {
        let mut failures = self.recent_failures.lock().unwrap();
        failures.push(Instant::now());
        self.prune_old_failures(&mut failures);
    }

    fn prune_old_failures(&self, failures: &mut Vec<Instant>) {
        let cutoff = Instant::now() - FAILURE_WINDOW;
        failures.retain(|t| *t > cutoff);
    }

    fn has_recent_failures(&self) -> bool {
        let mut failures = self.recent_failures.lock().unwrap();
        self.prune_old_failures(&mut failures);
        !failures.is_empty()
    }

    fn average_utilization(&self) -> f64 {
        let nodes = self.state.list_nodes();
        if nodes.is_empty() {
            return 0.0;
        }
        let sum: f64 = nodes.iter().map(|n| n.tel.cpu_util.max(n.tel.mem_util) / 100.0).sum();
        sum / nodes.len() as f64
    }

    /// Picks a policy for `job`. `force` overrides the heuristic when it
    /// names one of `"greedy" | "resilient" | "cvar"`.
    pub fn select_policy_for_job(&self, job: &Job, force: Option<&str>) -> &dyn Policy {
        match force {
            Some("greedy") => return &self.greedy,
            Some("resilient") => return &self.resilient,
            Some("cvar") => return &self.cvar,
            _ => {}
        }

        if self.has_recent_failures() {
            return &self.resilient;
        }

        if job.deadline_ms < URGENT_DEADLINE_MS || job.origin.is_some() {
            return &self.resilient;
        }

        if self.average_utilization() > HIGH_UTILIZATION_THRESHOLD {
            return &self.cvar;
        }

        &self.greedy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_state::{HardwareProfile, JobOrigin, JobStage, K8sAllocatable, StageCompute, StageConstraints, Telemetry, WorkloadType};

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

    fn node(name: &str, cpu_util: f64) -> dt_state::Node {
        dt_state::Node::new(
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

    #[test]
    fn urgent_deadline_selects_resilient() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        let job = Job {
            name: "urgent".to_string(),
            deadline_ms: 1_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert_eq!(selector.select_policy_for_job(&job, None).name(), "resilient");
    }

    #[test]
    fn job_with_origin_selects_resilient() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        let job = Job {
            name: "has-origin".to_string(),
            deadline_ms: 60_000,
            stages: vec![stage("s1")],
            origin: Some(JobOrigin {
                cluster: "edge-microdc".to_string(),
                node: None,
            }),
        };
        assert_eq!(selector.select_policy_for_job(&job, None).name(), "resilient");
    }

    #[test]
    fn high_utilization_selects_cvar() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 90.0), "dc-core");
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        let job = Job {
            name: "routine".to_string(),
            deadline_ms: 60_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert_eq!(selector.select_policy_for_job(&job, None).name(), "cvar");
    }

    #[test]
    fn default_case_selects_greedy() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 10.0), "dc-core");
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        let job = Job {
            name: "routine".to_string(),
            deadline_ms: 60_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert_eq!(selector.select_policy_for_job(&job, None).name(), "greedy");
    }

    #[test]
    fn recent_failure_overrides_to_resilient() {
        let state = Arc::new(StateStore::new());
        state.register_node(node("n1", 10.0), "dc-core");
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);
        selector.record_failure();

        let job = Job {
            name: "routine".to_string(),
            deadline_ms: 60_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert_eq!(selector.select_policy_for_job(&job, None).name(), "resilient");
    }

    #[test]
    fn policy_stats_track_success_rate_and_avg_completion() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        selector.record_policy_performance("greedy", true, 100.0);
        selector.record_policy_performance("greedy", true, 200.0);
        selector.record_policy_performance("greedy", false, 9_999.0);

        let stats = selector.get_policy_stats();
        let greedy = stats.get("greedy").unwrap();
        assert_eq!(greedy.total_jobs, 3);
        assert!((greedy.success_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert!((greedy.avg_completion_ms - 150.0).abs() < 1e-9);
    }

    #[test]
    fn policy_performance_window_is_capped() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        for i in 0..150 {
            selector.record_policy_performance("cvar", true, i as f64);
        }

        let stats = selector.get_policy_stats();
        assert_eq!(stats.get("cvar").unwrap().total_jobs, MAX_PERFORMANCE_RECORDS);
    }

    #[test]
    fn force_policy_overrides_heuristic() {
        let state = Arc::new(StateStore::new());
        let sim = Arc::new(PredictiveSimulator::new(state.clone(), None));
        let selector = PolicySelector::new(state, sim, None);

        let job = Job {
            name: "routine".to_string(),
            deadline_ms: 60_000,
            stages: vec![stage("s1")],
            origin: None,
        };
        assert_eq!(selector.select_policy_for_job(&job, Some("cvar")).name(), "cvar");
    }
}
