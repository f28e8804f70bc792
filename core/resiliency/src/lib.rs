//! Per-node reliability scoring.
//!
//! `ResiliencyScorer` is a pure function of the current state snapshot: no
//! side effects, no hidden history of its own. The only history involved is
//! `Node::flap_count`, which the state store itself maintains.

use dt_state::StateStore;

/// GPU-bearing nodes get no intrinsic bonus here; a heavier node is not
/// inherently more reliable. Keep this comment because the temptation to
/// add one is exactly what the spec calls out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResiliencyScorer;

impl ResiliencyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Unknown node -> 0.0. Otherwise combines telemetry headroom with a
    /// penalty for recent availability flaps, clamped to [0, 1].
    pub fn compute_node_score(&self, state: &StateStore, name: &str) -> f64 {
        let Some(node) = state.get_node(name) else {
            return 0.0;
        };

        let headroom = 1.0 - (node.tel.cpu_util.max(node.tel.mem_util) / 100.0);
        let headroom = headroom.clamp(0.0, 1.0);

        let flap_penalty = (node.flap_count as f64 * 0.05).min(0.5);

        (headroom - flap_penalty).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_state::{HardwareProfile, K8sAllocatable, Node, Telemetry};

    fn node(cpu_util: f64, mem_util: f64) -> Node {
        Node::new(
            "n1",
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
            Telemetry { cpu_util, mem_util },
        )
    }

    #[test]
    fn unknown_node_scores_zero() {
        let state = StateStore::new();
        let scorer = ResiliencyScorer::new();
        assert_eq!(scorer.compute_node_score(&state, "ghost"), 0.0);
    }

    #[test]
    fn low_utilization_scores_higher_than_high_utilization() {
        let state = StateStore::new();
        state.register_node(node(10.0, 10.0), "dc-core");
        let scorer = ResiliencyScorer::new();
        let low_util_score = scorer.compute_node_score(&state, "n1");

        let state2 = StateStore::new();
        state2.register_node(node(90.0, 90.0), "dc-core");
        let high_util_score = scorer.compute_node_score(&state2, "n1");

        assert!(low_util_score > high_util_score);
        assert!((0.0..=1.0).contains(&low_util_score));
    }

    #[test]
    fn flapping_degrades_score() {
        let state = StateStore::new();
        state.register_node(node(10.0, 10.0), "dc-core");
        let scorer = ResiliencyScorer::new();
        let before = scorer.compute_node_score(&state, "n1");

        for _ in 0..4 {
            state.mark_node_availability("n1", false).unwrap();
            state.mark_node_availability("n1", true).unwrap();
        }
        let after = scorer.compute_node_score(&state, "n1");
        assert!(after < before);
    }
}
