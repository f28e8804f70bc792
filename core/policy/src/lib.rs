//! Placement policies: the common contract plus the three concrete
//! strategies (greedy, resilient, CVaR) and the adaptive selector.

pub mod cvar;
pub mod greedy;
pub mod resilient;
pub mod selector;

use std::collections::HashMap;
use std::sync::Arc;

use dt_state::{Job, JobStage, Node, PlacementDecision, StateStore};

pub use cvar::RiskAwareCvarPolicy;
pub use greedy::GreedyLatencyPolicy;
pub use resilient::ResilientPolicy;
pub use selector::PolicySelector;

/// Common contract every placement strategy implements.
///
/// The hard-resource-gate question the source left implicit is surfaced
/// here as an explicit, inspectable flag rather than a hidden branch.
pub trait Policy: Send + Sync {
    fn place(&self, job: &Job) -> HashMap<String, PlacementDecision>;

    fn enforces_hard_resource_gate(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Candidate nodes for a stage: available, and meeting the GPU requirement
/// (if any). Callers apply their own hard-resource gate on top when
/// `enforces_hard_resource_gate()` is true.
pub(crate) fn base_candidate_nodes(state: &StateStore, stage: &JobStage) -> Vec<Node> {
    state
        .list_nodes()
        .into_iter()
        .filter(|node| node.available)
        .filter(|node| stage.compute.gpu_vram_gb == 0 || node.hardware.gpu_vram_gb >= stage.compute.gpu_vram_gb)
        .collect()
}

pub(crate) fn hard_resource_fit(stage: &JobStage, node: &Node) -> bool {
    node.k8s.allocatable_cpu >= stage.compute.cpu && node.k8s.allocatable_mem_gb >= stage.compute.mem_gb
}

/// Shared helper: derive origin latency for a stage with no predecessor.
pub(crate) fn origin_latency(
    state: &StateStore,
    cluster_manager: Option<&Arc<dt_cluster_manager::ClusterManager>>,
    job: &Job,
    node: &Node,
) -> f64 {
    let Some(origin) = &job.origin else {
        return 0.0;
    };
    let Some(cluster_manager) = cluster_manager else {
        return 0.0;
    };
    let Some(candidate_cluster) = state.get_cluster(&node.name) else {
        return 0.0;
    };
    cluster_manager.get_latency_between(&origin.cluster, &candidate_cluster, origin.node.as_deref(), Some(&node.name))
}
