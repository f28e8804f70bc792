//! Digital Twin cluster state model.
//!
//! Typed cluster/node/telemetry model, job ledger, and observed metrics. The
//! `StateStore` is the single owner of all mutable state; policies and the
//! simulator only ever see snapshots or `Arc`-shared read access.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dt_errors::{DtError, DtResult};
use serde::{Deserialize, Serialize};

/// Recovers the guard from a poisoned lock instead of panicking: a writer
/// that panicked mid-mutation still leaves the `HashMap` in a usable (if
/// possibly partial) state, and this store has no invariant that a single
/// poisoned write need invalidate every future reader.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Hardware profile of a node: physical capacity, not allocatable capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub gpu_vram_gb: u32,
    pub arch: String,
}

/// Kubernetes-reported allocatable capacity (must be <= hardware capacity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct K8sAllocatable {
    pub allocatable_cpu: u32,
    pub allocatable_mem_gb: u32,
}

/// Live telemetry, both fields in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub cpu_util: f64,
    pub mem_util: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub hardware: HardwareProfile,
    pub k8s: K8sAllocatable,
    pub tel: Telemetry,
    pub available: bool,
    /// Count of `mark_node_availability` toggles observed so far; feeds the
    /// resiliency scorer's history term. Internal bookkeeping, not part of the
    /// wire schema for node registration.
    #[serde(default)]
    pub flap_count: u32,
}

impl Node {
    pub fn new(name: impl Into<String>, hardware: HardwareProfile, k8s: K8sAllocatable, tel: Telemetry) -> Self {
        Self {
            name: name.into(),
            hardware,
            k8s,
            tel,
            available: true,
            flap_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub nodes: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    CpuBound,
    MemBound,
    GpuBound,
    IoBound,
}

impl Default for WorkloadType {
    fn default() -> Self {
        WorkloadType::CpuBound
    }
}

impl std::str::FromStr for WorkloadType {
    type Err = DtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu_bound" => Ok(WorkloadType::CpuBound),
            "mem_bound" => Ok(WorkloadType::MemBound),
            "gpu_bound" => Ok(WorkloadType::GpuBound),
            "io_bound" => Ok(WorkloadType::IoBound),
            other => Err(DtError::BadJobSpec(format!("unknown workload_type: {other}"))),
        }
    }
}

impl WorkloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadType::CpuBound => "cpu_bound",
            WorkloadType::MemBound => "mem_bound",
            WorkloadType::GpuBound => "gpu_bound",
            WorkloadType::IoBound => "io_bound",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompute {
    pub cpu: u32,
    pub mem_gb: u32,
    pub duration_ms: u64,
    #[serde(default)]
    pub gpu_vram_gb: u32,
    #[serde(default)]
    pub workload_type: WorkloadType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConstraints {
    pub arch: Vec<String>,
    pub formats: Vec<String>,
    #[serde(default)]
    pub data_locality: Option<String>,
    #[serde(default)]
    pub max_latency_to_predecessor_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStage {
    pub id: String,
    pub compute: StageCompute,
    pub constraints: StageConstraints,
    #[serde(default)]
    pub predecessor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOrigin {
    pub cluster: String,
    #[serde(default)]
    pub node: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub deadline_ms: u64,
    pub stages: Vec<JobStage>,
    #[serde(default)]
    pub origin: Option<JobOrigin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub stage_id: String,
    pub node_name: String,
    pub exec_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub job_name: String,
    pub placements: HashMap<String, PlacementDecision>,
    pub latency_ms: f64,
    pub energy_kwh: f64,
    pub risk_score: f64,
    pub shadow_plan: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedMetrics {
    pub plan_id: String,
    pub latency_ms: f64,
    pub cpu_util: f64,
    pub mem_peak_gb: f64,
    pub energy_kwh: f64,
    pub completed_at: i64,
}

/// The state store: exclusive owner of nodes, clusters, jobs, plans, and
/// observed metrics. Each entity map guards itself with its own `RwLock` so
/// writers only ever serialise against readers/writers of the same entity.
#[derive(Default)]
pub struct StateStore {
    nodes: RwLock<HashMap<String, Node>>,
    node_cluster: RwLock<HashMap<String, String>>,
    clusters: RwLock<HashMap<String, Cluster>>,
    jobs: RwLock<HashMap<String, Job>>,
    plans: RwLock<HashMap<String, Plan>>,
    observed: RwLock<HashMap<String, ObservedMetrics>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_cluster(&self, cluster_id: impl Into<String>) {
        let id = cluster_id.into();
        let mut clusters = write_lock(&self.clusters);
        clusters.entry(id.clone()).or_insert_with(|| Cluster {
            id,
            nodes: HashSet::new(),
        });
    }

    pub fn register_node(&self, node: Node, cluster_id: &str) {
        self.register_cluster(cluster_id);
        {
            let mut clusters = write_lock(&self.clusters);
            if let Some(cluster) = clusters.get_mut(cluster_id) {
                cluster.nodes.insert(node.name.clone());
            }
        }
        write_lock(&self.node_cluster).insert(node.name.clone(), cluster_id.to_string());
        tracing::info!(node = %node.name, cluster = %cluster_id, "registering node");
        write_lock(&self.nodes).insert(node.name.clone(), node);
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        read_lock(&self.nodes).values().cloned().collect()
    }

    pub fn get_node(&self, name: &str) -> Option<Node> {
        read_lock(&self.nodes).get(name).cloned()
    }

    pub fn get_cluster(&self, node_name: &str) -> Option<String> {
        read_lock(&self.node_cluster).get(node_name).cloned()
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        read_lock(&self.clusters).values().cloned().collect()
    }

    pub fn mark_node_availability(&self, name: &str, available: bool) -> DtResult<()> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|e| DtError::Internal(format!("lock poisoned: {e}")))?;
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| DtError::NotFound(name.to_string()))?;
        node.available = available;
        node.flap_count = node.flap_count.saturating_add(1);
        tracing::info!(node = %name, available, "availability toggled");
        Ok(())
    }

    pub fn add_job(&self, job: Job) {
        write_lock(&self.jobs).insert(job.name.clone(), job);
    }

    pub fn get_job(&self, name: &str) -> Option<Job> {
        read_lock(&self.jobs).get(name).cloned()
    }

    pub fn store_plan(&self, plan: Plan) {
        write_lock(&self.plans).insert(plan.plan_id.clone(), plan);
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        read_lock(&self.plans).get(plan_id).cloned()
    }

    pub fn record_observed(&self, plan_id: &str, metrics: ObservedMetrics) -> DtResult<()> {
        let mut observed = self
            .observed
            .write()
            .map_err(|e| DtError::Internal(format!("lock poisoned: {e}")))?;
        if observed.contains_key(plan_id) {
            return Err(DtError::AlreadyExists(plan_id.to_string()));
        }
        observed.insert(plan_id.to_string(), metrics);
        Ok(())
    }

    pub fn get_observed(&self, plan_id: &str) -> Option<ObservedMetrics> {
        read_lock(&self.observed).get(plan_id).cloned()
    }

    /// Diagnostic only; schema is intentionally opaque (see DESIGN.md).
    pub fn describe_virtual_topology(&self) -> serde_json::Value {
        let clusters = read_lock(&self.clusters);
        let mut out = serde_json::Map::new();
        for cluster in clusters.values() {
            let mut nodes: Vec<&str> = cluster.nodes.iter().map(String::as_str).collect();
            nodes.sort_unstable();
            out.insert(cluster.id.clone(), serde_json::json!(nodes));
        }
        serde_json::json!({ "clusters": out })
    }

    /// Deep-copy snapshot for chaos runs; mutating the clone never affects
    /// the original store.
    pub fn clone_for_simulation(&self) -> StateStore {
        StateStore {
            nodes: RwLock::new(read_lock(&self.nodes).clone()),
            node_cluster: RwLock::new(read_lock(&self.node_cluster).clone()),
            clusters: RwLock::new(read_lock(&self.clusters).clone()),
            jobs: RwLock::new(read_lock(&self.jobs).clone()),
            plans: RwLock::new(read_lock(&self.plans).clone()),
            observed: RwLock::new(read_lock(&self.observed).clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(name: &str) -> Node {
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

    #[test]
    fn register_and_list_nodes() {
        let store = StateStore::new();
        store.register_node(sample_node("n1"), "dc-core");
        assert_eq!(store.list_nodes().len(), 1);
        assert_eq!(store.get_cluster("n1").as_deref(), Some("dc-core"));
    }

    #[test]
    fn mark_availability_unknown_node_fails() {
        let store = StateStore::new();
        let err = store.mark_node_availability("ghost", false).unwrap_err();
        assert_eq!(err, DtError::NotFound("ghost".to_string()));
    }

    #[test]
    fn mark_availability_flips_and_increments_flap_count() {
        let store = StateStore::new();
        store.register_node(sample_node("n1"), "dc-core");
        store.mark_node_availability("n1", false).unwrap();
        let node = store.get_node("n1").unwrap();
        assert!(!node.available);
        assert_eq!(node.flap_count, 1);
    }

    #[test]
    fn record_observed_is_at_most_once() {
        let store = StateStore::new();
        let metrics = ObservedMetrics {
            plan_id: "plan-1".to_string(),
            latency_ms: 10.0,
            cpu_util: 0.5,
            mem_peak_gb: 1.0,
            energy_kwh: 0.01,
            completed_at: 1000,
        };
        store.record_observed("plan-1", metrics.clone()).unwrap();
        let err = store.record_observed("plan-1", metrics.clone()).unwrap_err();
        assert_eq!(err, DtError::AlreadyExists("plan-1".to_string()));
        assert_eq!(store.get_observed("plan-1").unwrap(), metrics);
    }

    #[test]
    fn clone_for_simulation_is_independent() {
        let store = StateStore::new();
        store.register_node(sample_node("n1"), "dc-core");
        let clone = store.clone_for_simulation();
        clone.mark_node_availability("n1", false).unwrap();
        assert!(store.get_node("n1").unwrap().available);
        assert!(!clone.get_node("n1").unwrap().available);
    }
}
