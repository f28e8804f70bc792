//! Canned cluster topology for local runs and integration tests: one
//! GPU-bearing and one CPU-only node in `dc-core`, one ARM node in
//! `edge-microdc`.

use dt_state::{HardwareProfile, K8sAllocatable, Node, StateStore, Telemetry};

pub fn seed_demo_topology(state: &StateStore) {
    state.register_cluster("dc-core");
    state.register_cluster("edge-microdc");

    state.register_node(
        Node::new(
            "dc-core-gpu-01",
            HardwareProfile {
                cpu_cores: 32,
                memory_gb: 128,
                gpu_vram_gb: 24,
                arch: "amd64".to_string(),
            },
            K8sAllocatable {
                allocatable_cpu: 28,
                allocatable_mem_gb: 112,
            },
            Telemetry {
                cpu_util: 35.0,
                mem_util: 40.0,
            },
        ),
        "dc-core",
    );

    state.register_node(
        Node::new(
            "dc-core-cpu-02",
            HardwareProfile {
                cpu_cores: 16,
                memory_gb: 64,
                gpu_vram_gb: 0,
                arch: "amd64".to_string(),
            },
            K8sAllocatable {
                allocatable_cpu: 14,
                allocatable_mem_gb: 56,
            },
            Telemetry {
                cpu_util: 20.0,
                mem_util: 25.0,
            },
        ),
        "dc-core",
    );

    state.register_node(
        Node::new(
            "edge-01",
            HardwareProfile {
                cpu_cores: 4,
                memory_gb: 8,
                gpu_vram_gb: 0,
                arch: "arm64".to_string(),
            },
            K8sAllocatable {
                allocatable_cpu: 4,
                allocatable_mem_gb: 8,
            },
            Telemetry {
                cpu_util: 15.0,
                mem_util: 20.0,
            },
        ),
        "edge-microdc",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_three_nodes_across_two_clusters() {
        let state = StateStore::new();
        seed_demo_topology(&state);
        assert_eq!(state.list_nodes().len(), 3);
        assert_eq!(state.clusters().len(), 2);
    }
}
