//! Inter-cluster latency matrix, loaded once from an external YAML descriptor.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use dt_errors::{DtError, DtResult};
use serde::{Deserialize, Serialize};

/// One row of the external latency-matrix descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMatrixEntry {
    pub cluster_a: String,
    pub cluster_b: String,
    pub latency_ms: f64,
}

/// Immutable symmetric latency matrix between clusters.
pub struct ClusterManager {
    matrix: HashMap<(String, String), f64>,
    clusters: HashSet<String>,
}

fn key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl ClusterManager {
    /// Build directly from entries (used by tests and by `from_path`).
    pub fn from_entries(entries: Vec<LatencyMatrixEntry>) -> DtResult<Self> {
        if entries.is_empty() {
            return Err(DtError::ConfigError("latency matrix has no entries".to_string()));
        }
        let mut matrix = HashMap::new();
        let mut clusters = HashSet::new();
        for entry in entries {
            if entry.latency_ms < 0.0 {
                return Err(DtError::ConfigError(format!(
                    "negative latency between {} and {}",
                    entry.cluster_a, entry.cluster_b
                )));
            }
            clusters.insert(entry.cluster_a.clone());
            clusters.insert(entry.cluster_b.clone());
            matrix.insert(key(&entry.cluster_a, &entry.cluster_b), entry.latency_ms);
        }
        Ok(Self { matrix, clusters })
    }

    /// Load the descriptor from a YAML file: a flat list of
    /// `{cluster_a, cluster_b, latency_ms}` entries.
    pub fn from_path(path: impl AsRef<Path>) -> DtResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DtError::ConfigError(format!("reading {}: {e}", path.display())))?;
        let entries: Vec<LatencyMatrixEntry> = serde_yaml::from_str(&contents)
            .map_err(|e| DtError::ConfigError(format!("parsing {}: {e}", path.display())))?;
        Self::from_entries(entries)
    }

    /// Never fails: unknown clusters degrade to 0.0 latency.
    pub fn get_latency_between(
        &self,
        cluster_a: &str,
        cluster_b: &str,
        _node_a: Option<&str>,
        _node_b: Option<&str>,
    ) -> f64 {
        if cluster_a == cluster_b {
            return *self.matrix.get(&key(cluster_a, cluster_b)).unwrap_or(&0.0);
        }
        if !self.clusters.contains(cluster_a) || !self.clusters.contains(cluster_b) {
            tracing::debug!(cluster_a, cluster_b, "unknown cluster in latency lookup, degrading to 0.0");
            return 0.0;
        }
        *self.matrix.get(&key(cluster_a, cluster_b)).unwrap_or(&0.0)
    }

    pub fn clusters(&self) -> HashSet<String> {
        self.clusters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterManager {
        ClusterManager::from_entries(vec![
            LatencyMatrixEntry {
                cluster_a: "dc-core".to_string(),
                cluster_b: "edge-microdc".to_string(),
                latency_ms: 40.0,
            },
            LatencyMatrixEntry {
                cluster_a: "dc-core".to_string(),
                cluster_b: "dc-core".to_string(),
                latency_ms: 1.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn latency_is_symmetric() {
        let cm = sample();
        assert_eq!(
            cm.get_latency_between("dc-core", "edge-microdc", None, None),
            cm.get_latency_between("edge-microdc", "dc-core", None, None)
        );
        assert_eq!(cm.get_latency_between("dc-core", "edge-microdc", None, None), 40.0);
    }

    #[test]
    fn unknown_cluster_degrades_to_zero() {
        let cm = sample();
        assert_eq!(cm.get_latency_between("dc-core", "ghost-cluster", None, None), 0.0);
    }

    #[test]
    fn empty_descriptor_is_config_error() {
        let err = ClusterManager::from_entries(vec![]).unwrap_err();
        assert!(matches!(err, DtError::ConfigError(_)));
    }

    #[test]
    fn loads_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency-matrix.yaml");
        std::fs::write(
            &path,
            "- cluster_a: dc-core\n  cluster_b: edge-microdc\n  latency_ms: 40.0\n",
        )
        .unwrap();
        let cm = ClusterManager::from_path(&path).unwrap();
        assert_eq!(cm.get_latency_between("dc-core", "edge-microdc", None, None), 40.0);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ClusterManager::from_path("/nonexistent/path.yaml").unwrap_err();
        assert!(matches!(err, DtError::ConfigError(_)));
    }
}
