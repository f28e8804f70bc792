//! Parsing and serializing the wire job-spec schema.
//!
//! The wire shape is a Kubernetes-flavored envelope:
//! `{ metadata: { name, deadline_ms?, origin? }, spec: { stages: [...] } }`.
//! Every optional field has a default so older clients and hand-written demo
//! specs keep working.

use dt_errors::{DtError, DtResult};
use dt_state::{Job, JobOrigin, JobStage, StageCompute, StageConstraints, WorkloadType};
use serde_json::Value;
use std::str::FromStr;

fn require_str(obj: &Value, key: &str) -> DtResult<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(DtError::BadJobSpec(format!("missing required field: {key}"))),
    }
}

fn as_u32(obj: &Value, key: &str, default: u32) -> u32 {
    obj.get(key).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(default)
}

fn as_u64(obj: &Value, key: &str, default: u64) -> u64 {
    obj.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn as_string_vec(obj: &Value, key: &str, default: Vec<&str>) -> Vec<String> {
    match obj.get(key).and_then(Value::as_array) {
        Some(arr) => arr.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        None => default.into_iter().map(str::to_string).collect(),
    }
}

/// Converts an API-style job-spec JSON object into a [`Job`].
pub fn parse_job_spec(job_spec: &Value) -> DtResult<Job> {
    let Value::Object(_) = job_spec else {
        return Err(DtError::BadJobSpec("job spec must be an object".to_string()));
    };

    let empty = Value::Object(serde_json::Map::new());
    let metadata = job_spec.get("metadata").unwrap_or(&empty);
    let spec = job_spec.get("spec").unwrap_or(&empty);

    let stages_spec = spec
        .get("stages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if stages_spec.is_empty() {
        return Err(DtError::BadJobSpec("job spec must include at least one stage".to_string()));
    }

    let name = require_str(metadata, "name")?;
    let deadline_ms = as_u64(metadata, "deadline_ms", 60_000);

    let origin = match metadata.get("origin") {
        Some(origin_data) if origin_data.is_object() => Some(JobOrigin {
            cluster: origin_data
                .get("cluster")
                .and_then(Value::as_str)
                .unwrap_or("dc-core")
                .to_string(),
            node: origin_data.get("node").and_then(Value::as_str).map(str::to_string),
        }),
        _ => None,
    };

    let mut stages = Vec::with_capacity(stages_spec.len());
    for stage_spec in &stages_spec {
        let id = require_str(stage_spec, "id")?;
        let compute_spec = stage_spec.get("compute").unwrap_or(&empty);
        let constraints_spec = stage_spec.get("constraints").unwrap_or(&empty);

        let workload_type_str = compute_spec
            .get("workload_type")
            .and_then(Value::as_str)
            .unwrap_or("cpu_bound");
        let workload_type = WorkloadType::from_str(workload_type_str)?;

        let stage = JobStage {
            id,
            compute: StageCompute {
                cpu: as_u32(compute_spec, "cpu", 0),
                mem_gb: as_u32(compute_spec, "mem_gb", 0),
                duration_ms: as_u64(compute_spec, "duration_ms", 0),
                gpu_vram_gb: as_u32(compute_spec, "gpu_vram_gb", 0),
                workload_type,
            },
            constraints: StageConstraints {
                arch: as_string_vec(constraints_spec, "arch", vec!["amd64"]),
                formats: as_string_vec(constraints_spec, "formats", vec!["native"]),
                data_locality: constraints_spec
                    .get("data_locality")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                max_latency_to_predecessor_ms: constraints_spec
                    .get("max_latency_to_predecessor_ms")
                    .and_then(Value::as_f64),
            },
            predecessor: stage_spec.get("predecessor").and_then(Value::as_str).map(str::to_string),
        };
        stages.push(stage);
    }

    Ok(Job {
        name,
        deadline_ms,
        stages,
        origin,
    })
}

/// Re-serializes a [`Job`] back into the wire envelope shape. Used by the
/// `snapshot`/debug surface and by round-trip tests.
pub fn to_job_spec(job: &Job) -> Value {
    let mut metadata = serde_json::json!({
        "name": job.name,
        "deadline_ms": job.deadline_ms,
    });
    if let Some(origin) = &job.origin {
        metadata["origin"] = serde_json::json!({
            "cluster": origin.cluster,
            "node": origin.node,
        });
    }

    let stages: Vec<Value> = job
        .stages
        .iter()
        .map(|stage| {
            serde_json::json!({
                "id": stage.id,
                "compute": {
                    "cpu": stage.compute.cpu,
                    "mem_gb": stage.compute.mem_gb,
                    "duration_ms": stage.compute.duration_ms,
                    "gpu_vram_gb": stage.compute.gpu_vram_gb,
                    "workload_type": stage.compute.workload_type.as_str(),
                },
                "constraints": {
                    "arch": stage.constraints.arch,
                    "formats": stage.constraints.formats,
                    "data_locality": stage.constraints.data_locality,
                    "max_latency_to_predecessor_ms": stage.constraints.max_latency_to_predecessor_ms,
                },
                "predecessor": stage.predecessor,
            })
        })
        .collect();

    serde_json::json!({
        "metadata": metadata,
        "spec": { "stages": stages },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_job_with_defaults() {
        let spec = serde_json::json!({
            "metadata": { "name": "job-1" },
            "spec": { "stages": [{ "id": "s1" }] }
        });
        let job = parse_job_spec(&spec).unwrap();
        assert_eq!(job.name, "job-1");
        assert_eq!(job.deadline_ms, 60_000);
        assert_eq!(job.stages.len(), 1);
        assert_eq!(job.stages[0].constraints.arch, vec!["amd64".to_string()]);
        assert_eq!(job.stages[0].constraints.formats, vec!["native".to_string()]);
        assert!(job.origin.is_none());
    }

    #[test]
    fn missing_name_is_bad_job_spec() {
        let spec = serde_json::json!({
            "metadata": {},
            "spec": { "stages": [{ "id": "s1" }] }
        });
        let err = parse_job_spec(&spec).unwrap_err();
        assert!(matches!(err, DtError::BadJobSpec(_)));
    }

    #[test]
    fn empty_stages_is_bad_job_spec() {
        let spec = serde_json::json!({
            "metadata": { "name": "job-1" },
            "spec": { "stages": [] }
        });
        let err = parse_job_spec(&spec).unwrap_err();
        assert!(matches!(err, DtError::BadJobSpec(_)));
    }

    #[test]
    fn unknown_workload_type_is_bad_job_spec() {
        let spec = serde_json::json!({
            "metadata": { "name": "job-1" },
            "spec": { "stages": [{ "id": "s1", "compute": { "workload_type": "quantum_bound" } }] }
        });
        let err = parse_job_spec(&spec).unwrap_err();
        assert!(matches!(err, DtError::BadJobSpec(_)));
    }

    #[test]
    fn parses_full_job_with_origin_and_predecessor() {
        let spec = serde_json::json!({
            "metadata": {
                "name": "job-2",
                "deadline_ms": 5000,
                "origin": { "cluster": "edge-microdc", "node": "edge-01" }
            },
            "spec": {
                "stages": [
                    { "id": "ingest", "compute": { "cpu": 2, "mem_gb": 4, "duration_ms": 200 } },
                    { "id": "serve", "predecessor": "ingest", "compute": { "workload_type": "gpu_bound" } }
                ]
            }
        });
        let job = parse_job_spec(&spec).unwrap();
        assert_eq!(job.deadline_ms, 5000);
        assert_eq!(job.origin.unwrap().cluster, "edge-microdc");
        assert_eq!(job.stages[1].predecessor.as_deref(), Some("ingest"));
        assert_eq!(job.stages[1].compute.workload_type, WorkloadType::GpuBound);
    }

    #[test]
    fn round_trips_through_to_job_spec() {
        let spec = serde_json::json!({
            "metadata": { "name": "job-3", "deadline_ms": 1234 },
            "spec": { "stages": [{ "id": "s1", "compute": { "cpu": 1 } }] }
        });
        let job = parse_job_spec(&spec).unwrap();
        let re_encoded = to_job_spec(&job);
        let job_again = parse_job_spec(&re_encoded).unwrap();
        assert_eq!(job, job_again);
    }
}
