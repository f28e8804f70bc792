//! Environment-driven configuration for the scheduler binary.

use std::env;
use std::net::SocketAddr;

const DEFAULT_LATENCY_MATRIX_PATH: &str = "deploy/latency-matrix.yaml";

#[derive(Debug, Clone)]
pub struct Config {
    pub grpc_addr: SocketAddr,
    pub latency_matrix_path: String,
    /// Mirrors the original `DT_AUTO_WATCHERS` toggle: when set, the binary
    /// starts a lightweight background heartbeat standing in for the
    /// resource-report watchers a real actuator fleet would drive.
    pub auto_watchers: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let grpc_addr = env::var("DT_GRPC_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:50051".parse().unwrap());

        let latency_matrix_path =
            env::var("LATENCY_MATRIX_PATH").unwrap_or_else(|_| DEFAULT_LATENCY_MATRIX_PATH.to_string());

        let auto_watchers = env::var("DT_AUTO_WATCHERS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            grpc_addr,
            latency_matrix_path,
            auto_watchers,
        }
    }
}
