//! Shared error taxonomy for the Digital Twin scheduler core.
//!
//! Every core crate returns `DtResult<T>`; binaries are the only place these get
//! converted into process exit codes or RPC statuses.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DtError {
    #[error("bad job spec: {0}")]
    BadJobSpec(String),

    #[error("no feasible placement for stages: {0:?}")]
    NoFeasiblePlacement(Vec<String>),

    #[error("no feasible exec format for stage {0}")]
    NoFeasibleFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("plan computation timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type DtResult<T> = Result<T, DtError>;
