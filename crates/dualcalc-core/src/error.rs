//! Unified Error Model
use crate::dialect::Dialect;
use thiserror::Error;

/// Conditions that stop the service from making progress.
///
/// These are the only errors that ever leave a stream as `Err`; everything
/// that goes wrong inside a user function is an [`ExecutionError`] and is
/// folded into the record instead.
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("POOL/{0}")]
    PoolUnavailable(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),
}

/// Why a single function invocation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{dialect} error: {message}")]
    Evaluation { dialect: Dialect, message: String },

    #[error("{dialect} result is not numeric: {raw}")]
    Coercion { dialect: Dialect, raw: String },

    #[error("{dialect} timeout > {limit_ms} ms")]
    Timeout { dialect: Dialect, limit_ms: u64 },

    #[error("{dialect} run failed: no usable interpreter ({tried})")]
    ProcessLaunch { dialect: Dialect, tried: String },

    #[error("{dialect} error: {detail}")]
    ProcessFailure { dialect: Dialect, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Evaluation,
    Coercion,
    Timeout,
    ProcessLaunch,
    ProcessFailure,
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Evaluation { .. } => FailureKind::Evaluation,
            Self::Coercion { .. } => FailureKind::Coercion,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ProcessLaunch { .. } => FailureKind::ProcessLaunch,
            Self::ProcessFailure { .. } => FailureKind::ProcessFailure,
        }
    }
}
