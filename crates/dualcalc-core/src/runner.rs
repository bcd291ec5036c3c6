//! Function Runner: evaluates one function on one input inside a sandbox
//! bounded by a wall-clock timeout.
//!
//! Two back ends, picked by [`Dialect`]:
//!
//! ```text
//! FunctionLiteral ──► literal pool (bounded) ──► fresh JS context per call
//! Definition      ──► child process (python3 → python) ──► stdout / stderr readers
//! ```
//!
//! Whatever the user code does, the caller gets an [`ExecutionOutcome`].
//! Only a pool that refuses work is reported as a [`CalcError`].
mod literal;
mod process;

use crate::config::CalcConfig;
use crate::data_model::{ExecutionOutcome, FunctionSpec};
use crate::dialect::Dialect;
use crate::error::CalcError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Wall-clock budget of a single invocation, whatever its dialect.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Parallel in-process evaluations allowed at once.
pub const DEFAULT_LITERAL_WORKERS: usize = 4;

lazy_static! {
    static ref LINE_BREAKS: Regex = Regex::new(r"[\r\n]+").unwrap();
}

/// Collapse every run of CR/LF into a single space.
pub fn sanitize(message: &str) -> String {
    LINE_BREAKS.replace_all(message, " ").into_owned()
}

/// Evaluates function specs. The dispatcher only sees this seam.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, spec: &FunctionSpec, input: i64) -> Result<ExecutionOutcome, CalcError>;
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub timeout: Duration,
    pub literal_workers: usize,
    pub interpreters: Vec<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            literal_workers: DEFAULT_LITERAL_WORKERS,
            interpreters: vec!["python3".to_string(), "python".to_string()],
        }
    }
}

impl From<&CalcConfig> for RunnerSettings {
    fn from(config: &CalcConfig) -> Self {
        Self {
            timeout: config.timeout(),
            literal_workers: config.literal_workers(),
            interpreters: config.interpreters.clone(),
        }
    }
}

/// The production runner.
pub struct SandboxRunner {
    timeout: Duration,
    literal_pool: Arc<Semaphore>,
    interpreters: Vec<String>,
}

impl SandboxRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self {
            timeout: settings.timeout,
            literal_pool: Arc::new(Semaphore::new(settings.literal_workers.max(1))),
            interpreters: settings.interpreters,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run_dialect(
        &self,
        dialect: Dialect,
        source: &str,
        input: i64,
    ) -> Result<ExecutionOutcome, CalcError> {
        let outcome: ExecutionOutcome = match dialect {
            Dialect::FunctionLiteral => {
                literal::run(&self.literal_pool, self.timeout, source, input).await?
            }
            Dialect::Definition => {
                process::run(&self.interpreters, self.timeout, source, input).await
            }
        }
        .into();

        match &outcome {
            ExecutionOutcome::Success { value, elapsed_ms } => {
                debug!(%dialect, input, value, elapsed_ms, "function evaluated");
            }
            ExecutionOutcome::Failure { kind, message } => {
                debug!(%dialect, input, ?kind, %message, "function failed");
            }
        }
        Ok(outcome)
    }

    /// Refuse further literal evaluations. In-flight ones finish normally.
    pub fn shutdown(&self) {
        self.literal_pool.close();
    }
}

impl Default for SandboxRunner {
    fn default() -> Self {
        Self::new(RunnerSettings::default())
    }
}

#[async_trait]
impl Runner for SandboxRunner {
    async fn run(&self, spec: &FunctionSpec, input: i64) -> Result<ExecutionOutcome, CalcError> {
        self.run_dialect(spec.dialect(), spec.source(), input).await
    }
}
