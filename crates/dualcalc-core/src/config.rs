//! Service configuration, read once at startup.
use crate::data_model::FunctionPair;
use crate::error::CalcError;
use crate::runner::{DEFAULT_LITERAL_WORKERS, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Contents of `config.json`.
///
/// ```json
/// { "function1": "x => x * x", "function2": "lambda x: x + 1", "interval": 500 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcConfig {
    /// Source of the slot 1 function.
    #[serde(default)]
    pub function1: String,
    /// Source of the slot 2 function.
    #[serde(default)]
    pub function2: String,
    /// Milliseconds between tick starts; values below 1 mean 1.
    #[serde(default)]
    pub interval: i64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_literal_workers")]
    pub literal_workers: usize,
    /// Interpreter binaries for definitions, tried in order.
    #[serde(default = "default_interpreters")]
    pub interpreters: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_literal_workers() -> usize {
    DEFAULT_LITERAL_WORKERS
}

fn default_interpreters() -> Vec<String> {
    vec!["python3".to_string(), "python".to_string()]
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            function1: String::new(),
            function2: String::new(),
            interval: 0,
            timeout_ms: default_timeout_ms(),
            literal_workers: default_literal_workers(),
            interpreters: default_interpreters(),
        }
    }
}

impl CalcConfig {
    pub fn new(function1: impl Into<String>, function2: impl Into<String>, interval: i64) -> Self {
        Self {
            function1: function1.into(),
            function2: function2.into(),
            interval,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, CalcError> {
        serde_json::from_str(text).map_err(|e| CalcError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalcError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CalcError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval.max(1) as u64)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn literal_workers(&self) -> usize {
        self.literal_workers.max(1)
    }

    pub fn functions(&self) -> FunctionPair {
        FunctionPair::new(self.function1.clone(), self.function2.clone())
    }
}
