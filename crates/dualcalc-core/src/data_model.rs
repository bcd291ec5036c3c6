//! Data Model: FunctionSpec, ExecutionOutcome, TickRecord
use crate::dialect::{self, Dialect};
use crate::error::{ExecutionError, FailureKind};
use crate::runner::sanitize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two configured function positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::First, Slot::Second];

    /// 1-based number used on the wire.
    pub fn number(&self) -> u8 {
        match self {
            Slot::First => 1,
            Slot::Second => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Output discipline of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// One combined record per tick, once both functions finished.
    Paired,
    /// One record per function, emitted as soon as it is ready.
    Interleaved,
}

impl StreamMode {
    pub fn from_ordered(ordered: bool) -> Self {
        if ordered {
            StreamMode::Paired
        } else {
            StreamMode::Interleaved
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Paired => "paired",
            StreamMode::Interleaved => "interleaved",
        }
    }
}

/// Source text of one configured function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionSpec {
    source: String,
}

impl FunctionSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Dialect is inferred at dispatch time, never cached.
    pub fn dialect(&self) -> Dialect {
        dialect::detect(&self.source)
    }
}

/// The two functions a stream evaluates on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionPair {
    pub first: FunctionSpec,
    pub second: FunctionSpec,
}

impl FunctionPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: FunctionSpec::new(first),
            second: FunctionSpec::new(second),
        }
    }

    pub fn get(&self, slot: Slot) -> &FunctionSpec {
        match slot {
            Slot::First => &self.first,
            Slot::Second => &self.second,
        }
    }
}

/// Result of evaluating one function on one input.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success { value: f64, elapsed_ms: u64 },
    /// `message` never contains CR or LF.
    Failure { kind: FailureKind, message: String },
}

impl ExecutionOutcome {
    pub fn success(value: f64, elapsed_ms: u64) -> Self {
        Self::Success { value, elapsed_ms }
    }

    pub fn failure(err: ExecutionError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: sanitize(&err.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            Self::Success { .. } => None,
        }
    }
}

impl From<Result<(f64, u64), ExecutionError>> for ExecutionOutcome {
    fn from(result: Result<(f64, u64), ExecutionError>) -> Self {
        match result {
            Ok((value, elapsed_ms)) => Self::success(value, elapsed_ms),
            Err(err) => Self::failure(err),
        }
    }
}

/// One slot's contribution to a paired record.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotReport {
    pub outcome: ExecutionOutcome,
    /// Other invocations of this slot still in flight at emission time.
    pub buffered: usize,
}

/// The unit of output.
#[derive(Debug, Clone, PartialEq)]
pub enum TickRecord {
    Paired {
        tick: u64,
        first: SlotReport,
        second: SlotReport,
    },
    Interleaved {
        tick: u64,
        slot: Slot,
        outcome: ExecutionOutcome,
    },
}

impl TickRecord {
    pub fn tick(&self) -> u64 {
        match self {
            Self::Paired { tick, .. } | Self::Interleaved { tick, .. } => *tick,
        }
    }

    /// Slot whose failure this record reports, if any. Slot 1 is checked
    /// before slot 2.
    pub fn failed_slot(&self) -> Option<Slot> {
        match self {
            Self::Paired { first, second, .. } => {
                if first.outcome.is_failure() {
                    Some(Slot::First)
                } else if second.outcome.is_failure() {
                    Some(Slot::Second)
                } else {
                    None
                }
            }
            Self::Interleaved { slot, outcome, .. } => outcome.is_failure().then_some(*slot),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failed_slot().is_some()
    }
}

fn write_error(f: &mut fmt::Formatter<'_>, tick: u64, slot: Slot, message: &str) -> fmt::Result {
    write!(f, "{},{},error: {}", tick, slot, message)
}

/// Renders the single CSV line sent to clients.
impl fmt::Display for TickRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paired { tick, first, second } => match (&first.outcome, &second.outcome) {
                (ExecutionOutcome::Failure { message, .. }, _) => {
                    write_error(f, *tick, Slot::First, message)
                }
                (_, ExecutionOutcome::Failure { message, .. }) => {
                    write_error(f, *tick, Slot::Second, message)
                }
                (
                    ExecutionOutcome::Success { value: v1, elapsed_ms: ms1 },
                    ExecutionOutcome::Success { value: v2, elapsed_ms: ms2 },
                ) => write!(
                    f,
                    "{},{:.6},{},{},{:.6},{},{}",
                    tick, v1, ms1, first.buffered, v2, ms2, second.buffered
                ),
            },
            Self::Interleaved { tick, slot, outcome } => match outcome {
                ExecutionOutcome::Success { value, elapsed_ms } => {
                    write!(f, "{},{},{:.6},{}", tick, slot, value, elapsed_ms)
                }
                ExecutionOutcome::Failure { message, .. } => write_error(f, *tick, *slot, message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(value: f64, elapsed_ms: u64, buffered: usize) -> SlotReport {
        SlotReport {
            outcome: ExecutionOutcome::success(value, elapsed_ms),
            buffered,
        }
    }

    fn failed(message: &str) -> SlotReport {
        SlotReport {
            outcome: ExecutionOutcome::failure(ExecutionError::Evaluation {
                dialect: Dialect::FunctionLiteral,
                message: message.to_string(),
            }),
            buffered: 0,
        }
    }

    #[test]
    fn test_paired_success_line() {
        let record = TickRecord::Paired {
            tick: 3,
            first: ok(4.0, 12, 0),
            second: ok(0.5, 7, 2),
        };
        assert_eq!(record.to_string(), "3,4.000000,12,0,0.500000,7,2");
        assert!(!record.is_failure());
    }

    #[test]
    fn test_paired_error_names_first_failing_slot() {
        let record = TickRecord::Paired {
            tick: 1,
            first: failed("one"),
            second: failed("two"),
        };
        assert_eq!(record.to_string(), "1,1,error: JS error: one");
        assert_eq!(record.failed_slot(), Some(Slot::First));

        let record = TickRecord::Paired {
            tick: 2,
            first: ok(1.0, 1, 0),
            second: failed("two"),
        };
        assert_eq!(record.to_string(), "2,2,error: JS error: two");
    }

    #[test]
    fn test_interleaved_lines() {
        let record = TickRecord::Interleaved {
            tick: 5,
            slot: Slot::Second,
            outcome: ExecutionOutcome::success(-1.25, 3),
        };
        assert_eq!(record.to_string(), "5,2,-1.250000,3");

        let record = TickRecord::Interleaved {
            tick: 5,
            slot: Slot::First,
            outcome: ExecutionOutcome::failure(ExecutionError::Timeout {
                dialect: Dialect::Definition,
                limit_ms: 2000,
            }),
        };
        assert_eq!(record.to_string(), "5,1,error: Python timeout > 2000 ms");
    }

    #[test]
    fn test_failure_message_is_single_line() {
        let record = TickRecord::Interleaved {
            tick: 1,
            slot: Slot::First,
            outcome: failed("bad\r\nmessage\nhere").outcome,
        };
        let line = record.to_string();
        assert_eq!(line, "1,1,error: JS error: bad message here");
    }

    #[test]
    fn test_mode_from_ordered_flag() {
        assert_eq!(StreamMode::from_ordered(true), StreamMode::Paired);
        assert_eq!(StreamMode::from_ordered(false), StreamMode::Interleaved);
    }
}
