//! Dualcalc Core: tick scheduler, dual-function dispatch and sandboxed
//! function execution.
//!
//! ```text
//! TickScheduler ──tick i──► DualDispatcher ──► Runner (slot 1) ─┐
//!      ▲                          │        └─► Runner (slot 2) ─┤
//!      │                          ▼                             │
//!      └──── ordered stream ◄── TickRecord ◄────────────────────┘
//! ```

pub mod config;
pub mod data_model;
pub mod dialect;
pub mod dispatcher;
pub mod error;
pub mod runner;
pub mod scheduler;
pub mod service;

pub use config::CalcConfig;
pub use data_model::{
    ExecutionOutcome, FunctionPair, FunctionSpec, Slot, SlotReport, StreamMode, TickRecord,
};
pub use dialect::{detect, Dialect};
pub use dispatcher::{DualDispatcher, InFlight, InFlightGuard};
pub use error::{CalcError, ExecutionError, FailureKind};
pub use runner::{sanitize, Runner, RunnerSettings, SandboxRunner};
pub use scheduler::TickScheduler;
pub use service::CalculationService;

/// Engine version reported by transports.
pub const DUALCALC_VERSION: &str = env!("CARGO_PKG_VERSION");
