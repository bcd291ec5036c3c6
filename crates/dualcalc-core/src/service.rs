//! Calculation Service: the stream surface handed to transports.
use crate::config::CalcConfig;
use crate::data_model::{StreamMode, TickRecord};
use crate::dispatcher::{DualDispatcher, InFlight};
use crate::error::CalcError;
use crate::runner::{Runner, RunnerSettings, SandboxRunner};
use crate::scheduler::TickScheduler;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns the runner, the in-flight counters and the scheduler for the
/// lifetime of the process. Streams opened concurrently share counters.
pub struct CalculationService {
    scheduler: TickScheduler,
}

impl CalculationService {
    pub fn new(config: &CalcConfig) -> Self {
        let runner = Arc::new(SandboxRunner::new(RunnerSettings::from(config)));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: &CalcConfig, runner: Arc<dyn Runner>) -> Self {
        let dispatcher = Arc::new(DualDispatcher::new(
            runner,
            config.functions(),
            Arc::new(InFlight::new()),
        ));
        Self {
            scheduler: TickScheduler::new(dispatcher, config.interval()),
        }
    }

    /// Typed records of `count` ticks.
    pub fn stream_ticks(
        &self,
        count: u64,
        mode: StreamMode,
    ) -> BoxStream<'static, Result<TickRecord, CalcError>> {
        let stream_id = Uuid::new_v4();
        info!(%stream_id, count, mode = mode.as_str(), "stream opened");

        let emitted = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&emitted);
        let records = self.scheduler.run(count, mode).inspect(move |item| match item {
            Ok(_) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => warn!(%stream_id, error = %err, "stream aborted"),
        });

        let closing = futures::stream::once(async move {
            info!(%stream_id, records = emitted.load(Ordering::Relaxed), "stream finished");
        })
        .filter_map(|()| async { None::<Result<TickRecord, CalcError>> });

        records.chain(closing).boxed()
    }

    /// Rendered CSV lines of `count` ticks, one per record.
    pub fn stream_records(
        &self,
        count: u64,
        mode: StreamMode,
    ) -> BoxStream<'static, Result<String, CalcError>> {
        self.stream_ticks(count, mode)
            .map(|item| item.map(|record| record.to_string()))
            .boxed()
    }
}
