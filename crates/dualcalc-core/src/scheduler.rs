//! Tick Scheduler: paces ticks and concatenates their records into one
//! ordered stream.
use crate::data_model::{StreamMode, TickRecord};
use crate::dispatcher::DualDispatcher;
use crate::error::CalcError;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

pub struct TickScheduler {
    dispatcher: Arc<DualDispatcher>,
    interval: Duration,
}

impl TickScheduler {
    /// An interval below 1 ms is raised to 1 ms.
    pub fn new(dispatcher: Arc<DualDispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Lazily produce the records of ticks `1..=count`.
    ///
    /// Tick `i + 1` starts its delay only after every record of tick `i` has
    /// been yielded, so records never interleave across ticks. The stream
    /// ends after the first fatal error.
    pub fn run(
        &self,
        count: u64,
        mode: StreamMode,
    ) -> BoxStream<'static, Result<TickRecord, CalcError>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let interval = self.interval;

        stream::iter(1..=count)
            .then(move |tick| async move {
                tokio::time::sleep(interval).await;
                tick
            })
            .flat_map(move |tick| Arc::clone(&dispatcher).dispatch(tick, mode))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed()
    }
}
