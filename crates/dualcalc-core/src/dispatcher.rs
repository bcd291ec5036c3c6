//! Dual Dispatcher: runs both slots for one tick and turns the outcomes
//! into records.
use crate::data_model::{FunctionPair, Slot, SlotReport, StreamMode, TickRecord};
use crate::error::CalcError;
use crate::runner::Runner;
use futures::stream::{self, BoxStream, FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Per-slot count of invocations started but not yet emitted.
///
/// Counts are approximate occupancy, not a synchronization primitive: they
/// are only ever touched with atomic increments and decrements.
#[derive(Debug, Default)]
pub struct InFlight {
    first: AtomicUsize,
    second: AtomicUsize,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, slot: Slot) -> &AtomicUsize {
        match slot {
            Slot::First => &self.first,
            Slot::Second => &self.second,
        }
    }

    pub fn current(&self, slot: Slot) -> usize {
        self.counter(slot).load(Ordering::SeqCst)
    }

    /// Count one invocation of `slot` until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>, slot: Slot) -> InFlightGuard {
        self.counter(slot).fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: Arc::clone(self),
            slot,
        }
    }
}

/// Decrements its slot's counter on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
    slot: Slot,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.counter(self.slot).fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct DualDispatcher {
    runner: Arc<dyn Runner>,
    functions: FunctionPair,
    in_flight: Arc<InFlight>,
}

impl DualDispatcher {
    pub fn new(runner: Arc<dyn Runner>, functions: FunctionPair, in_flight: Arc<InFlight>) -> Self {
        Self {
            runner,
            functions,
            in_flight,
        }
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Records for one tick: one when paired, two when interleaved.
    pub fn dispatch(
        self: Arc<Self>,
        tick: u64,
        mode: StreamMode,
    ) -> BoxStream<'static, Result<TickRecord, CalcError>> {
        match mode {
            StreamMode::Paired => {
                stream::once(async move { self.dispatch_paired(tick).await }).boxed()
            }
            StreamMode::Interleaved => self.dispatch_interleaved(tick),
        }
    }

    /// Run both slots to completion, then emit a single record.
    ///
    /// Neither slot short-circuits the other. If any slot failed the record
    /// reports the first failing slot; otherwise each slot's buffer is the
    /// number of its other invocations still in flight.
    pub async fn dispatch_paired(&self, tick: u64) -> Result<TickRecord, CalcError> {
        let first_guard = self.in_flight.enter(Slot::First);
        let second_guard = self.in_flight.enter(Slot::Second);
        debug!(tick, "dispatching paired tick");

        let input = tick as i64;
        let (first, second) = tokio::join!(
            self.runner.run(&self.functions.first, input),
            self.runner.run(&self.functions.second, input),
        );
        let (first, second) = (first?, second?);

        let before_first = self.in_flight.current(Slot::First);
        let before_second = self.in_flight.current(Slot::Second);
        drop(first_guard);
        drop(second_guard);

        Ok(TickRecord::Paired {
            tick,
            first: SlotReport {
                outcome: first,
                buffered: before_first.saturating_sub(1),
            },
            second: SlotReport {
                outcome: second,
                buffered: before_second.saturating_sub(1),
            },
        })
    }

    /// Run both slots independently; each record is yielded as soon as its
    /// slot completes, so the order within the tick is completion order.
    pub fn dispatch_interleaved(
        self: Arc<Self>,
        tick: u64,
    ) -> BoxStream<'static, Result<TickRecord, CalcError>> {
        debug!(tick, "dispatching interleaved tick");
        let pending: FuturesUnordered<_> = Slot::ALL
            .into_iter()
            .map(|slot| {
                let this = Arc::clone(&self);
                let guard = this.in_flight.enter(slot);
                async move {
                    let outcome = this.runner.run(this.functions.get(slot), tick as i64).await;
                    drop(guard);
                    outcome.map(|outcome| TickRecord::Interleaved {
                        tick,
                        slot,
                        outcome,
                    })
                }
            })
            .collect();
        pending.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{ExecutionOutcome, FunctionSpec};
    use crate::dialect::Dialect;
    use crate::error::ExecutionError;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers `value;delay_ms` sources without touching an engine;
    /// `fail` produces an evaluation failure.
    struct ScriptedRunner;

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            spec: &FunctionSpec,
            input: i64,
        ) -> Result<ExecutionOutcome, CalcError> {
            let mut parts = spec.source().split(';');
            let head = parts.next().unwrap_or_default();
            let delay: u64 = parts.next().and_then(|d| d.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if head == "fail" {
                return Ok(ExecutionOutcome::failure(ExecutionError::Evaluation {
                    dialect: Dialect::FunctionLiteral,
                    message: format!("failed on\n{}", input),
                }));
            }
            let value: f64 = head.parse().unwrap();
            Ok(ExecutionOutcome::success(value * input as f64, delay))
        }
    }

    fn dispatcher(first: &str, second: &str) -> Arc<DualDispatcher> {
        Arc::new(DualDispatcher::new(
            Arc::new(ScriptedRunner),
            FunctionPair::new(first, second),
            Arc::new(InFlight::new()),
        ))
    }

    #[tokio::test]
    async fn test_paired_success() {
        let d = dispatcher("1", "2");
        let record = d.dispatch_paired(3).await.unwrap();
        assert_eq!(record.to_string(), "3,3.000000,0,0,6.000000,0,0");
        assert_eq!(d.in_flight().current(Slot::First), 0);
        assert_eq!(d.in_flight().current(Slot::Second), 0);
    }

    #[tokio::test]
    async fn test_paired_waits_for_both_and_reports_first_failure() {
        let d = dispatcher("fail;50", "fail");
        let record = d.dispatch_paired(1).await.unwrap();
        assert_eq!(record.failed_slot(), Some(Slot::First));
        assert_eq!(record.to_string(), "1,1,error: JS error: failed on 1");

        let d = dispatcher("1", "fail;20");
        let record = d.dispatch_paired(2).await.unwrap();
        assert_eq!(record.to_string(), "2,2,error: JS error: failed on 2");
    }

    #[tokio::test]
    async fn test_paired_buffer_counts_other_in_flight_invocations() {
        let d = dispatcher("1;100", "1;10");
        let _outstanding = d.in_flight().enter(Slot::First);
        let record = d.dispatch_paired(1).await.unwrap();
        match record {
            TickRecord::Paired { first, second, .. } => {
                assert_eq!(first.buffered, 1);
                assert_eq!(second.buffered, 0);
            }
            other => panic!("unexpected record: {:?}", other),
        }
        assert_eq!(d.in_flight().current(Slot::First), 1);
    }

    #[tokio::test]
    async fn test_interleaved_emits_in_completion_order() {
        let d = dispatcher("1;150", "2;10");
        let records: Vec<_> = d.clone().dispatch(4, StreamMode::Interleaved).collect().await;
        let lines: Vec<String> = records.into_iter().map(|r| r.unwrap().to_string()).collect();
        assert_eq!(lines, vec!["4,2,8.000000,10", "4,1,4.000000,150"]);
        assert_eq!(d.in_flight().current(Slot::First), 0);
        assert_eq!(d.in_flight().current(Slot::Second), 0);
    }

    #[tokio::test]
    async fn test_interleaved_decrements_at_completion() {
        let d = dispatcher("1;200", "1");
        let mut records = d.clone().dispatch_interleaved(1);
        let first = records.next().await.unwrap().unwrap();
        assert_eq!(first.tick(), 1);
        assert_eq!(d.in_flight().current(Slot::Second), 0);
        assert_eq!(d.in_flight().current(Slot::First), 1);
        drop(records);
        assert_eq!(d.in_flight().current(Slot::First), 0);
    }

    #[tokio::test]
    async fn test_interleaved_failure_is_per_slot() {
        let d = dispatcher("fail", "3;30");
        let mut lines: Vec<String> = d
            .dispatch(2, StreamMode::Interleaved)
            .map(|r| r.unwrap().to_string())
            .collect()
            .await;
        lines.sort();
        assert_eq!(lines, vec!["2,1,error: JS error: failed on 2", "2,2,6.000000,30"]);
    }
}
