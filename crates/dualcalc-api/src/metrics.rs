//! Prometheus counters for emitted records, served at `/metrics`.
use dualcalc_core::{StreamMode, TickRecord};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    records: IntCounterVec,
    failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let records = IntCounterVec::new(
            Opts::new("dualcalc_records_total", "Records sent to clients"),
            &["mode"],
        )?;
        let failures = IntCounterVec::new(
            Opts::new("dualcalc_failures_total", "Records reporting a failed function"),
            &["mode"],
        )?;
        registry.register(Box::new(records.clone()))?;
        registry.register(Box::new(failures.clone()))?;

        Ok(Self {
            registry,
            records,
            failures,
        })
    }

    pub fn observe(&self, mode: StreamMode, record: &TickRecord) {
        self.records.with_label_values(&[mode.as_str()]).inc();
        if record.is_failure() {
            self.failures.with_label_values(&[mode.as_str()]).inc();
        }
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
