//! Prometheus instrumentation of the transition engine

use chain_core::Gas;
use prometheus::{
    HistogramOpts, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

/// Service label of every engine metric
pub const EVM_STATE_SVC: &str = "evm_state";

const SVC_LABEL: &str = "svc";

/// Labels attached to engine metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTags {
    svc: String,
}

impl MetricTags {
    pub fn new(svc: impl Into<String>) -> Self {
        Self { svc: svc.into() }
    }

    pub fn svc(&self) -> &str {
        &self.svc
    }

    fn values(&self) -> [&str; 1] {
        [self.svc.as_str()]
    }
}

impl Default for MetricTags {
    fn default() -> Self {
        Self::new(EVM_STATE_SVC)
    }
}

/// Engine counters and timings
#[derive(Clone)]
pub struct Metrics {
    func_calls: IntCounterVec,
    func_errors: IntCounterVec,
    func_timing: HistogramVec,
    reverted_txs: IntCounterVec,
    gas_consumed: IntCounter,
}

impl Metrics {
    /// Create metrics that are not exported anywhere
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            func_calls: IntCounterVec::new(
                Opts::new("evm_func_calls_total", "State transitions started"),
                &[SVC_LABEL],
            )?,
            func_errors: IntCounterVec::new(
                Opts::new("evm_func_errors_total", "State transitions aborted by a fatal error"),
                &[SVC_LABEL],
            )?,
            func_timing: HistogramVec::new(
                HistogramOpts::new("evm_func_duration_seconds", "State transition duration"),
                &[SVC_LABEL],
            )?,
            reverted_txs: IntCounterVec::new(
                Opts::new("evm_reverted_txs_total", "Executions that ended in a VM error"),
                &[SVC_LABEL],
            )?,
            gas_consumed: IntCounter::new("evm_gas_consumed_total", "Gas consumed by VM executions")?,
        })
    }

    /// Create metrics and register them with `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self::new()?;
        registry.register(Box::new(metrics.func_calls.clone()))?;
        registry.register(Box::new(metrics.func_errors.clone()))?;
        registry.register(Box::new(metrics.func_timing.clone()))?;
        registry.register(Box::new(metrics.reverted_txs.clone()))?;
        registry.register(Box::new(metrics.gas_consumed.clone()))?;
        Ok(metrics)
    }

    pub fn report_func_call(&self, tags: &MetricTags) {
        self.func_calls.with_label_values(&tags.values()).inc();
    }

    pub fn report_func_error(&self, tags: &MetricTags) {
        self.func_errors.with_label_values(&tags.values()).inc();
    }

    /// Observe the elapsed time when the returned timer is dropped
    pub fn start_timer(&self, tags: &MetricTags) -> HistogramTimer {
        self.func_timing.with_label_values(&tags.values()).start_timer()
    }

    pub fn report_reverted_tx(&self, tags: &MetricTags) {
        self.reverted_txs.with_label_values(&tags.values()).inc();
    }

    pub fn report_gas_consumed(&self, gas: Gas) {
        self.gas_consumed.inc_by(gas);
    }

    pub fn func_calls(&self, tags: &MetricTags) -> u64 {
        self.func_calls.with_label_values(&tags.values()).get()
    }

    pub fn func_errors(&self, tags: &MetricTags) -> u64 {
        self.func_errors.with_label_values(&tags.values()).get()
    }

    pub fn reverted_txs(&self, tags: &MetricTags) -> u64 {
        self.reverted_txs.with_label_values(&tags.values()).get()
    }

    pub fn gas_consumed(&self) -> u64 {
        self.gas_consumed.get()
    }

    pub fn timed_calls(&self, tags: &MetricTags) -> u64 {
        self.func_timing.with_label_values(&tags.values()).get_sample_count()
    }
}
