//! Prometheus counters for builds, fetches and submissions
//!
//! One process-wide [`Metrics`] is created lazily by [`metrics`]. Tests that
//! need isolated values build their own with [`Metrics::new`].

use prometheus::{
    core::Collector, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

const BUILD_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];
const FETCH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 20.0];

pub struct Metrics {
    registry: Registry,

    pub builds_total: IntCounter,
    pub builds_failed: IntCounter,
    pub build_passes: IntCounter,
    pub build_latency: Histogram,

    pub fetch_requests: IntCounter,
    pub fetch_failures: IntCounter,
    pub fetch_latency: Histogram,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,

    pub submissions: IntCounter,
    pub submission_failures: IntCounter,
    pub poll_attempts: IntCounter,
    pub transactions_included: IntCounter,
    pub transactions_rejected: IntCounter,

    pub open_contexts: IntGauge,
}

/// Creates collectors and registers each one as it is made
struct Registrar<'a>(&'a Registry);

impl Registrar<'_> {
    fn keep<C: Collector + Clone + 'static>(&self, collector: C) -> prometheus::Result<C> {
        self.0.register(Box::new(collector.clone()))?;
        Ok(collector)
    }

    fn counter(&self, name: &str, help: &str) -> prometheus::Result<IntCounter> {
        self.keep(IntCounter::with_opts(Opts::new(name, help))?)
    }

    fn gauge(&self, name: &str, help: &str) -> prometheus::Result<IntGauge> {
        self.keep(IntGauge::with_opts(Opts::new(name, help))?)
    }

    fn histogram(&self, name: &str, help: &str, buckets: &[f64]) -> prometheus::Result<Histogram> {
        let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
        self.keep(Histogram::with_opts(opts)?)
    }
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let r = Registrar(&registry);

        let metrics = Self {
            builds_total: r.counter("zkapp_builds_total", "Transaction builds started")?,
            builds_failed: r.counter("zkapp_builds_failed", "Transaction builds that returned an error")?,
            build_passes: r.counter("zkapp_build_passes_total", "User logic passes executed")?,
            build_latency: r.histogram(
                "zkapp_build_latency_seconds",
                "Wall time of a transaction build",
                BUILD_BUCKETS,
            )?,
            fetch_requests: r.counter("zkapp_fetch_requests_total", "Batched remote fetch requests issued")?,
            fetch_failures: r.counter("zkapp_fetch_failures_total", "Batched remote fetch requests that failed")?,
            fetch_latency: r.histogram(
                "zkapp_fetch_latency_seconds",
                "Wall time of one missing data fetch",
                FETCH_BUCKETS,
            )?,
            cache_hits: r.counter("zkapp_cache_hits_total", "Data cache hits")?,
            cache_misses: r.counter("zkapp_cache_misses_total", "Data cache misses")?,
            submissions: r.counter("zkapp_submissions_total", "Transactions sent to the network")?,
            submission_failures: r.counter(
                "zkapp_submission_failures_total",
                "Submissions that came back with errors",
            )?,
            poll_attempts: r.counter(
                "zkapp_poll_attempts_total",
                "Transaction status queries issued while waiting",
            )?,
            transactions_included: r.counter(
                "zkapp_transactions_included_total",
                "Transactions confirmed as included",
            )?,
            transactions_rejected: r.counter(
                "zkapp_transactions_rejected_total",
                "Transactions that ended rejected",
            )?,
            open_contexts: r.gauge("zkapp_open_contexts", "Transaction contexts currently open")?,
            registry,
        };
        Ok(metrics)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every collector
    pub fn export_text(&self) -> anyhow::Result<String> {
        let mut out = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut out)?;
        Ok(String::from_utf8(out)?)
    }
}

/// Process-wide instance
pub fn metrics() -> &'static Metrics {
    // Names are constants, so construction only fails on a programming error
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("metric definitions are valid"));
    &METRICS
}

/// Wall-clock stopwatch feeding a histogram
pub struct Timer(Instant);

impl Timer {
    pub fn new() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_have_separate_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.builds_total.inc();
        assert_eq!(a.builds_total.get(), 1);
        assert_eq!(b.builds_total.get(), 0);
    }

    #[test]
    fn test_export_contains_counter_names() {
        let m = Metrics::new().unwrap();
        m.submissions.inc();
        m.open_contexts.inc();
        let text = m.export_text().unwrap();
        assert!(text.contains("zkapp_submissions_total 1"));
        assert!(text.contains("zkapp_open_contexts 1"));
        assert!(text.contains("zkapp_build_latency_seconds_bucket"));
    }
}
