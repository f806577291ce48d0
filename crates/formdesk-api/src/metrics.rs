//! Metrics collection for the API service.
//!
//! Metrics live on a registry owned by [`ServiceMetrics`] rather than the
//! process-global default, so independent routers (as in tests) never
//! collide on registration.

use formdesk_core::DispatchReport;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    pub entries_received_total: IntCounter,
    pub entries_rejected_total: IntCounterVec,
    pub entry_duration_seconds: Histogram,

    pub requests_dispatched_total: IntCounter,
    pub dispatch_failures_total: IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("formdesk".to_string()), None)?;

        let entries_received_total =
            IntCounter::new("entries_received_total", "Total entries received")?;
        let entries_rejected_total = IntCounterVec::new(
            Opts::new(
                "entries_rejected_total",
                "Entries answered with an error, by HTTP status",
            ),
            &["status"],
        )?;
        let entry_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "entry_duration_seconds",
                "Time to transform and dispatch one entry",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        let requests_dispatched_total = IntCounter::new(
            "requests_dispatched_total",
            "Ticket requests delivered to the ticketing system",
        )?;
        let dispatch_failures_total = IntCounter::new(
            "dispatch_failures_total",
            "Ticket requests that could not be delivered",
        )?;

        registry.register(Box::new(entries_received_total.clone()))?;
        registry.register(Box::new(entries_rejected_total.clone()))?;
        registry.register(Box::new(entry_duration_seconds.clone()))?;
        registry.register(Box::new(requests_dispatched_total.clone()))?;
        registry.register(Box::new(dispatch_failures_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            entries_received_total,
            entries_rejected_total,
            entry_duration_seconds,
            requests_dispatched_total,
            dispatch_failures_total,
        }))
    }

    /// Record an entry answered with an error status
    pub fn record_rejection(&self, status: u16) {
        self.entries_rejected_total
            .with_label_values(&[status.to_string().as_str()])
            .inc();
    }

    /// Record the outcome of a completed pipeline run
    pub fn record_dispatch(&self, report: &DispatchReport, duration: Duration) {
        self.requests_dispatched_total
            .inc_by(report.delivered_count() as u64);
        self.dispatch_failures_total
            .inc_by(report.failed_count() as u64);
        self.entry_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
