//! Leaderboard metrics for observability

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

use crate::models::Backend;

static METRICS: OnceLock<LeaderboardMetricsInner> = OnceLock::new();

struct LeaderboardMetricsInner {
    backend_selected: IntCounterVec,
    cache_fallbacks: IntCounterVec,
    write_back_failures: IntCounter,
    selection_count_failures: IntCounter,
    cache_syncs: IntCounterVec,
}

impl LeaderboardMetricsInner {
    fn new() -> Self {
        Self {
            backend_selected: IntCounterVec::new(
                Opts::new(
                    "leaderboard_backend_selected_total",
                    "Ranking backend chosen by the strategy selector",
                ),
                &["backend"],
            )
            .expect("valid metric definition"),
            cache_fallbacks: IntCounterVec::new(
                Opts::new(
                    "leaderboard_cache_fallbacks_total",
                    "Cache operations that fell back to the relational store",
                ),
                &["operation"],
            )
            .expect("valid metric definition"),
            write_back_failures: IntCounter::new(
                "leaderboard_write_back_failures_total",
                "Failed best-effort position write-backs while cache-primary",
            )
            .expect("valid metric definition"),
            selection_count_failures: IntCounter::new(
                "leaderboard_selection_count_failures_total",
                "Entrant count failures during strategy selection",
            )
            .expect("valid metric definition"),
            cache_syncs: IntCounterVec::new(
                Opts::new("leaderboard_cache_syncs_total", "Full cache resyncs"),
                &["outcome"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.backend_selected.clone()))?;
        registry.register(Box::new(self.cache_fallbacks.clone()))?;
        registry.register(Box::new(self.write_back_failures.clone()))?;
        registry.register(Box::new(self.selection_count_failures.clone()))?;
        registry.register(Box::new(self.cache_syncs.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static LeaderboardMetricsInner {
    METRICS.get_or_init(LeaderboardMetricsInner::new)
}

#[derive(Clone, Copy, Default)]
pub struct LeaderboardMetrics;

impl LeaderboardMetrics {
    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_backend_selected(backend: Backend) {
        get_metrics()
            .backend_selected
            .with_label_values(&[backend.as_str()])
            .inc();
    }

    pub fn record_cache_fallback(operation: &str) {
        get_metrics()
            .cache_fallbacks
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_write_back_failure() {
        get_metrics().write_back_failures.inc();
    }

    pub fn record_selection_count_failure() {
        get_metrics().selection_count_failures.inc();
    }

    pub fn record_cache_sync(outcome: &str) {
        get_metrics().cache_syncs.with_label_values(&[outcome]).inc();
    }
}
