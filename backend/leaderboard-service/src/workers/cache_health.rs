//! Sorted-set cache health check background job
//!
//! Periodically pings Redis so stale connections are noticed (and the
//! ConnectionManager reconnects) before a ranking request hits them. Failures
//! are only logged; request paths already fall back to the relational store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::repository::SortedSetStore;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive failures after which the log level escalates to error
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Clone, Debug)]
pub struct CacheHealthConfig {
    pub enabled: bool,
    pub check_interval: Duration,
}

impl Default for CacheHealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: HEALTH_CHECK_INTERVAL,
        }
    }
}

impl CacheHealthConfig {
    /// A zero interval disables the job
    pub fn from_interval_secs(secs: u64) -> Self {
        Self {
            enabled: secs > 0,
            check_interval: Duration::from_secs(secs.max(1)),
        }
    }
}

/// Run the health check until `shutdown` fires.
///
/// Returns immediately when disabled or when no cache is configured.
pub async fn run_cache_health_check(
    cache: Arc<dyn SortedSetStore>,
    config: CacheHealthConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.enabled || !cache.is_enabled() {
        tracing::info!("Cache health check disabled");
        return;
    }

    tracing::info!(
        interval_secs = config.check_interval.as_secs(),
        "Starting cache health check background job"
    );

    let mut consecutive_failures: u32 = 0;

    loop {
        match cache.ping().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    tracing::info!(
                        previous_failures = consecutive_failures,
                        "Cache connection recovered"
                    );
                }
                consecutive_failures = 0;
                tracing::debug!("Cache health check: OK");
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(
                        consecutive_failures,
                        error = %e,
                        "Cache health check: CRITICAL - rankings are served from the relational store"
                    );
                } else {
                    tracing::warn!(
                        consecutive_failures,
                        error = %e,
                        "Cache health check: FAILED"
                    );
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("Cache health check shutting down");
                break;
            }
            _ = sleep(config.check_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::repository::MockSortedSetStore;

    #[test]
    fn test_default_config() {
        let config = CacheHealthConfig::default();
        assert!(config.enabled);
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert!(!CacheHealthConfig::from_interval_secs(0).enabled);
    }

    #[tokio::test]
    async fn test_disabled_cache_returns_immediately() {
        let mut cache = MockSortedSetStore::new();
        cache.expect_is_enabled().return_const(false);
        let (_tx, rx) = watch::channel(false);

        run_cache_health_check(Arc::new(cache), CacheHealthConfig::default(), rx).await;
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let mut cache = MockSortedSetStore::new();
        cache.expect_is_enabled().return_const(true);
        cache
            .expect_ping()
            .returning(|| Err(CacheError::BackendUnavailable("down".to_string())));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_cache_health_check(
            Arc::new(cache),
            CacheHealthConfig {
                enabled: true,
                check_interval: Duration::from_millis(5),
            },
            rx,
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker stops after shutdown")
            .unwrap();
    }
}
