use anyhow::{Context, Result};
use leaderboard_service::{
    api::ApiLimits,
    config::Config,
    metrics::LeaderboardMetrics,
    repository::{PgRankingStore, RedisSortedSetStore, SortedSetStore},
    workers::cache_health::{run_cache_health_check, CacheHealthConfig},
    HybridRankingService, LeaderboardApi, StrategySelector,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(log_format: &str) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    if log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Build the sorted-set cache; only a missing URL leaves it unconfigured
async fn build_cache(config: &Config) -> RedisSortedSetStore {
    let Some(url) = config.redis.url.as_deref() else {
        info!("REDIS_URL not set, cache ranking backend disabled");
        return RedisSortedSetStore::disabled();
    };

    let store = RedisSortedSetStore::new(
        url,
        Duration::from_millis(config.redis.connect_timeout_ms),
    )
    .with_batch_size(config.ranking.sync_batch_size);

    // First connect; on failure every call retries until Redis is reachable
    if let Err(e) = store.ping().await {
        warn!(
            url = %redis_utils::redact_url(url),
            error = %e,
            "Redis unreachable at startup, serving from the relational store until it recovers"
        );
    }
    store
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    init_tracing(&config.app.log_format);

    info!(
        service = %config.app.service_name,
        env = %config.app.env,
        cache_threshold = config.ranking.cache_threshold,
        "Starting leaderboard service"
    );

    if let Err(e) = LeaderboardMetrics::register(prometheus::default_registry()) {
        warn!(error = %e, "Failed to register leaderboard metrics");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = Arc::new(PgRankingStore::new(pool));

    let cache: Arc<dyn SortedSetStore> = Arc::new(build_cache(&config).await);

    let service = Arc::new(
        HybridRankingService::new(
            cache.clone(),
            store.clone(),
            store.clone(),
            StrategySelector::new(config.ranking.cache_threshold),
        )
        .with_cache_timeout(config.ranking.cache_timeout()),
    );
    let api = LeaderboardApi::new(service, store, ApiLimits::from(&config.ranking));

    for (tenant_id, campaign_id) in &config.ranking.sync_on_startup {
        match api.sync_to_cache(*tenant_id, *campaign_id).await {
            Ok(_) => info!(tenant_id = %tenant_id, campaign_id = %campaign_id, "Startup cache warm-up done"),
            Err(e) => error!(
                tenant_id = %tenant_id,
                campaign_id = %campaign_id,
                error = %e,
                "Startup cache warm-up failed"
            ),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health = tokio::spawn(run_cache_health_check(
        cache,
        CacheHealthConfig::from_interval_secs(config.redis.health_interval_secs),
        shutdown_rx,
    ));

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = health.await {
        warn!(error = %e, "Cache health task ended abnormally");
    }

    info!("Leaderboard service stopped");
    Ok(())
}
