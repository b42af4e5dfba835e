/// Configuration management for Leaderboard Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::services::{DEFAULT_CACHE_THRESHOLD, DEFAULT_CACHE_TIMEOUT};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    pub service_name: String,
    /// `json` switches log output to the JSON formatter
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Sorted-set cache URL; `None` leaves the cache backend unconfigured
    pub url: Option<String>,
    pub connect_timeout_ms: u64,
    /// Health worker period in seconds (0 disables the worker)
    pub health_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Entrant count above which `auto` selects the cache backend
    pub cache_threshold: u64,
    pub request_timeout_ms: u64,
    /// Budget of one cache step inside a request
    pub cache_timeout_ms: u64,
    pub sync_timeout_secs: u64,
    pub max_limit: u64,
    pub max_radius: u64,
    pub sync_batch_size: usize,
    /// `(tenant_id, campaign_id)` pairs warmed at startup
    pub sync_on_startup: Vec<(Uuid, Uuid)>,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

impl RankingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            request_timeout_ms: 500,
            cache_timeout_ms: DEFAULT_CACHE_TIMEOUT.as_millis() as u64,
            sync_timeout_secs: 300,
            max_limit: 1000,
            max_radius: 500,
            sync_batch_size: 1000,
            sync_on_startup: Vec::new(),
        }
    }
}

/// Parse `tenant_id:campaign_id[,tenant_id:campaign_id...]`, skipping malformed pairs
pub fn parse_sync_targets(raw: &str) -> Vec<(Uuid, Uuid)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let parsed = pair.split_once(':').and_then(|(tenant, campaign)| {
                Some((
                    Uuid::parse_str(tenant.trim()).ok()?,
                    Uuid::parse_str(campaign.trim()).ok()?,
                ))
            });
            if parsed.is_none() {
                warn!(entry = %pair, "Ignoring malformed SYNC_ON_STARTUP entry");
            }
            parsed
        })
        .collect()
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ranking_defaults = RankingConfig::default();

        let app = AppConfig {
            env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            service_name: lookup("SERVICE_NAME")
                .unwrap_or_else(|| "leaderboard-service".to_string()),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
        };

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").context("DATABASE_URL environment variable not set")?,
            max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS")
                .unwrap_or_else(default_max_connections),
            min_connections: parse_var(&lookup, "DB_MIN_CONNECTIONS")
                .unwrap_or_else(default_min_connections),
            acquire_timeout_secs: parse_var(&lookup, "DB_ACQUIRE_TIMEOUT_SECS").unwrap_or(10),
        };

        let redis = RedisConfig {
            url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            connect_timeout_ms: parse_var(&lookup, "REDIS_CONNECT_TIMEOUT_MS").unwrap_or(2000),
            health_interval_secs: parse_var(&lookup, "CACHE_HEALTH_INTERVAL_SECS").unwrap_or(60),
        };

        let ranking = RankingConfig {
            cache_threshold: parse_var(&lookup, "LEADERBOARD_CACHE_THRESHOLD")
                .unwrap_or(ranking_defaults.cache_threshold),
            request_timeout_ms: parse_var(&lookup, "LEADERBOARD_REQUEST_TIMEOUT_MS")
                .unwrap_or(ranking_defaults.request_timeout_ms),
            cache_timeout_ms: parse_var(&lookup, "LEADERBOARD_CACHE_TIMEOUT_MS")
                .unwrap_or(ranking_defaults.cache_timeout_ms),
            sync_timeout_secs: parse_var(&lookup, "LEADERBOARD_SYNC_TIMEOUT_SECS")
                .unwrap_or(ranking_defaults.sync_timeout_secs),
            max_limit: parse_var(&lookup, "LEADERBOARD_MAX_LIMIT").unwrap_or(ranking_defaults.max_limit),
            max_radius: parse_var(&lookup, "LEADERBOARD_MAX_RADIUS").unwrap_or(ranking_defaults.max_radius),
            sync_batch_size: parse_var(&lookup, "LEADERBOARD_SYNC_BATCH_SIZE")
                .unwrap_or(ranking_defaults.sync_batch_size),
            sync_on_startup: lookup("SYNC_ON_STARTUP")
                .map(|raw| parse_sync_targets(&raw))
                .unwrap_or_default(),
        };

        Ok(Config {
            app,
            database,
            redis,
            ranking,
        })
    }
}
