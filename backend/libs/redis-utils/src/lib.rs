use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// Shared Redis connection, cloned per call by its users.
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure,
/// so clones never need a lock.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
}

impl RedisPool {
    /// Connect to `redis_url`, failing if the first connection takes longer than `connect_timeout`
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let addr_label = info.addr.to_string();

        let client = Client::open(info).context("failed to construct Redis client")?;
        let manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .with_context(|| {
                format!(
                    "timed out after {:?} connecting to Redis at {}",
                    connect_timeout, addr_label
                )
            })?
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection established at {}", addr_label);
        Ok(Self { manager })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

/// Strip credentials from a Redis URL before logging it
pub fn redact_url(raw: &str) -> String {
    match (raw.find("://"), raw.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &raw[..scheme_end], &raw[at + 1..])
        }
        _ => raw.to_string(),
    }
}
