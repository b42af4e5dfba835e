//! Redis ZSET backed leaderboard
//!
//! Key format: v{VERSION}:leaderboard:{tenant_id}:{campaign_id}
//! Members are entrant ids, scores are entrant scores (lower is better).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use super::SortedSetStore;
use crate::error::{CacheError, CacheResult};
use crate::models::RankingEntry;

/// Leaderboard key schema version - increment when changing key formats
pub const LEADERBOARD_KEY_VERSION: u32 = 1;

/// Members sent per ZADD inside a bulk load
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Namespaced sorted-set key of one (tenant, campaign) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaderboardKey(String);

impl LeaderboardKey {
    pub fn new(tenant_id: Uuid, campaign_id: Uuid) -> Self {
        Self(format!(
            "v{}:leaderboard:{}:{}",
            LEADERBOARD_KEY_VERSION, tenant_id, campaign_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeaderboardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted-set store over a shared Redis connection manager.
///
/// A configured store connects on first use. A failed connect leaves the cell
/// empty, so the next call retries while the error surfaces as
/// `BackendUnavailable`. Once established, the `ConnectionManager` reconnects
/// on its own and is cloned per call.
#[derive(Clone)]
pub struct RedisSortedSetStore {
    endpoint: Option<Endpoint>,
    manager: Arc<OnceCell<ConnectionManager>>,
    batch_size: usize,
}

#[derive(Clone)]
struct Endpoint {
    url: String,
    connect_timeout: Duration,
}

impl RedisSortedSetStore {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint: Some(Endpoint {
                url: url.into(),
                connect_timeout,
            }),
            manager: Arc::new(OnceCell::new()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Store with no cache configured; every operation reports unavailability
    pub fn disabled() -> Self {
        Self {
            endpoint: None,
            manager: Arc::new(OnceCell::new()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn conn(&self) -> CacheResult<ConnectionManager> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            CacheError::BackendUnavailable("sorted-set cache is not configured".to_string())
        })?;

        let manager = self
            .manager
            .get_or_try_init(|| async {
                let pool = redis_utils::RedisPool::connect(&endpoint.url, endpoint.connect_timeout)
                    .await
                    .map_err(|e| CacheError::BackendUnavailable(format!("{:#}", e)))?;
                Ok::<_, CacheError>(pool.manager())
            })
            .await?;
        Ok(manager.clone())
    }
}

/// Turn a WITHSCORES reply into ranked entries, the first member holding `first_rank`
fn to_entries(members: Vec<(String, f64)>, first_rank: u64) -> CacheResult<Vec<RankingEntry>> {
    members
        .into_iter()
        .enumerate()
        .map(|(offset, (member, score))| {
            let entrant_id = Uuid::parse_str(&member).map_err(|e| {
                CacheError::InvalidData(format!("member '{}' is not a uuid: {}", member, e))
            })?;
            Ok(RankingEntry {
                entrant_id,
                score,
                rank: first_rank + offset as u64,
            })
        })
        .collect()
}

/// Zero-based inclusive ZRANGE bounds for 1-indexed ranks `[low, high]`
fn zero_based_bounds(low: u64, high: u64) -> (i64, i64) {
    let to_index = |rank: u64| i64::try_from(rank.saturating_sub(1)).unwrap_or(i64::MAX);
    (to_index(low), to_index(high))
}

#[async_trait]
impl SortedSetStore for RedisSortedSetStore {
    fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn upsert(&self, key: &LeaderboardKey, entrant_id: Uuid, score: f64) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("ZADD")
            .arg(key.as_str())
            .arg(score)
            .arg(entrant_id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(key = %key, entrant_id = %entrant_id, score, "Leaderboard upsert");
        Ok(())
    }

    async fn rank(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<RankingEntry> {
        let mut conn = self.conn().await?;
        let member = entrant_id.to_string();

        let (rank, score): (Option<u64>, Option<f64>) = redis::pipe()
            .cmd("ZRANK")
            .arg(key.as_str())
            .arg(&member)
            .cmd("ZSCORE")
            .arg(key.as_str())
            .arg(&member)
            .query_async(&mut conn)
            .await?;

        match (rank, score) {
            (Some(rank), Some(score)) => Ok(RankingEntry {
                entrant_id,
                score,
                rank: rank + 1,
            }),
            _ => Err(CacheError::NotFound(entrant_id)),
        }
    }

    async fn top_n(&self, key: &LeaderboardKey, limit: u64) -> CacheResult<Vec<RankingEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let (start, stop) = zero_based_bounds(1, limit);
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key.as_str())
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        to_entries(members, 1)
    }

    async fn around(
        &self,
        key: &LeaderboardKey,
        entrant_id: Uuid,
        radius: u64,
    ) -> CacheResult<Vec<RankingEntry>> {
        let pivot = self.rank(key, entrant_id).await?;

        // ZRANGE clamps the upper bound to the cardinality on its own
        let low = pivot.rank.saturating_sub(radius).max(1);
        let high = pivot.rank.saturating_add(radius);
        let (start, stop) = zero_based_bounds(low, high);

        let mut conn = self.conn().await?;
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key.as_str())
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        to_entries(members, low)
    }

    async fn count(&self, key: &LeaderboardKey) -> CacheResult<u64> {
        let mut conn = self.conn().await?;
        let count: u64 = redis::cmd("ZCARD")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn remove(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("ZREM")
            .arg(key.as_str())
            .arg(entrant_id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(key = %key, entrant_id = %entrant_id, "Leaderboard remove");
        Ok(())
    }

    async fn bulk_load(&self, key: &LeaderboardKey, entries: Vec<(Uuid, f64)>) -> CacheResult<()> {
        let mut conn = self.conn().await?;

        // MULTI/EXEC so readers never observe a half-loaded set
        let mut pipe = redis::pipe();
        pipe.atomic().del(key.as_str()).ignore();

        let members: Vec<(f64, String)> = entries
            .iter()
            .map(|(entrant_id, score)| (*score, entrant_id.to_string()))
            .collect();
        for chunk in members.chunks(self.batch_size) {
            pipe.zadd_multiple(key.as_str(), chunk).ignore();
        }

        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(key = %key, count = entries.len(), "Leaderboard bulk load");
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}
