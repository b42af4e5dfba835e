//! Storage seams of the ranking engine
//!
//! The hybrid service only talks to these traits. Redis and Postgres
//! implementations live in the submodules; tests plug in mocks or in-memory fakes.

mod postgres;
mod sorted_set;

pub use postgres::PgRankingStore;
pub use sorted_set::{LeaderboardKey, RedisSortedSetStore, LEADERBOARD_KEY_VERSION};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{CacheResult, StoreResult};
use crate::models::{Campaign, EntrantPosition, Entrant, RankingEntry, Tenant};

/// Per-campaign sorted set of entrant scores (Redis ZSET semantics)
///
/// Every operation fails with `CacheError::BackendUnavailable` when no cache
/// connection is configured. Ties between equal scores are broken by the
/// store's member ordering; that order carries no meaning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SortedSetStore: Send + Sync {
    /// False when no cache is configured at all
    fn is_enabled(&self) -> bool;

    /// Set or update one member's score. Last write for a member wins.
    async fn upsert(&self, key: &LeaderboardKey, entrant_id: Uuid, score: f64) -> CacheResult<()>;

    /// 1-indexed rank and current score of a member, `NotFound` if absent
    async fn rank(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<RankingEntry>;

    /// Best `limit` members, ascending by score
    async fn top_n(&self, key: &LeaderboardKey, limit: u64) -> CacheResult<Vec<RankingEntry>>;

    /// Inclusive window `[rank - radius, rank + radius]` around a member,
    /// clamped to `[1, cardinality]`
    async fn around(
        &self,
        key: &LeaderboardKey,
        entrant_id: Uuid,
        radius: u64,
    ) -> CacheResult<Vec<RankingEntry>>;

    async fn count(&self, key: &LeaderboardKey) -> CacheResult<u64>;

    /// Idempotent; removing an absent member is not an error
    async fn remove(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<()>;

    /// Replace the whole set with `entries` in a single atomic round trip
    async fn bulk_load(&self, key: &LeaderboardKey, entries: Vec<(Uuid, f64)>) -> CacheResult<()>;

    async fn ping(&self) -> CacheResult<()>;
}

/// Durable, strongly consistent store of entrant positions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationalRankingStore: Send + Sync {
    async fn get_campaign(&self, tenant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign>;

    async fn get_entrant(&self, campaign_id: Uuid, entrant_id: Uuid) -> StoreResult<Entrant>;

    async fn get_entrant_position(&self, campaign_id: Uuid, entrant_id: Uuid)
        -> StoreResult<i64>;

    async fn get_entrant_count(&self, campaign_id: Uuid) -> StoreResult<u64>;

    /// Entrants ordered by ascending position
    async fn get_top_n_by_position(
        &self,
        campaign_id: Uuid,
        limit: u64,
    ) -> StoreResult<Vec<EntrantPosition>>;

    /// Entrants with `low <= position <= high`, ordered by position
    async fn get_entrants_in_position_range(
        &self,
        campaign_id: Uuid,
        low: i64,
        high: i64,
    ) -> StoreResult<Vec<EntrantPosition>>;

    async fn update_entrant_position(
        &self,
        campaign_id: Uuid,
        entrant_id: Uuid,
        position: i64,
    ) -> StoreResult<()>;

    /// Every entrant of the campaign (unbounded, full resync only)
    async fn get_all_entrants_for_sync(&self, campaign_id: Uuid)
        -> StoreResult<Vec<EntrantPosition>>;
}

/// Recomputes the persisted dense positions of a campaign
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionRecalculator: Send + Sync {
    /// Returns the number of entrants whose position was rewritten
    async fn recalculate_positions(&self, campaign: &Campaign) -> StoreResult<u64>;
}

/// Tenant capability lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn get_tenant(&self, tenant_id: Uuid) -> StoreResult<Tenant>;
}
