//! Hybrid ranking service
//!
//! Every read picks a backend, dispatches to it and, when the cache backend
//! cannot answer, reruns the same logical operation against the relational
//! store. Cache failures are absorbed and logged; relational failures are
//! returned to the caller because nothing sits beneath that store.
//!
//! Architecture:
//! - Relational store: source of truth (`position` column)
//! - Sorted set: per-campaign cache of those positions, rebuilt by `sync_to_cache`
//! - Strategy selector: picks the backend per request

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::score::entrant_score;
use super::strategy::StrategySelector;
use crate::error::{CacheError, CacheResult, RankingError, RankingResult, StoreResult};
use crate::metrics::LeaderboardMetrics;
use crate::models::{
    Backend, Campaign, Entrant, EntrantPosition, RankingEntry, RequestedStrategy, Tenant,
};
use crate::repository::{
    LeaderboardKey, PositionRecalculator, RelationalRankingStore, SortedSetStore,
};
use crate::utils::Deadline;

/// Per-request inputs shared by every ranking operation
#[derive(Debug, Clone, Copy)]
pub struct RankingContext<'a> {
    pub tenant: &'a Tenant,
    pub campaign: &'a Campaign,
    pub strategy: RequestedStrategy,
    pub deadline: Deadline,
}

impl<'a> RankingContext<'a> {
    pub fn new(
        tenant: &'a Tenant,
        campaign: &'a Campaign,
        strategy: RequestedStrategy,
        deadline: Deadline,
    ) -> Self {
        Self {
            tenant,
            campaign,
            strategy,
            deadline,
        }
    }

    fn key(&self) -> LeaderboardKey {
        LeaderboardKey::new(self.tenant.id, self.campaign.id)
    }
}

/// Operation result tagged with the backend that actually answered
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub value: T,
    pub backend: Backend,
}

impl<T> Ranked<T> {
    fn new(value: T, backend: Backend) -> Self {
        Self { value, backend }
    }
}

/// Outcome of a best-effort secondary write.
///
/// It is reported next to the primary result and is never turned into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryWrite {
    NotAttempted,
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub entrant_id: Uuid,
    pub score: i64,
    /// Relational write-back of the score while cache-primary
    pub write_back: SecondaryWrite,
}

/// Best entrants plus the campaign size, both read from one backend
#[derive(Debug, Clone, PartialEq)]
pub struct TopNPage {
    pub entries: Vec<RankingEntry>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub loaded: usize,
}

/// Longest a single cache step may take before the request falls back
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(100);

/// Orchestrates the score formula, the strategy selector and both stores.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct HybridRankingService {
    cache: Arc<dyn SortedSetStore>,
    relational: Arc<dyn RelationalRankingStore>,
    recalculator: Arc<dyn PositionRecalculator>,
    selector: StrategySelector,
    cache_timeout: Duration,
}

impl HybridRankingService {
    pub fn new(
        cache: Arc<dyn SortedSetStore>,
        relational: Arc<dyn RelationalRankingStore>,
        recalculator: Arc<dyn PositionRecalculator>,
        selector: StrategySelector,
    ) -> Self {
        Self {
            cache,
            relational,
            recalculator,
            selector,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_cache_timeout(mut self, cache_timeout: Duration) -> Self {
        self.cache_timeout = cache_timeout;
        self
    }

    pub fn relational(&self) -> &dyn RelationalRankingStore {
        self.relational.as_ref()
    }

    async fn select(&self, ctx: &RankingContext<'_>) -> Backend {
        self.selector
            .select(
                ctx.tenant,
                ctx.campaign,
                ctx.strategy,
                self.cache.as_ref(),
                self.relational.as_ref(),
                &ctx.deadline,
            )
            .await
            .backend
    }

    /// Cache slice of the request budget: at most `cache_timeout` and at most
    /// half of what is left, so the relational fallback always keeps time.
    fn cache_deadline(&self, deadline: &Deadline) -> Deadline {
        deadline.capped(self.cache_timeout.min(deadline.remaining() / 2))
    }

    /// Run a cache call under its slice of the request deadline.
    ///
    /// `Ok(None)` means the cache could not answer and the caller must fall
    /// back. `NotFound` is surfaced as is.
    async fn try_cache<T, F>(
        &self,
        operation: &'static str,
        ctx: &RankingContext<'_>,
        call: F,
    ) -> RankingResult<Option<T>>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let outcome = match self.cache_deadline(&ctx.deadline).run(call).await {
            Ok(result) => result,
            Err(elapsed) => Err(CacheError::Timeout(elapsed.0)),
        };

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(CacheError::NotFound(entrant_id)) => Err(RankingError::NotFound(format!(
                "entrant {} in campaign {}",
                entrant_id, ctx.campaign.id
            ))),
            Err(e) => {
                warn!(
                    tenant_id = %ctx.tenant.id,
                    campaign_id = %ctx.campaign.id,
                    operation,
                    error = %e,
                    "Cache backend unavailable, falling back to relational store"
                );
                LeaderboardMetrics::record_cache_fallback(operation);
                Ok(None)
            }
        }
    }

    /// Run a relational call under the request deadline; every failure is fatal
    async fn relational_call<T, F>(deadline: &Deadline, call: F) -> RankingResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        deadline
            .run(call)
            .await
            .map_err(|elapsed| RankingError::DeadlineExceeded(elapsed.0))?
            .map_err(RankingError::from)
    }

    // ========== Ranking Operations ==========

    /// Recompute an entrant's score and propagate it to the active backend.
    ///
    /// Cache-primary: upsert into the sorted set, then best-effort write the
    /// score back into the relational position column. Formula: delegate to
    /// the position recalculator.
    pub async fn update_score(
        &self,
        ctx: &RankingContext<'_>,
        entrant: &Entrant,
    ) -> RankingResult<Ranked<ScoreUpdate>> {
        let score = entrant_score(entrant, &ctx.campaign.referral_config());

        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            let upserted = self
                .try_cache(
                    "update_score",
                    ctx,
                    self.cache.upsert(&key, entrant.id, score as f64),
                )
                .await?;

            if upserted.is_some() {
                let write_back = self.write_back_position(ctx, entrant.id, score).await;
                return Ok(Ranked::new(
                    ScoreUpdate {
                        entrant_id: entrant.id,
                        score,
                        write_back,
                    },
                    Backend::Cache,
                ));
            }
        }

        Self::relational_call(
            &ctx.deadline,
            self.recalculator.recalculate_positions(ctx.campaign),
        )
        .await?;

        Ok(Ranked::new(
            ScoreUpdate {
                entrant_id: entrant.id,
                score,
                write_back: SecondaryWrite::NotAttempted,
            },
            Backend::Formula,
        ))
    }

    async fn write_back_position(
        &self,
        ctx: &RankingContext<'_>,
        entrant_id: Uuid,
        score: i64,
    ) -> SecondaryWrite {
        let outcome = ctx
            .deadline
            .run(
                self.relational
                    .update_entrant_position(ctx.campaign.id, entrant_id, score),
            )
            .await;

        let reason = match outcome {
            Ok(Ok(())) => return SecondaryWrite::Applied,
            Ok(Err(e)) => e.to_string(),
            Err(elapsed) => elapsed.to_string(),
        };

        warn!(
            campaign_id = %ctx.campaign.id,
            entrant_id = %entrant_id,
            error = %reason,
            "Position write-back failed, cache copy stays authoritative"
        );
        LeaderboardMetrics::record_write_back_failure();
        SecondaryWrite::Failed(reason)
    }

    /// 1-indexed rank of an entrant
    pub async fn get_rank(
        &self,
        ctx: &RankingContext<'_>,
        entrant_id: Uuid,
    ) -> RankingResult<Ranked<RankingEntry>> {
        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            if let Some(entry) = self
                .try_cache("get_rank", ctx, self.cache.rank(&key, entrant_id))
                .await?
            {
                return Ok(Ranked::new(entry, Backend::Cache));
            }
        }

        let position = Self::relational_call(
            &ctx.deadline,
            self.relational
                .get_entrant_position(ctx.campaign.id, entrant_id),
        )
        .await?;

        Ok(Ranked::new(
            RankingEntry::from_position(EntrantPosition {
                entrant_id,
                position,
            }),
            Backend::Formula,
        ))
    }

    /// Best `limit` entrants, rank ascending
    pub async fn get_top_n(
        &self,
        ctx: &RankingContext<'_>,
        limit: u64,
    ) -> RankingResult<Ranked<Vec<RankingEntry>>> {
        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            if let Some(entries) = self
                .try_cache("get_top_n", ctx, self.cache.top_n(&key, limit))
                .await?
            {
                return Ok(Ranked::new(entries, Backend::Cache));
            }
        }

        let rows = Self::relational_call(
            &ctx.deadline,
            self.relational.get_top_n_by_position(ctx.campaign.id, limit),
        )
        .await?;

        Ok(Ranked::new(
            rows.into_iter().map(RankingEntry::from_position).collect(),
            Backend::Formula,
        ))
    }

    /// Best `limit` entrants and the campaign size.
    ///
    /// When the cache fails on either step both values are reread from the
    /// relational store, so `backend` covers the whole page.
    pub async fn get_top_n_with_total(
        &self,
        ctx: &RankingContext<'_>,
        limit: u64,
    ) -> RankingResult<Ranked<TopNPage>> {
        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            let page = self
                .try_cache("get_top_n_with_total", ctx, async {
                    let entries = self.cache.top_n(&key, limit).await?;
                    let total = self.cache.count(&key).await?;
                    Ok::<_, CacheError>(TopNPage { entries, total })
                })
                .await?;
            if let Some(page) = page {
                return Ok(Ranked::new(page, Backend::Cache));
            }
        }

        let rows = Self::relational_call(
            &ctx.deadline,
            self.relational.get_top_n_by_position(ctx.campaign.id, limit),
        )
        .await?;
        let total = Self::relational_call(
            &ctx.deadline,
            self.relational.get_entrant_count(ctx.campaign.id),
        )
        .await?;

        Ok(Ranked::new(
            TopNPage {
                entries: rows.into_iter().map(RankingEntry::from_position).collect(),
                total,
            },
            Backend::Formula,
        ))
    }

    /// Entrants within `radius` ranks of `entrant_id`, the entrant included
    pub async fn get_users_around(
        &self,
        ctx: &RankingContext<'_>,
        entrant_id: Uuid,
        radius: u64,
    ) -> RankingResult<Ranked<Vec<RankingEntry>>> {
        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            if let Some(entries) = self
                .try_cache(
                    "get_users_around",
                    ctx,
                    self.cache.around(&key, entrant_id, radius),
                )
                .await?
            {
                return Ok(Ranked::new(entries, Backend::Cache));
            }
        }

        // Position already is the rank in this backend
        let position = Self::relational_call(
            &ctx.deadline,
            self.relational
                .get_entrant_position(ctx.campaign.id, entrant_id),
        )
        .await?;

        let radius = i64::try_from(radius).unwrap_or(i64::MAX);
        let low = position.saturating_sub(radius).max(1);
        let high = position.saturating_add(radius);

        let rows = Self::relational_call(
            &ctx.deadline,
            self.relational
                .get_entrants_in_position_range(ctx.campaign.id, low, high),
        )
        .await?;

        Ok(Ranked::new(
            rows.into_iter().map(RankingEntry::from_position).collect(),
            Backend::Formula,
        ))
    }

    pub async fn get_user_count(&self, ctx: &RankingContext<'_>) -> RankingResult<Ranked<u64>> {
        if self.select(ctx).await == Backend::Cache {
            let key = ctx.key();
            if let Some(count) = self
                .try_cache("get_user_count", ctx, self.cache.count(&key))
                .await?
            {
                return Ok(Ranked::new(count, Backend::Cache));
            }
        }

        let count = Self::relational_call(
            &ctx.deadline,
            self.relational.get_entrant_count(ctx.campaign.id),
        )
        .await?;

        Ok(Ranked::new(count, Backend::Formula))
    }

    /// Drop an entrant from the campaign's sorted set, if the campaign may have one.
    ///
    /// Removal ignores the threshold: a set populated by an earlier sync must
    /// not keep serving a deleted entrant.
    pub async fn remove_entrant(
        &self,
        tenant: &Tenant,
        campaign: &Campaign,
        entrant_id: Uuid,
        deadline: &Deadline,
    ) -> SecondaryWrite {
        if !tenant.cache_ranking_enabled || !self.cache.is_enabled() {
            return SecondaryWrite::NotAttempted;
        }

        let key = LeaderboardKey::new(tenant.id, campaign.id);
        match self
            .cache_deadline(deadline)
            .run(self.cache.remove(&key, entrant_id))
            .await
        {
            Ok(Ok(())) => SecondaryWrite::Applied,
            Ok(Err(e)) => {
                warn!(campaign_id = %campaign.id, entrant_id = %entrant_id, error = %e, "Cache removal failed");
                LeaderboardMetrics::record_cache_fallback("remove_entrant");
                SecondaryWrite::Failed(e.to_string())
            }
            Err(elapsed) => {
                warn!(campaign_id = %campaign.id, entrant_id = %entrant_id, error = %elapsed, "Cache removal timed out");
                LeaderboardMetrics::record_cache_fallback("remove_entrant");
                SecondaryWrite::Failed(elapsed.to_string())
            }
        }
    }

    // ========== Maintenance ==========

    /// Rebuild a campaign's sorted set from the relational store.
    ///
    /// Long-running maintenance action: reads every entrant and replaces the
    /// whole set atomically. Running it twice without intervening writes
    /// leaves identical cache contents.
    pub async fn sync_to_cache(
        &self,
        tenant: &Tenant,
        campaign: &Campaign,
        deadline: &Deadline,
    ) -> RankingResult<SyncReport> {
        if !tenant.cache_ranking_enabled {
            return Err(RankingError::CacheNotPermitted(tenant.id));
        }
        if !self.cache.is_enabled() {
            return Err(RankingError::CacheUnavailable(
                "sorted-set cache is not configured".to_string(),
            ));
        }

        info!(tenant_id = %tenant.id, campaign_id = %campaign.id, "Starting leaderboard cache sync");

        let entrants = Self::relational_call(
            deadline,
            self.relational.get_all_entrants_for_sync(campaign.id),
        )
        .await?;

        let entries: Vec<(Uuid, f64)> = entrants
            .iter()
            .map(|row| (row.entrant_id, row.position as f64))
            .collect();
        let loaded = entries.len();
        let key = LeaderboardKey::new(tenant.id, campaign.id);

        let outcome = match deadline.run(self.cache.bulk_load(&key, entries)).await {
            Ok(result) => result,
            Err(elapsed) => Err(CacheError::Timeout(elapsed.0)),
        };

        if let Err(e) = outcome {
            warn!(
                tenant_id = %tenant.id,
                campaign_id = %campaign.id,
                error = %e,
                "Leaderboard cache sync failed"
            );
            LeaderboardMetrics::record_cache_sync("failed");
            return Err(RankingError::CacheUnavailable(e.to_string()));
        }

        LeaderboardMetrics::record_cache_sync("succeeded");
        info!(
            tenant_id = %tenant.id,
            campaign_id = %campaign.id,
            loaded,
            "Leaderboard cache sync finished"
        );
        Ok(SyncReport { loaded })
    }
}
