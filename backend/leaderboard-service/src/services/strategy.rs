//! Per-request ranking backend selection
//!
//! Selection is re-evaluated on every call and never pinned per campaign, so
//! a campaign switches backends on the first request after it crosses the
//! threshold.

use tracing::{debug, warn};

use crate::metrics::LeaderboardMetrics;
use crate::models::{Backend, Campaign, RequestedStrategy, Tenant};
use crate::repository::{RelationalRankingStore, SortedSetStore};
use crate::utils::Deadline;

/// Entrant count above which `auto` selects the cache backend
pub const DEFAULT_CACHE_THRESHOLD: u64 = 10_000;

/// Why a backend was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    FormulaRequested,
    CacheRequested,
    TenantNotPermitted,
    CacheNotConfigured,
    AboveThreshold { entrants: u64 },
    AtOrBelowThreshold { entrants: u64 },
    CountFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub backend: Backend,
    pub reason: SelectionReason,
}

impl Selection {
    fn new(backend: Backend, reason: SelectionReason) -> Self {
        Self { backend, reason }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategySelector {
    cache_threshold: u64,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_THRESHOLD)
    }
}

impl StrategySelector {
    pub fn new(cache_threshold: u64) -> Self {
        Self { cache_threshold }
    }

    pub fn cache_threshold(&self) -> u64 {
        self.cache_threshold
    }

    /// Choose the backend for one request.
    ///
    /// Never fails: every doubt resolves to `Backend::Formula`, the store that
    /// is known to be consistent. An explicit `formula` request returns before
    /// touching either store.
    pub async fn select(
        &self,
        tenant: &Tenant,
        campaign: &Campaign,
        requested: RequestedStrategy,
        cache: &dyn SortedSetStore,
        relational: &dyn RelationalRankingStore,
        deadline: &Deadline,
    ) -> Selection {
        let selection = self
            .decide(tenant, campaign, requested, cache, relational, deadline)
            .await;

        debug!(
            tenant_id = %tenant.id,
            campaign_id = %campaign.id,
            requested = ?requested,
            backend = %selection.backend,
            reason = ?selection.reason,
            "Ranking backend selected"
        );
        LeaderboardMetrics::record_backend_selected(selection.backend);
        selection
    }

    async fn decide(
        &self,
        tenant: &Tenant,
        campaign: &Campaign,
        requested: RequestedStrategy,
        cache: &dyn SortedSetStore,
        relational: &dyn RelationalRankingStore,
        deadline: &Deadline,
    ) -> Selection {
        if requested == RequestedStrategy::Formula {
            return Selection::new(Backend::Formula, SelectionReason::FormulaRequested);
        }
        if !tenant.cache_ranking_enabled {
            return Selection::new(Backend::Formula, SelectionReason::TenantNotPermitted);
        }
        if !cache.is_enabled() {
            return Selection::new(Backend::Formula, SelectionReason::CacheNotConfigured);
        }

        match requested {
            RequestedStrategy::Cache => {
                Selection::new(Backend::Cache, SelectionReason::CacheRequested)
            }
            RequestedStrategy::Formula => {
                Selection::new(Backend::Formula, SelectionReason::FormulaRequested)
            }
            RequestedStrategy::Auto => {
                let counted = deadline
                    .run(relational.get_entrant_count(campaign.id))
                    .await;
                match counted {
                    Ok(Ok(entrants)) if entrants > self.cache_threshold => Selection::new(
                        Backend::Cache,
                        SelectionReason::AboveThreshold { entrants },
                    ),
                    Ok(Ok(entrants)) => Selection::new(
                        Backend::Formula,
                        SelectionReason::AtOrBelowThreshold { entrants },
                    ),
                    Ok(Err(e)) => {
                        warn!(
                            campaign_id = %campaign.id,
                            error = %e,
                            "Entrant count failed during strategy selection, using formula"
                        );
                        LeaderboardMetrics::record_selection_count_failure();
                        Selection::new(Backend::Formula, SelectionReason::CountFailed)
                    }
                    Err(elapsed) => {
                        warn!(
                            campaign_id = %campaign.id,
                            error = %elapsed,
                            "Entrant count timed out during strategy selection, using formula"
                        );
                        LeaderboardMetrics::record_selection_count_failure();
                        Selection::new(Backend::Formula, SelectionReason::CountFailed)
                    }
                }
            }
        }
    }
}
