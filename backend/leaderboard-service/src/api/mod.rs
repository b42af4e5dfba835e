//! Ranking API surface
//!
//! Resolves request ids into domain objects, validates request parameters and
//! maps hybrid service results onto response payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::RankingConfig;
use crate::error::{RankingError, RankingResult};
use crate::models::{Backend, Campaign, RankingEntry, RequestedStrategy, Tenant};
use crate::repository::TenantDirectory;
use crate::services::{HybridRankingService, RankingContext, SecondaryWrite};
use crate::utils::Deadline;

#[derive(Debug, Clone, Serialize)]
pub struct RankResponse {
    pub entrant_id: Uuid,
    pub campaign_id: Uuid,
    pub rank: u64,
    pub score: f64,
    pub strategy_used: Backend,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopNResponse {
    pub campaign_id: Uuid,
    pub entries: Vec<RankingEntry>,
    pub total: u64,
    pub strategy_used: Backend,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AroundResponse {
    pub campaign_id: Uuid,
    pub entrant_id: Uuid,
    pub entries: Vec<RankingEntry>,
    pub strategy_used: Backend,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateScoreResponse {
    pub entrant_id: Uuid,
    pub campaign_id: Uuid,
    pub success: bool,
    pub strategy_used: Backend,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub campaign_id: Uuid,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveEntrantResponse {
    pub entrant_id: Uuid,
    pub campaign_id: Uuid,
    pub removed_from_cache: bool,
    pub timestamp: DateTime<Utc>,
}

/// Request limits and deadlines of the API surface
#[derive(Debug, Clone, Copy)]
pub struct ApiLimits {
    pub max_limit: u64,
    pub max_radius: u64,
    pub request_timeout: Duration,
    pub sync_timeout: Duration,
}

impl From<&RankingConfig> for ApiLimits {
    fn from(config: &RankingConfig) -> Self {
        Self {
            max_limit: config.max_limit,
            max_radius: config.max_radius,
            request_timeout: config.request_timeout(),
            sync_timeout: config.sync_timeout(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self::from(&RankingConfig::default())
    }
}

#[derive(Clone)]
pub struct LeaderboardApi {
    service: Arc<HybridRankingService>,
    tenants: Arc<dyn TenantDirectory>,
    limits: ApiLimits,
}

impl LeaderboardApi {
    pub fn new(
        service: Arc<HybridRankingService>,
        tenants: Arc<dyn TenantDirectory>,
        limits: ApiLimits,
    ) -> Self {
        Self {
            service,
            tenants,
            limits,
        }
    }

    pub fn service(&self) -> &HybridRankingService {
        &self.service
    }

    async fn resolve(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        deadline: &Deadline,
    ) -> RankingResult<(Tenant, Campaign)> {
        let tenant = deadline
            .run(self.tenants.get_tenant(tenant_id))
            .await
            .map_err(|elapsed| RankingError::DeadlineExceeded(elapsed.0))??;
        let campaign = deadline
            .run(self.service.relational().get_campaign(tenant_id, campaign_id))
            .await
            .map_err(|elapsed| RankingError::DeadlineExceeded(elapsed.0))??;
        Ok((tenant, campaign))
    }

    fn validate_limit(&self, limit: u64) -> RankingResult<()> {
        if limit == 0 || limit > self.limits.max_limit {
            return Err(RankingError::InvalidInput(format!(
                "limit must be between 1 and {}",
                self.limits.max_limit
            )));
        }
        Ok(())
    }

    fn validate_radius(&self, radius: u64) -> RankingResult<()> {
        if radius > self.limits.max_radius {
            return Err(RankingError::InvalidInput(format!(
                "radius must be at most {}",
                self.limits.max_radius
            )));
        }
        Ok(())
    }

    pub async fn get_rank(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        entrant_id: Uuid,
        strategy: Option<&str>,
    ) -> RankingResult<RankResponse> {
        let strategy = RequestedStrategy::parse_optional(strategy)?;
        let deadline = Deadline::after(self.limits.request_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;
        let ctx = RankingContext::new(&tenant, &campaign, strategy, deadline);

        let ranked = self.service.get_rank(&ctx, entrant_id).await?;
        Ok(RankResponse {
            entrant_id,
            campaign_id,
            rank: ranked.value.rank,
            score: ranked.value.score,
            strategy_used: ranked.backend,
            timestamp: Utc::now(),
        })
    }

    pub async fn get_top_n(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        limit: u64,
        strategy: Option<&str>,
    ) -> RankingResult<TopNResponse> {
        let strategy = RequestedStrategy::parse_optional(strategy)?;
        self.validate_limit(limit)?;
        let deadline = Deadline::after(self.limits.request_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;
        let ctx = RankingContext::new(&tenant, &campaign, strategy, deadline);

        let ranked = self.service.get_top_n_with_total(&ctx, limit).await?;
        Ok(TopNResponse {
            campaign_id,
            entries: ranked.value.entries,
            total: ranked.value.total,
            strategy_used: ranked.backend,
            timestamp: Utc::now(),
        })
    }

    pub async fn get_around(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        entrant_id: Uuid,
        radius: u64,
        strategy: Option<&str>,
    ) -> RankingResult<AroundResponse> {
        let strategy = RequestedStrategy::parse_optional(strategy)?;
        self.validate_radius(radius)?;
        let deadline = Deadline::after(self.limits.request_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;
        let ctx = RankingContext::new(&tenant, &campaign, strategy, deadline);

        let ranked = self
            .service
            .get_users_around(&ctx, entrant_id, radius)
            .await?;
        Ok(AroundResponse {
            campaign_id,
            entrant_id,
            entries: ranked.value,
            strategy_used: ranked.backend,
            timestamp: Utc::now(),
        })
    }

    pub async fn update_score(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        entrant_id: Uuid,
        strategy: Option<&str>,
    ) -> RankingResult<UpdateScoreResponse> {
        let strategy = RequestedStrategy::parse_optional(strategy)?;
        let deadline = Deadline::after(self.limits.request_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;
        let entrant = deadline
            .run(self.service.relational().get_entrant(campaign_id, entrant_id))
            .await
            .map_err(|elapsed| RankingError::DeadlineExceeded(elapsed.0))??;
        let ctx = RankingContext::new(&tenant, &campaign, strategy, deadline);

        let ranked = self.service.update_score(&ctx, &entrant).await?;
        Ok(UpdateScoreResponse {
            entrant_id,
            campaign_id,
            success: true,
            strategy_used: ranked.backend,
            timestamp: Utc::now(),
        })
    }

    /// Long-running maintenance call, bounded by the sync deadline instead of
    /// the request deadline
    pub async fn sync_to_cache(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
    ) -> RankingResult<SyncResponse> {
        let deadline = Deadline::after(self.limits.sync_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;
        if !tenant.cache_ranking_enabled {
            return Err(RankingError::CacheNotPermitted(tenant.id));
        }

        self.service
            .sync_to_cache(&tenant, &campaign, &deadline)
            .await?;
        Ok(SyncResponse {
            campaign_id,
            success: true,
            timestamp: Utc::now(),
        })
    }

    pub async fn remove_entrant(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        entrant_id: Uuid,
    ) -> RankingResult<RemoveEntrantResponse> {
        let deadline = Deadline::after(self.limits.request_timeout);
        let (tenant, campaign) = self.resolve(tenant_id, campaign_id, &deadline).await?;

        let outcome = self
            .service
            .remove_entrant(&tenant, &campaign, entrant_id, &deadline)
            .await;
        Ok(RemoveEntrantResponse {
            entrant_id,
            campaign_id,
            removed_from_cache: outcome == SecondaryWrite::Applied,
            timestamp: Utc::now(),
        })
    }
}
