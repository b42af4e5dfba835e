use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PositionRecalculator, RelationalRankingStore, TenantDirectory};
use crate::error::{StoreError, StoreResult};
use crate::models::{Campaign, Entrant, EntrantPosition, ReferralConfig, Tenant};
use crate::services::score::MAX_POSITIONS_PER_REFERRAL;

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    tenant_id: Uuid,
    referral_config: Option<serde_json::Value>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Campaign {
            id: row.id,
            tenant_id: row.tenant_id,
            referral_config: row.referral_config.as_ref().map(ReferralConfig::from_json),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntrantRow {
    id: Uuid,
    campaign_id: Uuid,
    original_position: i64,
    referral_count: i64,
    verified_referral_count: i64,
    position: i64,
}

impl From<EntrantRow> for Entrant {
    fn from(row: EntrantRow) -> Self {
        Entrant {
            id: row.id,
            campaign_id: row.campaign_id,
            original_position: row.original_position,
            referral_count: row.referral_count,
            verified_referral_count: row.verified_referral_count,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: Uuid,
    position: i64,
}

impl From<PositionRow> for EntrantPosition {
    fn from(row: PositionRow) -> Self {
        EntrantPosition {
            entrant_id: row.id,
            position: row.position,
        }
    }
}

/// Postgres implementation of the relational ranking seams
///
/// Tables: `tenants`, `campaigns`, `waitlist_users` (soft-deleted rows carry
/// a non-null `deleted_at` and never take part in ranking).
#[derive(Clone)]
pub struct PgRankingStore {
    pool: PgPool,
}

impl PgRankingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_positions(rows: Vec<PositionRow>) -> Vec<EntrantPosition> {
    rows.into_iter().map(EntrantPosition::from).collect()
}

#[async_trait]
impl RelationalRankingStore for PgRankingStore {
    async fn get_campaign(&self, tenant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign> {
        let row = sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT id, tenant_id, referral_config
            FROM campaigns
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Campaign::from)
            .ok_or_else(|| StoreError::NotFound(format!("campaign {}", campaign_id)))
    }

    async fn get_entrant(&self, campaign_id: Uuid, entrant_id: Uuid) -> StoreResult<Entrant> {
        let row = sqlx::query_as::<_, EntrantRow>(
            r#"
            SELECT id, campaign_id, original_position::BIGINT AS original_position,
                   referral_count::BIGINT AS referral_count,
                   verified_referral_count::BIGINT AS verified_referral_count,
                   position::BIGINT AS position
            FROM waitlist_users
            WHERE id = $1 AND campaign_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(entrant_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entrant::from)
            .ok_or_else(|| StoreError::NotFound(format!("entrant {}", entrant_id)))
    }

    async fn get_entrant_position(
        &self,
        campaign_id: Uuid,
        entrant_id: Uuid,
    ) -> StoreResult<i64> {
        let position: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT position::BIGINT
            FROM waitlist_users
            WHERE id = $1 AND campaign_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(entrant_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        position.ok_or_else(|| StoreError::NotFound(format!("entrant {}", entrant_id)))
    }

    async fn get_entrant_count(&self, campaign_id: Uuid) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM waitlist_users
            WHERE campaign_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn get_top_n_by_position(
        &self,
        campaign_id: Uuid,
        limit: u64,
    ) -> StoreResult<Vec<EntrantPosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, position::BIGINT AS position
            FROM waitlist_users
            WHERE campaign_id = $1 AND deleted_at IS NULL
            ORDER BY position ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(campaign_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(to_positions(rows))
    }

    async fn get_entrants_in_position_range(
        &self,
        campaign_id: Uuid,
        low: i64,
        high: i64,
    ) -> StoreResult<Vec<EntrantPosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, position::BIGINT AS position
            FROM waitlist_users
            WHERE campaign_id = $1
              AND deleted_at IS NULL
              AND position BETWEEN $2 AND $3
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await?;

        Ok(to_positions(rows))
    }

    async fn update_entrant_position(
        &self,
        campaign_id: Uuid,
        entrant_id: Uuid,
        position: i64,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE waitlist_users
            SET position = $3
            WHERE id = $1 AND campaign_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(entrant_id)
        .bind(campaign_id)
        .bind(position.max(1))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("entrant {}", entrant_id)));
        }
        Ok(())
    }

    async fn get_all_entrants_for_sync(
        &self,
        campaign_id: Uuid,
    ) -> StoreResult<Vec<EntrantPosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT id, position::BIGINT AS position
            FROM waitlist_users
            WHERE campaign_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(to_positions(rows))
    }
}

#[async_trait]
impl PositionRecalculator for PgRankingStore {
    async fn recalculate_positions(&self, campaign: &Campaign) -> StoreResult<u64> {
        let config = campaign.referral_config();
        let per_referral = config
            .positions_per_referral
            .clamp(0, MAX_POSITIONS_PER_REFERRAL);

        // Same scoring as services::score, then a dense rank over it.
        // Signup order breaks score ties.
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT id,
                       ROW_NUMBER() OVER (
                           ORDER BY GREATEST(
                                        1,
                                        original_position::BIGINT
                                          - GREATEST(
                                                0,
                                                CASE WHEN $2 THEN verified_referral_count
                                                     ELSE referral_count END
                                            )::BIGINT * $3
                                    ),
                                    original_position ASC,
                                    id ASC
                       ) AS new_position
                FROM waitlist_users
                WHERE campaign_id = $1 AND deleted_at IS NULL
            )
            UPDATE waitlist_users AS u
            SET position = ranked.new_position
            FROM ranked
            WHERE u.id = ranked.id
              AND u.position IS DISTINCT FROM ranked.new_position
            "#,
        )
        .bind(campaign.id)
        .bind(config.verified_only)
        .bind(per_referral)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TenantDirectory for PgRankingStore {
    async fn get_tenant(&self, tenant_id: Uuid) -> StoreResult<Tenant> {
        let enabled: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(cache_ranking_enabled, FALSE)
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        enabled
            .map(|cache_ranking_enabled| Tenant {
                id: tenant_id,
                cache_ranking_enabled,
            })
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", tenant_id)))
    }
}
