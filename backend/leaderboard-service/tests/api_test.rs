mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{InMemoryRankingStore, InMemorySortedSet};
use leaderboard_service::api::ApiLimits;
use leaderboard_service::models::{Campaign, ReferralConfig, Tenant};
use leaderboard_service::repository::PositionRecalculator;
use leaderboard_service::{HybridRankingService, LeaderboardApi, RankingError, StrategySelector};
use uuid::Uuid;

struct Harness {
    api: LeaderboardApi,
    relational: Arc<InMemoryRankingStore>,
    tenant: Tenant,
    campaign: Campaign,
}

async fn harness(cache_allowed: bool, entrants: i64) -> Harness {
    let relational = InMemoryRankingStore::new();
    let cache = InMemorySortedSet::new();
    let tenant = relational.add_tenant(cache_allowed);
    let campaign = relational.add_campaign(
        &tenant,
        Some(ReferralConfig {
            positions_per_referral: 3,
            verified_only: true,
        }),
    );
    for i in 0..entrants {
        relational.add_entrant(&campaign, i % 4, i % 3);
    }
    relational.recalculate_positions(&campaign).await.unwrap();

    let service = Arc::new(HybridRankingService::new(
        cache,
        relational.clone(),
        relational.clone(),
        StrategySelector::new(5),
    ));
    let limits = ApiLimits {
        max_limit: 50,
        max_radius: 10,
        request_timeout: Duration::from_secs(2),
        sync_timeout: Duration::from_secs(10),
    };
    let api = LeaderboardApi::new(service, relational.clone(), limits);

    Harness {
        api,
        relational,
        tenant,
        campaign,
    }
}

#[tokio::test]
async fn test_get_rank_response_shape() {
    let h = harness(true, 3).await;
    let entrant = h.relational.entrants(h.campaign.id)[0].clone();

    let response = h
        .api
        .get_rank(h.tenant.id, h.campaign.id, entrant.id, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["strategy_used"], "formula");
    assert_eq!(json["rank"], entrant.position);
    assert_eq!(json["entrant_id"], entrant.id.to_string());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_top_n_reports_cache_after_sync() {
    let h = harness(true, 12).await;
    let synced = h.api.sync_to_cache(h.tenant.id, h.campaign.id).await.unwrap();
    assert!(synced.success);

    let response = h
        .api
        .get_top_n(h.tenant.id, h.campaign.id, 4, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["strategy_used"], "cache");
    assert_eq!(json["total"], 12);
    assert_eq!(json["entries"].as_array().unwrap().len(), 4);
    assert_eq!(json["entries"][0]["rank"], 1);
}

#[tokio::test]
async fn test_legacy_redis_strategy_name() {
    let h = harness(true, 2).await;
    h.api.sync_to_cache(h.tenant.id, h.campaign.id).await.unwrap();
    let entrant = h.relational.entrants(h.campaign.id)[1].clone();

    let response = h
        .api
        .get_rank(h.tenant.id, h.campaign.id, entrant.id, Some("redis"))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap()["strategy_used"],
        "cache"
    );
}

#[tokio::test]
async fn test_unknown_strategy_rejected() {
    let h = harness(true, 2).await;
    let err = h
        .api
        .get_rank(h.tenant.id, h.campaign.id, Uuid::new_v4(), Some("fastest"))
        .await
        .unwrap_err();

    assert!(matches!(err, RankingError::InvalidInput(_)));
}

#[tokio::test]
async fn test_limit_and_radius_validation() {
    let h = harness(true, 2).await;
    let entrant = h.relational.entrants(h.campaign.id)[0].clone();

    for limit in [0, 51] {
        let err = h
            .api
            .get_top_n(h.tenant.id, h.campaign.id, limit, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RankingError::InvalidInput(_)));
    }

    let err = h
        .api
        .get_around(h.tenant.id, h.campaign.id, entrant.id, 11, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::InvalidInput(_)));

    let ok = h
        .api
        .get_around(h.tenant.id, h.campaign.id, entrant.id, 0, None)
        .await
        .unwrap();
    assert_eq!(ok.entries.len(), 1);
    assert_eq!(ok.entries[0].entrant_id, entrant.id);
}

#[tokio::test]
async fn test_sync_refused_without_capability() {
    let h = harness(false, 4).await;
    let err = h
        .api
        .sync_to_cache(h.tenant.id, h.campaign.id)
        .await
        .unwrap_err();

    assert!(matches!(err, RankingError::CacheNotPermitted(id) if id == h.tenant.id));
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let h = harness(true, 1).await;

    let err = h
        .api
        .get_rank(Uuid::new_v4(), h.campaign.id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::NotFound(_)));

    let err = h
        .api
        .get_rank(h.tenant.id, Uuid::new_v4(), Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::NotFound(_)));

    let err = h
        .api
        .get_rank(h.tenant.id, h.campaign.id, Uuid::new_v4(), Some("formula"))
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::NotFound(_)));
}

#[tokio::test]
async fn test_update_score_and_remove() {
    let h = harness(true, 8).await;
    h.api.sync_to_cache(h.tenant.id, h.campaign.id).await.unwrap();
    let entrant = h.relational.entrants(h.campaign.id)[5].clone();

    let updated = h
        .api
        .update_score(h.tenant.id, h.campaign.id, entrant.id, None)
        .await
        .unwrap();
    assert!(updated.success);
    assert_eq!(
        serde_json::to_value(&updated).unwrap()["strategy_used"],
        "cache"
    );

    let removed = h
        .api
        .remove_entrant(h.tenant.id, h.campaign.id, entrant.id)
        .await
        .unwrap();
    assert!(removed.removed_from_cache);

    let err = h
        .api
        .get_rank(h.tenant.id, h.campaign.id, entrant.id, Some("cache"))
        .await
        .unwrap_err();
    assert!(matches!(err, RankingError::NotFound(_)));
}
