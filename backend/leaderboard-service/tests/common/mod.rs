#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use leaderboard_service::error::{CacheError, CacheResult, StoreError, StoreResult};
use leaderboard_service::models::{
    Campaign, Entrant, EntrantPosition, RankingEntry, ReferralConfig, Tenant,
};
use leaderboard_service::repository::{
    LeaderboardKey, PositionRecalculator, RelationalRankingStore, SortedSetStore, TenantDirectory,
};
use leaderboard_service::services::entrant_score;

/// In-memory relational store with dense positions
#[derive(Default)]
pub struct InMemoryRankingStore {
    tenants: Mutex<HashMap<Uuid, Tenant>>,
    campaigns: Mutex<HashMap<Uuid, Campaign>>,
    entrants: Mutex<HashMap<Uuid, Vec<Entrant>>>,
    pub failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryRankingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_tenant(&self, cache_ranking_enabled: bool) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4(),
            cache_ranking_enabled,
        };
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.id, tenant.clone());
        tenant
    }

    pub fn add_campaign(&self, tenant: &Tenant, config: Option<ReferralConfig>) -> Campaign {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            referral_config: config,
        };
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign.id, campaign.clone());
        campaign
    }

    /// Sign up a new entrant at the end of the waitlist
    pub fn add_entrant(&self, campaign: &Campaign, referrals: i64, verified: i64) -> Entrant {
        let mut all = self.entrants.lock().unwrap();
        let list = all.entry(campaign.id).or_default();
        let original_position = list.len() as i64 + 1;
        let entrant = Entrant {
            id: Uuid::new_v4(),
            campaign_id: campaign.id,
            original_position,
            referral_count: referrals,
            verified_referral_count: verified,
            position: original_position,
        };
        list.push(entrant.clone());
        entrant
    }

    pub fn set_referrals(&self, campaign_id: Uuid, entrant_id: Uuid, referrals: i64) -> Entrant {
        let mut all = self.entrants.lock().unwrap();
        let entrant = all
            .get_mut(&campaign_id)
            .and_then(|list| list.iter_mut().find(|e| e.id == entrant_id))
            .expect("entrant exists");
        entrant.referral_count = referrals;
        entrant.verified_referral_count = referrals;
        entrant.clone()
    }

    pub fn entrants(&self, campaign_id: Uuid) -> Vec<Entrant> {
        self.entrants
            .lock()
            .unwrap()
            .get(&campaign_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn io(&self) -> StoreResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn positions(&self, campaign_id: Uuid) -> Vec<EntrantPosition> {
        let mut rows: Vec<EntrantPosition> = self
            .entrants(campaign_id)
            .into_iter()
            .map(|e| EntrantPosition {
                entrant_id: e.id,
                position: e.position,
            })
            .collect();
        rows.sort_by_key(|row| (row.position, row.entrant_id));
        rows
    }
}

#[async_trait]
impl RelationalRankingStore for InMemoryRankingStore {
    async fn get_campaign(&self, tenant_id: Uuid, campaign_id: Uuid) -> StoreResult<Campaign> {
        self.io().await?;
        self.campaigns
            .lock()
            .unwrap()
            .get(&campaign_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("campaign {}", campaign_id)))
    }

    async fn get_entrant(&self, campaign_id: Uuid, entrant_id: Uuid) -> StoreResult<Entrant> {
        self.io().await?;
        self.entrants(campaign_id)
            .into_iter()
            .find(|e| e.id == entrant_id)
            .ok_or_else(|| StoreError::NotFound(format!("entrant {}", entrant_id)))
    }

    async fn get_entrant_position(
        &self,
        campaign_id: Uuid,
        entrant_id: Uuid,
    ) -> StoreResult<i64> {
        Ok(self.get_entrant(campaign_id, entrant_id).await?.position)
    }

    async fn get_entrant_count(&self, campaign_id: Uuid) -> StoreResult<u64> {
        self.io().await?;
        Ok(self.entrants(campaign_id).len() as u64)
    }

    async fn get_top_n_by_position(
        &self,
        campaign_id: Uuid,
        limit: u64,
    ) -> StoreResult<Vec<EntrantPosition>> {
        self.io().await?;
        Ok(self
            .positions(campaign_id)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn get_entrants_in_position_range(
        &self,
        campaign_id: Uuid,
        low: i64,
        high: i64,
    ) -> StoreResult<Vec<EntrantPosition>> {
        self.io().await?;
        Ok(self
            .positions(campaign_id)
            .into_iter()
            .filter(|row| row.position >= low && row.position <= high)
            .collect())
    }

    async fn update_entrant_position(
        &self,
        campaign_id: Uuid,
        entrant_id: Uuid,
        position: i64,
    ) -> StoreResult<()> {
        self.io().await?;
        let mut all = self.entrants.lock().unwrap();
        let entrant = all
            .get_mut(&campaign_id)
            .and_then(|list| list.iter_mut().find(|e| e.id == entrant_id))
            .ok_or_else(|| StoreError::NotFound(format!("entrant {}", entrant_id)))?;
        entrant.position = position.max(1);
        Ok(())
    }

    async fn get_all_entrants_for_sync(
        &self,
        campaign_id: Uuid,
    ) -> StoreResult<Vec<EntrantPosition>> {
        self.io().await?;
        Ok(self.positions(campaign_id))
    }
}

#[async_trait]
impl PositionRecalculator for InMemoryRankingStore {
    async fn recalculate_positions(&self, campaign: &Campaign) -> StoreResult<u64> {
        self.io().await?;
        let config = campaign.referral_config();
        let mut all = self.entrants.lock().unwrap();
        let list = all.entry(campaign.id).or_default();

        list.sort_by_key(|e| (entrant_score(e, &config), e.original_position, e.id));
        let mut changed = 0;
        for (index, entrant) in list.iter_mut().enumerate() {
            let position = index as i64 + 1;
            if entrant.position != position {
                entrant.position = position;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryRankingStore {
    async fn get_tenant(&self, tenant_id: Uuid) -> StoreResult<Tenant> {
        self.io().await?;
        self.tenants
            .lock()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tenant {}", tenant_id)))
    }
}

/// In-memory sorted set with Redis ordering (score, then member bytes)
pub struct InMemorySortedSet {
    sets: Mutex<HashMap<String, HashMap<Uuid, f64>>>,
    enabled: bool,
    pub available: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl InMemorySortedSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_enabled(true))
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self::with_enabled(false))
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            enabled,
            available: AtomicBool::new(true),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Members of a set in rank order
    pub fn snapshot(&self, key: &LeaderboardKey) -> Vec<(Uuid, f64)> {
        let sets = self.sets.lock().unwrap();
        let mut members: Vec<(Uuid, f64)> = sets
            .get(key.as_str())
            .map(|set| set.iter().map(|(id, score)| (*id, *score)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
        });
        members
    }

    async fn io(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.enabled {
            return Err(CacheError::BackendUnavailable("not configured".to_string()));
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::BackendUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn ranked(&self, key: &LeaderboardKey) -> Vec<RankingEntry> {
        self.snapshot(key)
            .into_iter()
            .enumerate()
            .map(|(index, (entrant_id, score))| RankingEntry {
                entrant_id,
                score,
                rank: index as u64 + 1,
            })
            .collect()
    }
}

#[async_trait]
impl SortedSetStore for InMemorySortedSet {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn upsert(&self, key: &LeaderboardKey, entrant_id: Uuid, score: f64) -> CacheResult<()> {
        self.io().await?;
        self.sets
            .lock()
            .unwrap()
            .entry(key.as_str().to_string())
            .or_default()
            .insert(entrant_id, score);
        Ok(())
    }

    async fn rank(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<RankingEntry> {
        self.io().await?;
        self.ranked(key)
            .into_iter()
            .find(|entry| entry.entrant_id == entrant_id)
            .ok_or(CacheError::NotFound(entrant_id))
    }

    async fn top_n(&self, key: &LeaderboardKey, limit: u64) -> CacheResult<Vec<RankingEntry>> {
        self.io().await?;
        Ok(self.ranked(key).into_iter().take(limit as usize).collect())
    }

    async fn around(
        &self,
        key: &LeaderboardKey,
        entrant_id: Uuid,
        radius: u64,
    ) -> CacheResult<Vec<RankingEntry>> {
        let pivot = self.rank(key, entrant_id).await?;
        let low = pivot.rank.saturating_sub(radius).max(1);
        let high = pivot.rank.saturating_add(radius);
        Ok(self
            .ranked(key)
            .into_iter()
            .filter(|entry| entry.rank >= low && entry.rank <= high)
            .collect())
    }

    async fn count(&self, key: &LeaderboardKey) -> CacheResult<u64> {
        self.io().await?;
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key.as_str())
            .map_or(0, |set| set.len() as u64))
    }

    async fn remove(&self, key: &LeaderboardKey, entrant_id: Uuid) -> CacheResult<()> {
        self.io().await?;
        if let Some(set) = self.sets.lock().unwrap().get_mut(key.as_str()) {
            set.remove(&entrant_id);
        }
        Ok(())
    }

    async fn bulk_load(&self, key: &LeaderboardKey, entries: Vec<(Uuid, f64)>) -> CacheResult<()> {
        self.io().await?;
        self.sets
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), entries.into_iter().collect());
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.io().await
    }
}
