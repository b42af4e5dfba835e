use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::error::RankingError;

/// Owning organization of one or more campaigns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// Whether this tenant may use the sorted-set backend at all
    pub cache_ranking_enabled: bool,
}

/// Referral scoring parameters of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralConfig {
    pub positions_per_referral: i64,
    pub verified_only: bool,
}

impl ReferralConfig {
    pub const DEFAULT_POSITIONS_PER_REFERRAL: i64 = 1;

    /// Parse the JSONB `referral_config` column.
    ///
    /// Malformed fields fall back to their defaults instead of failing, so a bad
    /// campaign configuration can never break ranking.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut config = Self::default();
        let Some(obj) = value.as_object() else {
            if !value.is_null() {
                warn!(raw = %value, "referral_config is not an object, using defaults");
            }
            return config;
        };

        if let Some(raw) = obj.get("positions_per_referral") {
            match parse_integer(raw) {
                Some(n) => config.positions_per_referral = n,
                None => warn!(
                    raw = %raw,
                    "positions_per_referral is not numeric, using default"
                ),
            }
        }

        if let Some(raw) = obj.get("verified_only") {
            match raw.as_bool() {
                Some(b) => config.verified_only = b,
                None => warn!(raw = %raw, "verified_only is not a boolean, using false"),
            }
        }

        config
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            positions_per_referral: Self::DEFAULT_POSITIONS_PER_REFERRAL,
            verified_only: false,
        }
    }
}

fn parse_integer(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Waitlist campaign, owned by exactly one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub referral_config: Option<ReferralConfig>,
}

impl Campaign {
    /// Effective referral config (defaults when the campaign has none)
    pub fn referral_config(&self) -> ReferralConfig {
        self.referral_config.unwrap_or_default()
    }
}

/// Signed-up participant of a campaign waitlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Signup order, assigned once and never changed
    pub original_position: i64,
    pub referral_count: i64,
    pub verified_referral_count: i64,
    /// Persisted relational position (always >= 1)
    pub position: i64,
}

/// `{entrant_id, position}` pair read from the relational store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantPosition {
    pub entrant_id: Uuid,
    pub position: i64,
}

/// Transient ranking tuple returned by every ranking query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub entrant_id: Uuid,
    pub score: f64,
    /// 1-indexed, ascending by score
    pub rank: u64,
}

impl RankingEntry {
    /// Relational positions are dense ranks, so the position is both score and rank.
    pub fn from_position(row: EntrantPosition) -> Self {
        Self {
            entrant_id: row.entrant_id,
            score: row.position as f64,
            rank: row.position.max(1) as u64,
        }
    }
}

/// Backend that serves a ranking operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Persisted `position` column of the relational store
    Formula,
    /// Per-campaign sorted set
    Cache,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Formula => "formula",
            Backend::Cache => "cache",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedStrategy {
    Formula,
    Cache,
    #[default]
    Auto,
}

impl RequestedStrategy {
    /// Parse an optional request parameter, treating absence as `auto`.
    pub fn parse_optional(raw: Option<&str>) -> Result<Self, RankingError> {
        match raw {
            None => Ok(Self::Auto),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for RequestedStrategy {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "formula" => Ok(Self::Formula),
            // "redis" is the legacy name of the cache backend
            "cache" | "redis" => Ok(Self::Cache),
            "auto" | "" => Ok(Self::Auto),
            other => Err(RankingError::InvalidInput(format!(
                "unknown ranking strategy '{}', expected formula, cache or auto",
                other
            ))),
        }
    }
}
