pub mod hybrid;
pub mod score;
pub mod strategy;

pub use hybrid::{
    HybridRankingService, Ranked, RankingContext, ScoreUpdate, SecondaryWrite, SyncReport,
    TopNPage, DEFAULT_CACHE_TIMEOUT,
};
pub use score::{entrant_score, score};
pub use strategy::{Selection, SelectionReason, StrategySelector, DEFAULT_CACHE_THRESHOLD};
