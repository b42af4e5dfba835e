pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;
pub mod workers;

pub use api::LeaderboardApi;
pub use config::Config;
pub use error::{CacheError, RankingError, StoreError};
pub use services::{HybridRankingService, StrategySelector};
