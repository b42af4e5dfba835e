pub mod cache_health;
