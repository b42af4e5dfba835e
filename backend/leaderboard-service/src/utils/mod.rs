/// Caller-supplied deadlines for cache and database round trips
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Absolute point in time by which a request must finish.
///
/// One deadline is shared by every store call issued on behalf of a single
/// request, so a slow first call leaves less budget for the fallback.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Deadline ending at the earlier of `self` and `max` from now
    pub fn capped(&self, max: Duration) -> Deadline {
        let now = Instant::now();
        let at = self.at.min(now + max);
        Deadline {
            at,
            budget: at.saturating_duration_since(now),
        }
    }

    /// Drive `future` to completion unless the deadline passes first
    pub async fn run<F, T>(&self, future: F) -> Result<T, DeadlineExceeded>
    where
        F: Future<Output = T>,
    {
        timeout_at(self.at, future)
            .await
            .map_err(|_| DeadlineExceeded(self.budget))
    }
}
