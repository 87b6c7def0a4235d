//! Demo mode: anonymous analyses throttled by an in-memory limiter.

pub mod handlers;
pub mod middleware;
pub mod rate_limit;

pub use rate_limit::DemoRateLimiter;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

/// How often stale demo counters are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawns the background task that prunes the limiter every hour.
pub fn spawn_sweeper(limiter: Arc<DemoRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        // First tick completes immediately; nothing to sweep yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep(Utc::now());
        }
    })
}
