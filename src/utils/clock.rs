use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Single source of wall-clock and monotonic time for the tracker. Swapping
/// the implementation lets tests drive tick gaps without real sleeps.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    /// Current wall-clock moment in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic reference used for measuring the gap between ticks.
    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
