use crate::app::ports::{PacingPort, SleepPort};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Backoff sleeps on the tokio timer
pub struct TokioSleep;

#[async_trait]
impl SleepPort for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniformly random pause between lookups
pub struct RandomPacing;

impl RandomPacing {
    pub fn pick(window_ms: (u64, u64)) -> Duration {
        let (low, high) = window_ms;
        if high <= low {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

#[async_trait]
impl PacingPort for RandomPacing {
    async fn pause(&self, window_ms: (u64, u64)) {
        let delay = Self::pick(window_ms);
        tokio::time::sleep(delay).await;
    }
}
