// src/generate/limiter.rs
//! Per-provider call limiter: a concurrency bound plus a sliding one-minute
//! call window.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    slots: Arc<Semaphore>,
    calls_per_minute: usize,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(concurrency: usize, calls_per_minute: u32) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            calls_per_minute: (calls_per_minute as usize).max(1),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a concurrency slot and a free spot in the call window. The
    /// returned permit holds the concurrency slot until dropped.
    pub async fn acquire(&self) -> anyhow::Result<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .context("rate limiter closed")?;
        loop {
            let wait = {
                let mut recent = self.recent.lock().await;
                let now = Instant::now();
                while recent.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
                    recent.pop_front();
                }
                if recent.len() < self.calls_per_minute {
                    recent.push_back(now);
                    return Ok(permit);
                }
                match recent.front() {
                    Some(oldest) => (*oldest + WINDOW).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };
            debug!(target: "generate", wait_ms = wait.as_millis() as u64, "rate limit reached");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_delays_calls_over_the_limit() {
        let limiter = RateLimiter::new(4, 2);
        let start = Instant::now();
        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
        drop(limiter.acquire().await.unwrap());
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test]
    async fn permit_bounds_concurrency() {
        let limiter = RateLimiter::new(1, 100);
        let held = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available_slots(), 0);
        drop(held);
        assert_eq!(limiter.available_slots(), 1);
    }
}
