//! Client-side request rate limiting
//!
//! A sliding-window limiter shared by every request an [`ApiClient`] issues.
//! Unlike a server-side limiter it never rejects: a caller over the limit
//! waits until the oldest request in the window ages out.
//!
//! [`ApiClient`]: crate::ApiClient

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Allows at most `max_requests` per sliding `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    // Start times of requests still inside the window, oldest first
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_requests` must be at least 1
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait for a slot in the window and claim it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while issued
                    .front()
                    .is_some_and(|&started| now.duration_since(started) >= self.window)
                {
                    issued.pop_front();
                }

                if issued.len() < self.max_requests {
                    issued.push_back(now);
                    return;
                }

                match issued.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests currently counted against the window
    pub fn in_window(&self) -> usize {
        let issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        issued
            .iter()
            .filter(|&&started| now.duration_since(started) < self.window)
            .count()
    }
}
