//! services/api/src/security/rate_limit.rs
//!
//! Fixed-window request counters keyed by client address.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Windows are pruned once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Allows `max` hits per key in each `window`.
#[derive(Debug)]
pub struct RateLimiter {
    scope: &'static str,
    max: u32,
    window: Duration,
    message: String,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(scope: &'static str, max: u32, window: Duration, message: impl Into<String>) -> Self {
        Self {
            scope,
            max,
            window,
            message: message.into(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Counts one hit for `key`. On rejection returns the time until the window resets.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max {
            return Err(self.window - now.duration_since(entry.started));
        }
        entry.count += 1;
        Ok(())
    }
}
