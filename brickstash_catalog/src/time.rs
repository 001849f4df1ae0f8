//! Injectable wall clock, so freshness checks are testable.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of "now" for freshness decisions and `lastUpdate` stamps.
pub trait TimeProvider: std::fmt::Debug + Send + Sync {
    /// Current time as epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// [`TimeProvider`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// [`TimeProvider`] pinned to a settable instant, for tests.
#[derive(Debug, Default)]
pub struct MockProvider {
    now_ms: AtomicI64,
}

impl MockProvider {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeProvider for MockProvider {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
