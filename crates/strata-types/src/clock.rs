use std::sync::atomic::{AtomicU64, Ordering};

/// Source of version timestamps, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Deterministic clock for tests: starts at a fixed instant and advances by
/// `step` milliseconds on every reading.
#[derive(Debug)]
pub struct FixedClock {
    next: AtomicU64,
    step: u64,
}

impl FixedClock {
    /// A clock that always reports `millis`.
    pub fn new(millis: u64) -> Self {
        Self::stepping(millis, 0)
    }

    /// A clock that reports `start`, `start + step`, `start + 2 * step`, ...
    pub fn stepping(start: u64, step: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
            step,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}
