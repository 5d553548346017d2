//! Spin primitives for the lock busy-wait loops

use std::time::Duration;

/// A single no-op step of a busy-wait loop
pub trait SpinWait: Send + Sync {
    fn pause(&self);
}

/// Sleeps for a fixed duration per pause; a zero duration yields the thread instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    duration: Duration,
}

impl FixedDelay {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::from_millis(bakehouse_common::DEFAULT_NO_OP_DURATION_MS)
    }
}

impl SpinWait for FixedDelay {
    fn pause(&self) {
        if self.duration.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.duration);
        }
    }
}
