//! Monotonic time and waiting
//!
//! The scheduler reads a millisecond tick count and the connection manager
//! waits between retries. Both go through these traits so tests can drive
//! time by hand.

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Monotonic millisecond tick source
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was started
    fn now_ms(&self) -> u64;
}

/// Wall-clock implementation counting from construction, like an uptime
/// counter
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Waits between retries and ticks
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
