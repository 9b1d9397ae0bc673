//! Mutable agent state shared by the scheduler, listener and publisher

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Payloads accepted by the session
    pub delivered: u64,
    /// Payloads refused or never handed over
    pub failed: u64,
}

impl PublishStats {
    pub fn record(&mut self, delivered: bool) {
        if delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.delivered + self.failed
    }
}

/// State threaded through every tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentContext {
    /// Set by the command listener, cleared after the next publish cycle
    pub force_update: bool,
    /// Clock reading of the last publish cycle; 0 until the first one
    pub last_publish_ms: u64,
    pub stats: PublishStats,
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }
}
