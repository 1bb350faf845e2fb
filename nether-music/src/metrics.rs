//! Feed health counters

use tracing::debug;

/// Counters for feed scheduler diagnostics
#[derive(Debug, Clone, Default)]
pub struct FeedMetrics {
    /// Ticks run since the last log
    pub ticks: u64,
    /// Decoded bytes queued to outputs
    pub bytes_queued: u64,
    /// Region transitions resolved (jumps and sequential advances)
    pub region_switches: u64,
    /// Fade clones placed in the fade sub-pool
    pub fade_clones_spawned: u64,
    /// Feeds that found their output starved and doubled the quota
    pub starved_feeds: u64,
    /// Tracks evicted by higher-priority requests
    pub evictions: u64,
    /// Tracks released after a resource failure
    pub resource_failures: u64,
    /// Ticks since the last log line
    ticks_since_log: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and reset counters every `interval` ticks (0 disables logging)
    ///
    /// Returns true if a summary was logged.
    pub fn maybe_log(&mut self, interval: u64) -> bool {
        self.ticks_since_log += 1;
        if interval == 0 || self.ticks_since_log < interval {
            return false;
        }

        debug!(
            "FEED METRICS: ticks={}, bytes={}, switches={}, fade_clones={}, starved={}, \
             evictions={}, failures={}",
            self.ticks,
            self.bytes_queued,
            self.region_switches,
            self.fade_clones_spawned,
            self.starved_feeds,
            self.evictions,
            self.resource_failures
        );

        // Reset counters for next interval
        *self = Self::default();
        true
    }
}
