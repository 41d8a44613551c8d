//! Cumulative usage accounting across ticks of one session.

use super::sampler::{NetworkSample, ResourceSample};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CumulativeUsage {
    pub cpu_seconds: f64,
    pub memory_mb_seconds: f64,
    pub network_bytes: u64,
    /// Reported for wire compatibility; nothing increments it.
    pub storage_bytes: u64,
}

/// Running totals plus the network baseline for the next delta.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    totals: CumulativeUsage,
    last_network: Option<NetworkSample>,
}

impl UsageTracker {
    /// Fresh totals with network deltas measured from `baseline`.
    pub fn with_baseline(baseline: Option<NetworkSample>) -> Self {
        Self {
            totals: CumulativeUsage::default(),
            last_network: baseline,
        }
    }

    /// Fold one sample covering `interval_secs` into the totals.
    ///
    /// Without a baseline the first sample only establishes one. Counters
    /// that went backwards (interface reset) contribute nothing.
    pub fn record(&mut self, sample: &ResourceSample, interval_secs: f64) {
        self.totals.cpu_seconds +=
            sample.cpu.percent * interval_secs * f64::from(sample.cpu.cores) / 100.0;
        self.totals.memory_mb_seconds += sample.memory.used_mb * interval_secs;

        if let Some(previous) = self.last_network {
            let sent = sample.network.bytes_sent.saturating_sub(previous.bytes_sent);
            let recv = sample.network.bytes_recv.saturating_sub(previous.bytes_recv);
            self.totals.network_bytes = self.totals.network_bytes.saturating_add(sent + recv);
        }
        self.last_network = Some(sample.network);
    }

    pub fn totals(&self) -> CumulativeUsage {
        self.totals
    }
}
