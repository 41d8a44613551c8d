//! Host resource telemetry: sampling, cumulative usage, session lifecycle
//! and tick observers.

mod collector;
mod observer;
mod sampler;
mod usage;

pub use collector::{SessionReport, SessionStart, TelemetryCollector, UsageReport};
pub use observer::{ReportOutcome, SubscriptionId, TelemetryObserver, TickEvent};
pub use sampler::{
    CpuSample, DiskSample, MemorySample, NetworkSample, ResourceSample, ResourceSampler,
    SystemSampler,
};
pub use usage::{CumulativeUsage, UsageTracker};
