//! Typed tick observers.

use super::sampler::ResourceSample;
use super::usage::CumulativeUsage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// What happened to the remote report of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    Delivered { response: Value },
    Failed { error: String },
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered { .. })
    }
}

/// Delivered to every observer after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    pub server_id: String,
    pub timestamp: i64,
    pub sample: ResourceSample,
    pub cumulative: CumulativeUsage,
    pub report: ReportOutcome,
}

/// Receives tick events. Errors and panics are logged and never stop the loop.
pub trait TelemetryObserver: Send + Sync {
    fn on_tick(&self, event: &TickEvent) -> anyhow::Result<()>;
}

impl<F> TelemetryObserver for F
where
    F: Fn(&TickEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_tick(&self, event: &TickEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn TelemetryObserver>)>>,
}

impl ObserverRegistry {
    pub fn subscribe(&self, observer: Arc<dyn TelemetryObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Call every observer in subscription order.
    pub fn notify(&self, event: &TickEvent) {
        // Snapshot so observers may (un)subscribe from inside on_tick.
        let observers: Vec<_> = self.observers.read().clone();
        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_tick(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(subscription = ?id, error = %e, "Telemetry observer failed"),
                Err(_) => error!(subscription = ?id, "Telemetry observer panicked"),
            }
        }
    }
}
