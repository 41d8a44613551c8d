//! Telemetry session lifecycle and the periodic sampling task.

use super::observer::{ObserverRegistry, ReportOutcome, SubscriptionId, TelemetryObserver, TickEvent};
use super::sampler::{ResourceSample, ResourceSampler};
use super::usage::{CumulativeUsage, UsageTracker};
use crate::canonical::to_object;
use crate::config::TelemetryConfig;
use crate::error::LedgerError;
use crate::remote::{paths, RemoteApi};
use crate::store::{FileStore, Namespace};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Returned by [`TelemetryCollector::start`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub server_id: String,
    pub started_at: i64,
    pub interval_secs: f64,
    pub api_response: Option<Value>,
    pub remote_error: Option<String>,
}

/// One delivered usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub server_id: String,
    pub timestamp: i64,
    pub metrics: ResourceSample,
    pub response: Value,
}

/// Written to the store when a session stops, keyed by end timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub server_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_secs: f64,
    pub interval_secs: f64,
    pub final_sample: Option<ResourceSample>,
    pub totals: CumulativeUsage,
    pub api_response: Option<Value>,
    pub remote_error: Option<String>,
    /// Background task had to be aborted after the join timeout.
    pub aborted: bool,
}

struct RunningSession {
    started_at: i64,
    started: Instant,
    interval: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// State shared between the caller and the background task.
struct Shared {
    api: Arc<dyn RemoteApi>,
    sampler: Arc<dyn ResourceSampler>,
    server_id: RwLock<Option<String>>,
    usage: Mutex<UsageTracker>,
    active: AtomicBool,
    observers: ObserverRegistry,
}

impl Shared {
    fn server_id(&self) -> Result<String, LedgerError> {
        self.server_id.read().clone().ok_or_else(|| {
            LedgerError::Validation("No server id bound to the telemetry collector".to_string())
        })
    }

    async fn report(&self, sample: ResourceSample) -> Result<UsageReport, LedgerError> {
        let server_id = self.server_id()?;
        let timestamp = Utc::now().timestamp();
        let body = json!({
            "server_id": server_id,
            "timestamp": timestamp,
            "metrics": sample,
        });
        let response = self.api.post(paths::MINING_REPORT, &body).await?;
        Ok(UsageReport {
            server_id,
            timestamp,
            metrics: sample,
            response,
        })
    }

    async fn tick(&self, interval: Duration) {
        let sample = match self.sampler.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Resource sampling failed, skipping tick");
                return;
            }
        };
        let cumulative = {
            let mut usage = self.usage.lock();
            usage.record(&sample, interval.as_secs_f64());
            usage.totals()
        };

        let report = match self.report(sample).await {
            Ok(report) => ReportOutcome::Delivered {
                response: report.response,
            },
            Err(e) => {
                warn!(error = %e, "Usage report failed");
                ReportOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let event = TickEvent {
            server_id: self.server_id.read().clone().unwrap_or_default(),
            timestamp: Utc::now().timestamp(),
            sample,
            cumulative,
            report,
        };
        debug!(cpu_seconds = cumulative.cpu_seconds, "Telemetry tick");
        self.observers.notify(&event);
    }
}

async fn run_loop(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !shared.active.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.tick(interval) => {}
        }
    }
    debug!("Telemetry loop exited");
}

/// Periodic resource sampler and reporter for one server identity.
///
/// At most one session is active at a time, driven by exactly one background
/// task. Cumulative totals and the active flag are shared with that task
/// behind a mutex and an atomic.
pub struct TelemetryCollector {
    shared: Arc<Shared>,
    session: Mutex<Option<RunningSession>>,
    store: FileStore,
    default_interval: Duration,
    join_timeout: Duration,
}

impl TelemetryCollector {
    pub fn new(
        store: FileStore,
        api: Arc<dyn RemoteApi>,
        sampler: Arc<dyn ResourceSampler>,
        config: &TelemetryConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                sampler,
                server_id: RwLock::new(config.server_id.clone()),
                usage: Mutex::new(UsageTracker::default()),
                active: AtomicBool::new(false),
                observers: ObserverRegistry::default(),
            }),
            session: Mutex::new(None),
            store,
            default_interval: Duration::from_secs(config.interval_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
        }
    }

    /// Bind the server identity. Not allowed while a session is active.
    pub fn bind(&self, server_id: &str) -> Result<(), LedgerError> {
        if server_id.trim().is_empty() {
            return Err(LedgerError::Validation("Server id cannot be blank".to_string()));
        }
        if self.is_active() {
            return Err(LedgerError::Validation(
                "Cannot rebind while a telemetry session is active".to_string(),
            ));
        }
        *self.shared.server_id.write() = Some(server_id.to_string());
        Ok(())
    }

    pub fn server_id(&self) -> Option<String> {
        self.shared.server_id.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Configured sampling interval.
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Snapshot of the running totals.
    pub fn cumulative(&self) -> CumulativeUsage {
        self.shared.usage.lock().totals()
    }

    pub fn subscribe(&self, observer: Arc<dyn TelemetryObserver>) -> SubscriptionId {
        self.shared.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Begin a session: reset totals, notify the API, spawn the sampling task.
    ///
    /// Fails without a bound server id, with a zero interval, or while a
    /// session is already active. A failed start notification is logged and
    /// reported in the result; the session still starts. A `stop` that lands
    /// while the notification is in flight ends the session and this call
    /// returns an error without spawning the sampling task.
    pub async fn start(&self, interval: Duration) -> Result<SessionStart, LedgerError> {
        let server_id = self.shared.server_id()?;
        if interval.is_zero() {
            return Err(LedgerError::Validation(
                "Telemetry interval must be greater than zero".to_string(),
            ));
        }
        if self
            .shared
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LedgerError::Validation(
                "A telemetry session is already active".to_string(),
            ));
        }

        let baseline = match self.shared.sampler.sample() {
            Ok(sample) => Some(sample.network),
            Err(e) => {
                warn!(error = %e, "Baseline sample failed, first network delta will be zero");
                None
            }
        };
        *self.shared.usage.lock() = UsageTracker::with_baseline(baseline);

        let started_at = Utc::now().timestamp();
        let started = Instant::now();
        let cancel = CancellationToken::new();
        *self.session.lock() = Some(RunningSession {
            started_at,
            started,
            interval,
            cancel: cancel.clone(),
            handle: None,
        });

        let body = json!({
            "server_id": server_id,
            "timestamp": started_at,
            "interval": interval.as_secs_f64(),
        });
        let (api_response, remote_error) = match self.shared.api.post(paths::MINING_START, &body).await {
            Ok(response) => (Some(response), None),
            Err(e) => {
                warn!(error = %e, "Failed to register session start with API");
                (None, Some(e.to_string()))
            }
        };

        // A stop that ran during the start notification owns the session now.
        {
            let mut session = self.session.lock();
            match session.as_mut() {
                Some(running) if !cancel.is_cancelled() => {
                    running.handle = Some(tokio::spawn(run_loop(
                        self.shared.clone(),
                        interval,
                        cancel.clone(),
                    )));
                }
                _ => {
                    warn!(server_id = %server_id, "Telemetry session stopped before it finished starting");
                    return Err(LedgerError::Validation(
                        "Telemetry session was stopped while starting".to_string(),
                    ));
                }
            }
        }

        info!(server_id = %server_id, interval_secs = interval.as_secs_f64(), "Telemetry session started");
        Ok(SessionStart {
            server_id,
            started_at,
            interval_secs: interval.as_secs_f64(),
            api_response,
            remote_error,
        })
    }

    /// Report a sample now, outside the periodic loop. Samples the host when
    /// `sample` is `None`. A failed report is returned as an error.
    pub async fn report_usage(
        &self,
        sample: Option<ResourceSample>,
    ) -> Result<UsageReport, LedgerError> {
        self.shared.server_id()?;
        let sample = match sample {
            Some(sample) => sample,
            None => self.shared.sampler.sample()?,
        };
        self.shared.report(sample).await
    }

    /// End the session: stop the task (bounded wait), report final metrics,
    /// persist the session report and reset the totals.
    pub async fn stop(&self) -> Result<SessionReport, LedgerError> {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Validation(
                "No active telemetry session".to_string(),
            ));
        }
        let session = self.session.lock().take();
        let server_id = self.shared.server_id.read().clone().unwrap_or_default();

        let (start_time, started, interval, aborted) = match session {
            Some(mut session) => {
                session.cancel.cancel();
                let aborted = match session.handle.take() {
                    Some(handle) => self.join_task(handle).await,
                    None => false,
                };
                (session.started_at, session.started, session.interval, aborted)
            }
            None => (Utc::now().timestamp(), Instant::now(), self.default_interval, false),
        };

        let final_sample = match self.shared.sampler.sample() {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(error = %e, "Final sample failed");
                None
            }
        };
        let totals = self.cumulative();
        let end_time = Utc::now().timestamp();
        let duration_secs = started.elapsed().as_secs_f64();

        let mut final_metrics = match &final_sample {
            Some(sample) => to_object(sample)?,
            None => serde_json::Map::new(),
        };
        final_metrics.extend(to_object(&totals)?);
        let body = json!({
            "server_id": server_id,
            "start_time": start_time,
            "end_time": end_time,
            "duration": duration_secs,
            "final_metrics": final_metrics,
        });
        let (api_response, remote_error) = match self.shared.api.post(paths::MINING_STOP, &body).await {
            Ok(response) => (Some(response), None),
            Err(e) => {
                warn!(error = %e, "Failed to register session stop with API");
                (None, Some(e.to_string()))
            }
        };

        let report = SessionReport {
            server_id,
            start_time,
            end_time,
            duration_secs,
            interval_secs: interval.as_secs_f64(),
            final_sample,
            totals,
            api_response,
            remote_error,
            aborted,
        };
        self.store.put(
            Namespace::Telemetry,
            &format!("mining-report-{}", end_time),
            &report,
        )?;
        *self.shared.usage.lock() = UsageTracker::default();

        info!(duration_secs, cpu_seconds = totals.cpu_seconds, "Telemetry session stopped");
        Ok(report)
    }

    /// Wait for the task up to the join timeout, aborting it past that.
    /// Returns whether it had to be aborted.
    async fn join_task(&self, mut handle: JoinHandle<()>) -> bool {
        match tokio::time::timeout(self.join_timeout, &mut handle).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                error!(error = %e, "Telemetry task ended abnormally");
                false
            }
            Err(_) => {
                warn!(timeout_secs = self.join_timeout.as_secs_f64(), "Telemetry task did not stop in time, aborting");
                handle.abort();
                true
            }
        }
    }
}

impl Drop for TelemetryCollector {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}
