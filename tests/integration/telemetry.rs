//! Telemetry sessions on a paused clock

use crate::integration::test_utils::{temp_store, FakeRemoteApi, FakeSampler, Reply};
use async_trait::async_trait;
use metanode_ledger::config::TelemetryConfig;
use metanode_ledger::error::{ErrorKind, LedgerError};
use metanode_ledger::remote::{paths, RemoteApi};
use metanode_ledger::store::{FileStore, Namespace};
use metanode_ledger::telemetry::{SessionReport, TelemetryCollector, TickEvent};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn collector(
    store: FileStore,
    server_id: Option<&str>,
) -> (TelemetryCollector, Arc<FakeRemoteApi>, Arc<FakeSampler>) {
    let api = FakeRemoteApi::new();
    api.on_post(paths::MINING_START, Reply::Ok(json!({"status": "started"})));
    api.on_post(paths::MINING_REPORT, Reply::Ok(json!({"status": "ok"})));
    api.on_post(paths::MINING_STOP, Reply::Ok(json!({"status": "stopped"})));
    let sampler = FakeSampler::new(50.0, 2, 512.0);
    let config = TelemetryConfig {
        server_id: server_id.map(str::to_string),
        interval_secs: 1,
        join_timeout_secs: 5,
    };
    let collector = TelemetryCollector::new(store, api.clone(), sampler.clone(), &config);
    (collector, api, sampler)
}

/// Holds the start notification until the test opens the gate.
struct GatedApi {
    inner: Arc<FakeRemoteApi>,
    gate: Notify,
}

#[async_trait]
impl RemoteApi for GatedApi {
    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        self.inner.get(path).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LedgerError> {
        if path == paths::MINING_START {
            self.gate.notified().await;
        }
        self.inner.post(path, body).await
    }
}

fn record_ticks(collector: &TelemetryCollector) -> Arc<Mutex<Vec<TickEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    collector.subscribe(Arc::new(move |event: &TickEvent| -> anyhow::Result<()> {
        sink.lock().push(event.clone());
        Ok(())
    }));
    events
}

#[tokio::test]
async fn test_start_without_identity_fails() {
    let (_dir, store) = temp_store();
    let (collector, api, _) = collector(store, None);

    let err = collector.start(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!collector.is_active());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let (_dir, store) = temp_store();
    let (collector, _, _) = collector(store, Some("srv-1"));
    let err = collector.start(Duration::ZERO).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!collector.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_ticks_accumulate_cpu_seconds() {
    let (_dir, store) = temp_store();
    let (collector, api, _) = collector(store, Some("srv-1"));
    let events = record_ticks(&collector);

    let start = collector.start(Duration::from_secs(1)).await.unwrap();
    assert_eq!(start.server_id, "srv-1");
    assert!(start.remote_error.is_none());

    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let totals = collector.cumulative();
    assert!(totals.cpu_seconds > 0.0);
    let ticks = events.lock().len();
    assert!(ticks >= 2, "expected at least two ticks, saw {}", ticks);
    // 50% of 2 cores for 1 second per tick.
    assert!((totals.cpu_seconds - ticks as f64).abs() < 1e-9);
    assert!((totals.memory_mb_seconds - 512.0 * ticks as f64).abs() < 1e-9);
    assert_eq!(totals.network_bytes, 200 * ticks as u64);
    assert_eq!(api.posts_to(paths::MINING_REPORT).len(), ticks);

    let last = events.lock().last().cloned().unwrap();
    assert!(last.report.is_delivered());
    assert_eq!(last.cumulative, totals);

    collector.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_rejected() {
    let (_dir, store) = temp_store();
    let (collector, _, _) = collector(store, Some("srv-1"));
    collector.start(Duration::from_secs(1)).await.unwrap();

    let err = collector.start(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(collector.is_active());
    assert_eq!(collector.bind("srv-2").unwrap_err().kind(), ErrorKind::Validation);

    collector.stop().await.unwrap();
    assert!(!collector.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_report_failures_do_not_stop_the_loop() {
    let (_dir, store) = temp_store();
    let (collector, api, _) = collector(store, Some("srv-1"));
    api.on_post(paths::MINING_REPORT, Reply::Remote("502 Bad Gateway".to_string()));
    let events = record_ticks(&collector);
    collector.subscribe(Arc::new(|_: &TickEvent| -> anyhow::Result<()> {
        anyhow::bail!("observer failure")
    }));

    collector.start(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let events = events.lock().clone();
    assert!(events.len() >= 3);
    assert!(events.iter().all(|e| !e.report.is_delivered()));
    assert!(collector.is_active());

    collector.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_and_persists_session() {
    let (_dir, store) = temp_store();
    let (collector, api, _) = collector(store.clone(), Some("srv-1"));

    collector.start(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let totals = collector.cumulative();

    let report = collector.stop().await.unwrap();
    assert_eq!(report.server_id, "srv-1");
    assert_eq!(report.totals, totals);
    assert!(report.final_sample.is_some());
    assert!(!report.aborted);
    assert!(report.duration_secs >= 1.5);
    assert!(report.remote_error.is_none());

    let stop_bodies = api.posts_to(paths::MINING_STOP);
    assert_eq!(stop_bodies.len(), 1);
    assert_eq!(stop_bodies[0]["server_id"], json!("srv-1"));
    assert_eq!(stop_bodies[0]["final_metrics"]["cpu_seconds"], json!(totals.cpu_seconds));
    assert!(stop_bodies[0]["final_metrics"]["cpu"].is_object());

    let persisted: SessionReport = store
        .get(Namespace::Telemetry, &format!("mining-report-{}", report.end_time))
        .unwrap()
        .unwrap();
    assert_eq!(persisted.server_id, report.server_id);
    assert_eq!(persisted.start_time, report.start_time);
    assert_eq!(persisted.totals, report.totals);

    assert!(!collector.is_active());
    assert_eq!(collector.cumulative().cpu_seconds, 0.0);
    assert_eq!(collector.stop().await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_start_leaves_no_sampling_task() {
    let (_dir, store) = temp_store();
    let inner = FakeRemoteApi::new();
    inner.on_post(paths::MINING_START, Reply::Ok(json!({"status": "started"})));
    inner.on_post(paths::MINING_REPORT, Reply::Ok(json!({"status": "ok"})));
    inner.on_post(paths::MINING_STOP, Reply::Ok(json!({"status": "stopped"})));
    let api = Arc::new(GatedApi {
        inner: inner.clone(),
        gate: Notify::new(),
    });
    let config = TelemetryConfig {
        server_id: Some("srv-1".to_string()),
        interval_secs: 1,
        join_timeout_secs: 5,
    };
    let collector = TelemetryCollector::new(
        store,
        api.clone(),
        FakeSampler::new(50.0, 2, 512.0),
        &config,
    );

    let (started, stopped) = tokio::join!(collector.start(Duration::from_secs(1)), async {
        while !collector.is_active() {
            tokio::task::yield_now().await;
        }
        let stopped = collector.stop().await;
        api.gate.notify_one();
        stopped
    });

    assert_eq!(started.unwrap_err().kind(), ErrorKind::Validation);
    let report = stopped.unwrap();
    assert!(!report.aborted);
    assert!(!collector.is_active());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(inner.posts_to(paths::MINING_REPORT).is_empty());
    assert_eq!(inner.posts_to(paths::MINING_STOP).len(), 1);
    assert_eq!(collector.stop().await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn test_start_succeeds_when_api_is_down() {
    let (_dir, store) = temp_store();
    let (collector, api, _) = collector(store, Some("srv-1"));
    api.on_post(paths::MINING_START, Reply::Remote("connection refused".to_string()));
    api.on_post(paths::MINING_STOP, Reply::Remote("connection refused".to_string()));

    let start = collector.start(Duration::from_secs(1)).await.unwrap();
    assert!(start.remote_error.is_some());
    assert!(collector.is_active());

    let report = collector.stop().await.unwrap();
    assert!(report.remote_error.is_some());
}

#[tokio::test]
async fn test_report_usage_one_shot() {
    let (_dir, store) = temp_store();
    let (collector, api, sampler) = collector(store, Some("srv-1"));

    let report = collector.report_usage(None).await.unwrap();
    assert_eq!(report.server_id, "srv-1");
    assert_eq!(report.metrics.cpu.cores, 2);
    assert_eq!(sampler.sample_count(), 1);
    assert_eq!(api.posts_to(paths::MINING_REPORT)[0]["server_id"], json!("srv-1"));

    api.on_post(paths::MINING_REPORT, Reply::Remote("down".to_string()));
    let err = collector.report_usage(Some(report.metrics)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(sampler.sample_count(), 1);
}

#[test]
fn test_bind_and_unsubscribe() {
    let (_dir, store) = temp_store();
    let (collector, _, _) = collector(store, None);

    assert!(collector.bind("  ").is_err());
    collector.bind("srv-9").unwrap();
    assert_eq!(collector.server_id().as_deref(), Some("srv-9"));

    let id = collector.subscribe(Arc::new(|_: &TickEvent| -> anyhow::Result<()> { Ok(()) }));
    assert_eq!(collector.observer_count(), 1);
    assert!(collector.unsubscribe(id));
    assert_eq!(collector.observer_count(), 0);
    assert_eq!(collector.default_interval(), Duration::from_secs(1));
}
