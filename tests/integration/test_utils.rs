//! Shared fakes and setup for integration tests
//!
//! The fakes stand in for the remote ledger, the REST API and the host
//! sampler. Responses are scripted per method or path and every call is
//! recorded so tests can assert on what went over the wire.

use async_trait::async_trait;
use metanode_ledger::config::MetanodeConfig;
use metanode_ledger::error::LedgerError;
use metanode_ledger::remote::{LedgerRpc, RemoteApi};
use metanode_ledger::store::FileStore;
use metanode_ledger::telemetry::{
    CpuSample, DiskSample, MemorySample, NetworkSample, ResourceSample, ResourceSampler,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Scripted reply. Errors are rebuilt on every call since `LedgerError` is not `Clone`.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Remote(String),
    NotFound,
}

impl Reply {
    fn into_result(self) -> Result<Value, LedgerError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Remote(message) => Err(LedgerError::Remote(message)),
            Reply::NotFound => Err(LedgerError::NotFound("scripted".to_string())),
        }
    }
}

/// In-memory ledger keyed by RPC method name. Unscripted methods fail remotely.
#[derive(Default)]
pub struct FakeLedgerRpc {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeLedgerRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: &str, reply: Reply) {
        self.replies.lock().insert(method.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl LedgerRpc for FakeLedgerRpc {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LedgerError> {
        self.calls.lock().push((method.to_string(), params));
        self.replies
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Reply::Remote(format!("no reply scripted for {}", method)))
            .into_result()
    }
}

/// In-memory REST API keyed by path. Unscripted GETs are 404s, unscripted
/// POSTs fail remotely.
#[derive(Default)]
pub struct FakeRemoteApi {
    gets: Mutex<HashMap<String, Reply>>,
    posts: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, String, Option<Value>)>>,
}

impl FakeRemoteApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_get(&self, path: &str, reply: Reply) {
        self.gets.lock().insert(path.to_string(), reply);
    }

    pub fn on_post(&self, path: &str, reply: Reply) {
        self.posts.lock().insert(path.to_string(), reply);
    }

    /// `(verb, path, body)` in call order.
    pub fn calls(&self) -> Vec<(String, String, Option<Value>)> {
        self.calls.lock().clone()
    }

    pub fn posts_to(&self, path: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(verb, p, _)| verb == "POST" && p == path)
            .filter_map(|(_, _, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteApi for FakeRemoteApi {
    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        self.calls
            .lock()
            .push(("GET".to_string(), path.to_string(), None));
        self.gets
            .lock()
            .get(path)
            .cloned()
            .unwrap_or(Reply::NotFound)
            .into_result()
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LedgerError> {
        self.calls
            .lock()
            .push(("POST".to_string(), path.to_string(), Some(body.clone())));
        self.posts
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Reply::Remote(format!("no reply scripted for {}", path)))
            .into_result()
    }
}

/// Fixed CPU and memory readings; network counters grow by a fixed step per sample.
pub struct FakeSampler {
    pub cpu_percent: f64,
    pub cores: u32,
    pub used_mb: f64,
    pub network_step: u64,
    samples: AtomicU64,
}

impl FakeSampler {
    pub fn new(cpu_percent: f64, cores: u32, used_mb: f64) -> Arc<Self> {
        Arc::new(Self {
            cpu_percent,
            cores,
            used_mb,
            network_step: 100,
            samples: AtomicU64::new(0),
        })
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }
}

impl ResourceSampler for FakeSampler {
    fn sample(&self) -> Result<ResourceSample, LedgerError> {
        let n = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ResourceSample {
            cpu: CpuSample {
                percent: self.cpu_percent,
                cores: self.cores,
            },
            memory: MemorySample {
                used_mb: self.used_mb,
                percent: 10.0,
            },
            disk: DiskSample {
                used_gb: 1.0,
                percent: 5.0,
            },
            network: NetworkSample {
                bytes_sent: n * self.network_step,
                bytes_recv: n * self.network_step,
            },
        })
    }
}

/// Store rooted in a fresh temp dir. Keep the dir alive for the test.
pub fn temp_store() -> (TempDir, FileStore) {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path().join("data")).unwrap();
    (dir, store)
}

/// Default configuration with the store under `dir`.
pub fn config_in(dir: &TempDir) -> MetanodeConfig {
    let mut config = MetanodeConfig::default();
    config.storage.root = dir.path().join("data");
    config
}
