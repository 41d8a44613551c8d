use super::entry::ProofLogEntry;
use crate::error::LedgerError;
use crate::remote::{flag, paths, RemoteApi};
use crate::store::{FileStore, Namespace};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of [`ProofLog::append`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub id: String,
    /// Hash of the stored entry.
    pub hash: String,
    /// Hash sent to the remote store. Differs from `hash` once the remote
    /// pointer has been attached and the entry rehashed.
    pub submitted_hash: String,
    pub ipfs_hash: Option<String>,
    /// Why remote submission failed, when it did.
    pub remote_error: Option<String>,
    pub entry: ProofLogEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofVerification {
    pub id: String,
    pub verified: bool,
    pub stored_hash: String,
    pub computed_hash: String,
}

/// Remote timeline for a subject, as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofHistory {
    pub subject_id: String,
    pub logs: Vec<Value>,
    pub fetched_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProofCheck {
    pub hash: String,
    pub verified: bool,
    pub details: Value,
}

/// Snapshot written by [`ProofLog::export`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofExport {
    pub logs: Vec<Value>,
    pub exported_at: i64,
    pub filters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub key: String,
    pub count: usize,
    pub path: PathBuf,
    pub exported_at: i64,
}

/// Proof-log operations over the local store and the remote API.
pub struct ProofLog {
    store: FileStore,
    api: Arc<dyn RemoteApi>,
}

/// Accept either a bare array or an object with a `logs` array.
fn extract_logs(subject: &str, response: Value) -> Result<Vec<Value>, LedgerError> {
    match response {
        Value::Array(logs) => Ok(logs),
        Value::Object(mut map) => match map.remove("logs") {
            Some(Value::Array(logs)) => Ok(logs),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(LedgerError::Remote(format!(
                "Malformed log list for {}: {}",
                subject, other
            ))),
        },
        other => Err(LedgerError::Remote(format!(
            "Malformed log list for {}: {}",
            subject, other
        ))),
    }
}

fn timestamp_of(value: &Value) -> i64 {
    value.get("timestamp").and_then(Value::as_i64).unwrap_or(0)
}

fn load_entry(store: &FileStore, id: &str) -> Result<ProofLogEntry, LedgerError> {
    store
        .get(Namespace::ProofLogs, id)?
        .ok_or_else(|| LedgerError::NotFound(format!("proof log entry {}", id)))
}

pub(crate) fn verify_stored_entry(
    store: &FileStore,
    id: &str,
) -> Result<ProofVerification, LedgerError> {
    let entry = load_entry(store, id)?;
    let computed_hash = entry.compute_hash()?;
    let verified = !entry.hash.is_empty() && computed_hash == entry.hash;
    if !verified {
        warn!(id, stored = %entry.hash, computed = %computed_hash, "Proof log hash mismatch");
    }
    Ok(ProofVerification {
        id: id.to_string(),
        verified,
        stored_hash: entry.hash,
        computed_hash,
    })
}

impl ProofLog {
    pub fn new(store: FileStore, api: Arc<dyn RemoteApi>) -> Self {
        Self { store, api }
    }

    /// Record a payload.
    ///
    /// The entry is persisted before the remote store is contacted. A remote
    /// failure is logged and reported in the receipt; the call still succeeds.
    #[instrument(skip(self, content, signer))]
    pub async fn append(
        &self,
        content: Value,
        agreement_id: Option<&str>,
        signer: Option<&SigningKey>,
    ) -> Result<AppendReceipt, LedgerError> {
        if content.is_null() {
            return Err(LedgerError::Validation(
                "Proof log payload is required".to_string(),
            ));
        }
        if let Some(id) = agreement_id {
            if id.trim().is_empty() {
                return Err(LedgerError::Validation(
                    "Agreement reference cannot be blank".to_string(),
                ));
            }
        }

        let mut entry = ProofLogEntry::new(
            Uuid::new_v4().to_string(),
            Utc::now().timestamp(),
            content,
            agreement_id.map(str::to_string),
        );
        if let Some(key) = signer {
            entry.sign(key);
        }
        entry.rehash()?;
        self.store.put(Namespace::ProofLogs, &entry.id, &entry)?;
        let submitted_hash = entry.hash.clone();

        let body = json!({ "proof": entry, "hash": submitted_hash });
        let mut remote_error = None;
        match self.api.post(paths::PROOF_LOG, &body).await {
            Ok(response) => {
                if let Some(pointer) = response.get("ipfs_hash").and_then(Value::as_str) {
                    entry.ipfs_hash = Some(pointer.to_string());
                    entry.rehash()?;
                    self.store.put(Namespace::ProofLogs, &entry.id, &entry)?;
                }
                info!(id = %entry.id, hash = %entry.hash, "Stored proof log entry");
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Remote proof store failed, kept local copy");
                remote_error = Some(e.to_string());
            }
        }

        Ok(AppendReceipt {
            id: entry.id.clone(),
            hash: entry.hash.clone(),
            submitted_hash,
            ipfs_hash: entry.ipfs_hash.clone(),
            remote_error,
            entry,
        })
    }

    pub fn get(&self, id: &str) -> Result<ProofLogEntry, LedgerError> {
        load_entry(&self.store, id)
    }

    /// Recompute the hash of a stored entry and compare. Never mutates it.
    pub fn verify(&self, id: &str) -> Result<ProofVerification, LedgerError> {
        verify_stored_entry(&self.store, id)
    }

    /// Fetch the remote timeline for `subject_id` and cache it.
    pub async fn fetch_history(&self, subject_id: &str) -> Result<ProofHistory, LedgerError> {
        self.fetch_and_cache(subject_id, &paths::proof_history(subject_id), "history")
            .await
    }

    /// Fetch the remote timeline of one agreement and cache it.
    pub async fn fetch_agreement_logs(&self, agreement_id: &str) -> Result<ProofHistory, LedgerError> {
        self.fetch_and_cache(
            agreement_id,
            &paths::proof_agreement_logs(agreement_id),
            "agreement-logs",
        )
        .await
    }

    /// Ask the remote service whether it holds an intact entry with `hash`.
    pub async fn verify_remote(&self, hash: &str) -> Result<RemoteProofCheck, LedgerError> {
        if hash.trim().is_empty() {
            return Err(LedgerError::Validation("Hash is required".to_string()));
        }
        let details = self
            .api
            .post(paths::PROOF_VERIFY, &json!({ "hash": hash }))
            .await?;
        let verified = flag(&details, "verified");
        if verified {
            info!(hash, "Remote proof verified");
        } else {
            warn!(hash, "Remote proof verification failed");
        }
        Ok(RemoteProofCheck {
            hash: hash.to_string(),
            verified,
            details,
        })
    }

    /// Write a snapshot of local entries whose top-level fields equal every
    /// filter value, ordered by ascending timestamp.
    pub fn export(&self, filters: &Map<String, Value>) -> Result<ExportReceipt, LedgerError> {
        let mut logs: Vec<Value> = self
            .store
            .list::<Value>(Namespace::ProofLogs)?
            .into_iter()
            .map(|(_, entry)| entry)
            .filter(|entry| {
                filters
                    .iter()
                    .all(|(key, expected)| entry.get(key) == Some(expected))
            })
            .collect();
        logs.sort_by_key(timestamp_of);

        let now = Utc::now();
        let exported_at = now.timestamp();
        let key = format!("export-{}", now.timestamp_millis());
        let count = logs.len();
        let snapshot = ProofExport {
            logs,
            exported_at,
            filters: filters.clone(),
        };
        let path = self.store.put(Namespace::ProofExports, &key, &snapshot)?;

        info!(count, key = %key, "Exported proof log entries");
        Ok(ExportReceipt {
            key,
            count,
            path,
            exported_at,
        })
    }

    async fn fetch_and_cache(
        &self,
        subject_id: &str,
        path: &str,
        prefix: &str,
    ) -> Result<ProofHistory, LedgerError> {
        if subject_id.trim().is_empty() {
            return Err(LedgerError::Validation("Subject id is required".to_string()));
        }
        let key = format!("{}-{}", prefix, subject_id);
        // Reject ids that cannot be cached before going remote.
        self.store.path_for(Namespace::ProofHistory, &key)?;

        let response = self.api.get(path).await?;
        let history = ProofHistory {
            subject_id: subject_id.to_string(),
            logs: extract_logs(subject_id, response)?,
            fetched_at: Utc::now().timestamp(),
        };
        self.store.put(Namespace::ProofHistory, &key, &history)?;
        info!(subject_id, count = history.logs.len(), "Fetched proof history");
        Ok(history)
    }
}
