use super::types::{
    Agreement, AgreementMeta, AgreementStatus, AppDescriptor, LedgerSubmission,
};
use crate::canonical::sha256_hex;
use crate::config::AgreementDefaults;
use crate::error::LedgerError;
use crate::remote::{methods, paths, LedgerRpc, RemoteApi};
use crate::store::{FileStore, Namespace};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Length of the hex prefix used as agreement id.
const AGREEMENT_ID_LEN: usize = 16;

/// Result of a successful ledger submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub agreement_id: String,
    pub tx_hash: String,
    pub agreement_hash: String,
}

/// Outcome of [`AgreementManager::validate_state`].
///
/// `valid` is true while the final status is `Created` or `Active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementValidation {
    pub agreement_id: String,
    pub status: AgreementStatus,
    pub valid: bool,
    pub expired: bool,
    pub disputed: bool,
    pub completed: bool,
    pub canceled: bool,
    /// Status reported by the ledger, when it was queried and answered.
    pub ledger_status: Option<AgreementStatus>,
    /// Why the ledger query failed, when it did. The local status is kept.
    pub ledger_error: Option<String>,
    /// Local record was rewritten with the ledger status.
    pub overwritten: bool,
    pub agreement: Agreement,
}

impl AgreementValidation {
    fn new(agreement: Agreement, status: AgreementStatus) -> Self {
        Self {
            agreement_id: agreement.agreement_id.clone(),
            status,
            valid: !status.is_terminal(),
            expired: status == AgreementStatus::Expired,
            disputed: status == AgreementStatus::Disputed,
            completed: status == AgreementStatus::Completed,
            canceled: status == AgreementStatus::Canceled,
            ledger_status: None,
            ledger_error: None,
            overwritten: false,
            agreement,
        }
    }
}

/// Creates, submits and reconciles agreements.
///
/// Reconciliation is a two-writer merge: the ledger status overwrites the
/// local record with no version check, so a local write racing ahead of a
/// ledger sync is silently replaced.
pub struct AgreementManager {
    store: FileStore,
    rpc: Arc<dyn LedgerRpc>,
    api: Arc<dyn RemoteApi>,
    defaults: AgreementDefaults,
}

pub(crate) fn record_key(agreement_id: &str) -> String {
    format!("agreement-{}", agreement_id)
}

fn derive_id(client_id: &str, server_id: &str, app_name: &str, timestamp: i64) -> String {
    let input = format!("{}:{}:{}:{}", client_id, server_id, app_name, timestamp);
    sha256_hex(input.as_bytes())[..AGREEMENT_ID_LEN].to_string()
}

impl AgreementManager {
    pub fn new(
        store: FileStore,
        rpc: Arc<dyn LedgerRpc>,
        api: Arc<dyn RemoteApi>,
        defaults: AgreementDefaults,
    ) -> Self {
        Self {
            store,
            rpc,
            api,
            defaults,
        }
    }

    /// Build, hash and persist a new agreement in `Created` status.
    pub fn generate(&self, meta: AgreementMeta) -> Result<Agreement, LedgerError> {
        let missing = meta.missing_fields();
        if !missing.is_empty() {
            return Err(LedgerError::Validation(format!(
                "Missing required agreement fields: {}",
                missing.join(", ")
            )));
        }
        let duration = meta
            .duration_secs
            .unwrap_or(self.defaults.default_duration_secs);
        if duration <= 0 {
            return Err(LedgerError::Validation(format!(
                "Agreement duration must be positive, got {}",
                duration
            )));
        }

        let created_at = Utc::now().timestamp();
        let starts_at = meta.starts_at.unwrap_or(created_at);
        let agreement_id = derive_id(&meta.client_id, &meta.server_id, &meta.app_name, created_at);
        let expires_at = starts_at.checked_add(duration).ok_or_else(|| {
            LedgerError::Validation(format!(
                "Agreement window out of range: starts_at {} plus {} seconds",
                starts_at, duration
            ))
        })?;

        let mut agreement = Agreement {
            agreement_id,
            client_id: meta.client_id,
            server_id: meta.server_id,
            app: AppDescriptor {
                name: meta.app_name,
                version: meta
                    .version
                    .unwrap_or_else(|| self.defaults.default_app_version.clone()),
            },
            resources: meta.resources.unwrap_or(Value::Null),
            created_at,
            starts_at,
            expires_at,
            payment_terms: meta
                .payment_terms
                .unwrap_or_else(|| self.defaults.default_payment_terms.clone()),
            status: AgreementStatus::Created,
            extensions: meta.extensions,
            mainnet: None,
            agreement_hash: String::new(),
            extra: Default::default(),
        };
        agreement.rehash()?;
        self.save(&agreement)?;

        info!(
            agreement_id = %agreement.agreement_id,
            agreement_hash = %agreement.agreement_hash,
            "Generated agreement"
        );
        Ok(agreement)
    }

    /// Submit the canonical record to the ledger.
    ///
    /// Only `Created` agreements with an intact hash are sent. On success the
    /// status becomes `Active`, the transaction reference is recorded, the hash
    /// is recomputed and the record persisted. On failure nothing changes.
    #[instrument(skip(self, agreement), fields(agreement_id = %agreement.agreement_id))]
    pub async fn submit_to_ledger(
        &self,
        agreement: &mut Agreement,
    ) -> Result<SubmissionReceipt, LedgerError> {
        if agreement.status != AgreementStatus::Created {
            return Err(LedgerError::Validation(format!(
                "Agreement {} is {}, only created agreements can be submitted",
                agreement.agreement_id, agreement.status
            )));
        }
        let computed = agreement.compute_hash()?;
        if computed != agreement.agreement_hash {
            return Err(LedgerError::Integrity {
                expected: agreement.agreement_hash.clone(),
                computed,
            });
        }

        let record = serde_json::to_value(&*agreement)
            .map_err(|e| LedgerError::Validation(format!("Failed to encode agreement: {}", e)))?;
        let result = self
            .rpc
            .call(methods::SUBMIT_AGREEMENT, vec![record])
            .await
            .map_err(|e| {
                warn!(error = %e, "Ledger submission failed");
                e
            })?;
        let tx_hash = result
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                LedgerError::Remote(format!("Ledger returned no transaction hash: {}", result))
            })?
            .to_string();

        let mut updated = agreement.clone();
        updated.status = AgreementStatus::Active;
        updated.mainnet = Some(LedgerSubmission {
            tx_hash: tx_hash.clone(),
            submitted_at: Utc::now().timestamp(),
        });
        updated.rehash()?;
        self.save(&updated)?;
        *agreement = updated;

        info!(tx_hash = %tx_hash, "Submitted agreement to ledger");
        Ok(SubmissionReceipt {
            agreement_id: agreement.agreement_id.clone(),
            tx_hash,
            agreement_hash: agreement.agreement_hash.clone(),
        })
    }

    /// Effective status of an agreement, reconciled with the ledger.
    ///
    /// Past `expires_at` the status is `Expired` regardless of the stored
    /// value. When the agreement has a ledger transaction, the ledger is asked
    /// for its status and, if it differs, the ledger wins and the local record
    /// is overwritten. A failed ledger query is reported in `ledger_error`.
    #[instrument(skip(self))]
    pub async fn validate_state(&self, agreement_id: &str) -> Result<AgreementValidation, LedgerError> {
        let mut agreement = self.load(agreement_id).await?;
        let mut status = agreement.status_at(Utc::now().timestamp());

        let mut ledger_status = None;
        let mut ledger_error = None;
        if let Some(tx_hash) = agreement.tx_hash().map(str::to_string) {
            match self.query_ledger_status(&tx_hash).await {
                Ok(remote) => ledger_status = Some(remote),
                Err(e) => {
                    warn!(tx_hash = %tx_hash, error = %e, "Ledger status query failed, keeping local status");
                    ledger_error = Some(e.to_string());
                }
            }
        }

        let mut overwritten = false;
        if let Some(remote) = ledger_status {
            if remote != status {
                info!(local = %status, ledger = %remote, "Ledger status overrides local status");
                status = remote;
                if agreement.status != remote {
                    agreement.status = remote;
                    agreement.rehash()?;
                    self.save(&agreement)?;
                    overwritten = true;
                }
            }
        }

        debug!(status = %status, "Agreement state validated");
        let mut validation = AgreementValidation::new(agreement, status);
        validation.ledger_status = ledger_status;
        validation.ledger_error = ledger_error;
        validation.overwritten = overwritten;
        Ok(validation)
    }

    /// Load an agreement from the local store, else fetch it from the API
    /// and cache it. Remote copies whose hash does not match are rejected.
    pub async fn load(&self, agreement_id: &str) -> Result<Agreement, LedgerError> {
        if agreement_id.trim().is_empty() {
            return Err(LedgerError::Validation("Agreement id is required".to_string()));
        }
        if let Some(agreement) = self
            .store
            .get::<Agreement>(Namespace::Agreements, &record_key(agreement_id))?
        {
            debug!(agreement_id, "Agreement loaded from local store");
            return Ok(agreement);
        }

        let value = self
            .api
            .get(&paths::agreement(agreement_id))
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(_) => {
                    LedgerError::NotFound(format!("agreement {}", agreement_id))
                }
                other => other,
            })?;
        let mut agreement: Agreement = serde_json::from_value(value).map_err(|e| {
            LedgerError::Remote(format!("Malformed agreement {} from API: {}", agreement_id, e))
        })?;

        let computed = agreement.compute_hash()?;
        if agreement.agreement_hash.is_empty() {
            agreement.agreement_hash = computed;
        } else if computed != agreement.agreement_hash {
            return Err(LedgerError::Integrity {
                expected: agreement.agreement_hash,
                computed,
            });
        }

        self.save(&agreement)?;
        info!(agreement_id, "Fetched agreement from API and cached it");
        Ok(agreement)
    }

    /// Every locally stored agreement, ordered by id.
    pub fn list_local(&self) -> Result<Vec<Agreement>, LedgerError> {
        Ok(self
            .store
            .list::<Agreement>(Namespace::Agreements)?
            .into_iter()
            .map(|(_, agreement)| agreement)
            .collect())
    }

    fn save(&self, agreement: &Agreement) -> Result<(), LedgerError> {
        self.store.put(
            Namespace::Agreements,
            &record_key(&agreement.agreement_id),
            agreement,
        )?;
        Ok(())
    }

    async fn query_ledger_status(&self, tx_hash: &str) -> Result<AgreementStatus, LedgerError> {
        let result = self
            .rpc
            .call(methods::GET_AGREEMENT_STATUS, vec![Value::from(tx_hash)])
            .await?;
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LedgerError::Remote(format!("Ledger status response has no status: {}", result))
            })?;
        status.parse().map_err(|_| {
            LedgerError::Remote(format!("Ledger reported unknown status: {}", status))
        })
    }
}
