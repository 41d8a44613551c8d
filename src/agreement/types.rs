use crate::canonical::content_hash;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Field excluded from the agreement content hash.
pub(crate) const HASH_FIELD: &str = "agreement_hash";

/// Lifecycle status.
///
/// `Created -> Active` on ledger submission; `Expired`, `Disputed`,
/// `Completed` and `Canceled` are terminal. `Expired` is also reached purely
/// by time, without any transition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    Created,
    Active,
    Expired,
    Disputed,
    Completed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl AgreementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgreementStatus::Created => "created",
            AgreementStatus::Active => "active",
            AgreementStatus::Expired => "expired",
            AgreementStatus::Disputed => "disputed",
            AgreementStatus::Completed => "completed",
            AgreementStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AgreementStatus::Created | AgreementStatus::Active)
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgreementStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(AgreementStatus::Created),
            "active" => Ok(AgreementStatus::Active),
            "expired" => Ok(AgreementStatus::Expired),
            "disputed" => Ok(AgreementStatus::Disputed),
            "completed" => Ok(AgreementStatus::Completed),
            "canceled" | "cancelled" => Ok(AgreementStatus::Canceled),
            other => Err(LedgerError::Validation(format!(
                "Unknown agreement status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerms {
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_schedule")]
    pub payment_schedule: String,
}

fn default_rate() -> String {
    "1.0".to_string()
}

fn default_currency() -> String {
    "MNT".to_string()
}

fn default_schedule() -> String {
    "hourly".to_string()
}

impl Default for PaymentTerms {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            currency: default_currency(),
            payment_schedule: default_schedule(),
        }
    }
}

/// Reference to the ledger transaction that recorded the agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSubmission {
    pub tx_hash: String,
    pub submitted_at: i64,
}

/// Agreement record. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub agreement_id: String,
    pub client_id: String,
    pub server_id: String,
    pub app: AppDescriptor,
    pub resources: Value,
    pub created_at: i64,
    pub starts_at: i64,
    pub expires_at: i64,
    pub payment_terms: PaymentTerms,
    pub status: AgreementStatus,
    #[serde(default)]
    pub extensions: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mainnet: Option<LedgerSubmission>,
    #[serde(default)]
    pub agreement_hash: String,
    /// Fields written by other producers; kept so re-hashing stays faithful.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Agreement {
    /// Hash over the canonical form of every field except `agreement_hash`.
    pub fn compute_hash(&self) -> Result<String, LedgerError> {
        content_hash(self, HASH_FIELD)
    }

    pub fn rehash(&mut self) -> Result<(), LedgerError> {
        self.agreement_hash = self.compute_hash()?;
        Ok(())
    }

    pub fn verify_hash(&self) -> Result<bool, LedgerError> {
        Ok(!self.agreement_hash.is_empty() && self.compute_hash()? == self.agreement_hash)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Status as of `now`: `Expired` past `expires_at`, otherwise the stored value.
    pub fn status_at(&self, now: i64) -> AgreementStatus {
        if self.is_expired_at(now) {
            AgreementStatus::Expired
        } else {
            self.status
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        self.mainnet.as_ref().map(|m| m.tx_hash.as_str())
    }
}

/// Input to `AgreementManager::generate`.
///
/// `client_id`, `server_id`, `app_name` and `resources` are required; the rest
/// fall back to the configured agreement defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgreementMeta {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub payment_terms: Option<PaymentTerms>,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub extensions: Map<String, Value>,
}

impl AgreementMeta {
    pub fn new(
        client_id: impl Into<String>,
        server_id: impl Into<String>,
        app_name: impl Into<String>,
        resources: Value,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: server_id.into(),
            app_name: app_name.into(),
            resources: Some(resources),
            ..Self::default()
        }
    }

    pub fn with_duration_secs(mut self, duration_secs: i64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn with_starts_at(mut self, starts_at: i64) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    pub fn with_payment_terms(mut self, terms: PaymentTerms) -> Self {
        self.payment_terms = Some(terms);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Names of required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push("client_id");
        }
        if self.server_id.trim().is_empty() {
            missing.push("server_id");
        }
        if self.app_name.trim().is_empty() {
            missing.push("app_name");
        }
        // An empty descriptor is present, only an absent one is missing.
        if matches!(self.resources, None | Some(Value::Null)) {
            missing.push("resources");
        }
        missing
    }
}
