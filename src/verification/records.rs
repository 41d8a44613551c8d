//! Verification records. Each is persisted under the verification namespace.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionVerification {
    pub tx_hash: String,
    /// Receipt exists and reports success (`status == 0x1`).
    pub verified: bool,
    pub receipt_found: bool,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub gas_used: Option<u64>,
    /// Transaction body, fetched on a best-effort basis for verified receipts.
    pub transaction: Option<Value>,
    pub timestamp: i64,
}

/// Combined API and ledger verdict. `verified` requires both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementVerification {
    pub agreement_hash: String,
    pub verified: bool,
    pub api_verified: bool,
    pub ledger_verified: bool,
    pub status: Option<String>,
    pub api_error: Option<String>,
    pub ledger_error: Option<String>,
    pub api_data: Value,
    pub ledger_data: Value,
    pub timestamp: i64,
}

/// Ledger verdict on a zero-knowledge proof. Not independently checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZkProofVerification {
    pub proof_hash: String,
    pub verified: bool,
    pub public_inputs: Vec<String>,
    pub details: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningReportValidation {
    pub report_hash: String,
    pub validated: bool,
    pub details: Value,
    pub report: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofLogVerification {
    pub log_id: String,
    pub verified: bool,
    pub stored_hash: String,
    pub computed_hash: String,
    pub timestamp: i64,
}
