use super::records::{
    AgreementVerification, MiningReportValidation, ProofLogVerification,
    TransactionVerification, ZkProofVerification,
};
use crate::canonical::hash_value;
use crate::error::LedgerError;
use crate::merkle::{verify_proof, MerkleVerification, ProofStep};
use crate::proof_log::verify_stored_entry;
use crate::remote::{flag, methods, paths, LedgerRpc, RemoteApi};
use crate::store::{FileStore, Namespace};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Receipt status meaning the transaction succeeded.
const RECEIPT_SUCCESS: &str = "0x1";

/// Parse an Ethereum-style hex quantity (`"0x1a"`).
fn parse_hex_quantity(value: Option<&Value>) -> Option<u64> {
    let text = value?.as_str()?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}

/// A failed side contributes no data and its error message.
fn split_outcome(result: Result<Value, LedgerError>) -> (Value, Option<String>) {
    match result {
        Ok(data) => (data, None),
        Err(e) => {
            warn!(error = %e, "Agreement verifier failed");
            (Value::Null, Some(e.to_string()))
        }
    }
}

fn require(value: &str, what: &str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        Err(LedgerError::Validation(format!("{} is required", what)))
    } else {
        Ok(())
    }
}

/// Verifies records against local recomputation and the remote authorities.
pub struct Verifier {
    store: FileStore,
    rpc: Arc<dyn LedgerRpc>,
    api: Arc<dyn RemoteApi>,
}

impl Verifier {
    pub fn new(store: FileStore, rpc: Arc<dyn LedgerRpc>, api: Arc<dyn RemoteApi>) -> Self {
        Self { store, rpc, api }
    }

    /// Check a transaction receipt on the ledger.
    ///
    /// Verified only when the receipt exists and its status is success. The
    /// record is persisted either way; an RPC failure is returned as is.
    #[instrument(skip(self))]
    pub async fn verify_transaction(
        &self,
        tx_hash: &str,
    ) -> Result<TransactionVerification, LedgerError> {
        require(tx_hash, "Transaction hash")?;
        let receipt = self
            .rpc
            .call(methods::GET_TRANSACTION_RECEIPT, vec![Value::from(tx_hash)])
            .await?;

        let receipt_found = receipt.is_object();
        let verified = receipt_found
            && receipt.get("status").and_then(Value::as_str) == Some(RECEIPT_SUCCESS);

        let transaction = if verified {
            match self
                .rpc
                .call(methods::GET_TRANSACTION_BY_HASH, vec![Value::from(tx_hash)])
                .await
            {
                Ok(body) if !body.is_null() => Some(body),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Transaction body lookup failed");
                    None
                }
            }
        } else {
            None
        };

        let record = TransactionVerification {
            tx_hash: tx_hash.to_string(),
            verified,
            receipt_found,
            block_number: parse_hex_quantity(receipt.get("blockNumber")),
            block_hash: receipt
                .get("blockHash")
                .and_then(Value::as_str)
                .map(str::to_string),
            gas_used: parse_hex_quantity(receipt.get("gasUsed")),
            transaction,
            timestamp: Utc::now().timestamp(),
        };
        self.store.put(
            Namespace::Verifications,
            &format!("verify-tx-{}", tx_hash),
            &record,
        )?;

        if verified {
            info!(block_number = ?record.block_number, "Transaction verified");
        } else {
            warn!(receipt_found, "Transaction failed or not found");
        }
        Ok(record)
    }

    /// Ask the REST API and the ledger, independently, whether an agreement
    /// hash is genuine. Verified only when both say so.
    ///
    /// A failure of one side is recorded and counts as not verified; when both
    /// fail the API error is returned.
    #[instrument(skip(self))]
    pub async fn verify_agreement(
        &self,
        agreement_hash: &str,
    ) -> Result<AgreementVerification, LedgerError> {
        require(agreement_hash, "Agreement hash")?;
        let api_path = paths::agreement_verify(agreement_hash);
        let (api_result, ledger_result) = tokio::join!(
            self.api.get(&api_path),
            self.rpc.call(
                methods::VERIFY_AGREEMENT,
                vec![Value::from(agreement_hash)]
            ),
        );

        let ((api_data, api_error), (ledger_data, ledger_error)) =
            match (api_result, ledger_result) {
                (Err(api_err), Err(ledger_err)) => {
                    warn!(api_error = %api_err, ledger_error = %ledger_err, "Both agreement verifiers failed");
                    return Err(api_err);
                }
                (api, ledger) => (split_outcome(api), split_outcome(ledger)),
            };

        let api_verified = flag(&api_data, "verified");
        let ledger_verified = flag(&ledger_data, "verified");
        let record = AgreementVerification {
            agreement_hash: agreement_hash.to_string(),
            verified: api_verified && ledger_verified,
            api_verified,
            ledger_verified,
            status: api_data
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            api_error,
            ledger_error,
            api_data,
            ledger_data,
            timestamp: Utc::now().timestamp(),
        };
        self.store.put(
            Namespace::Verifications,
            &format!("verify-agreement-{}", agreement_hash),
            &record,
        )?;

        info!(api_verified, ledger_verified, "Agreement verification complete");
        Ok(record)
    }

    /// Recompute a Merkle root from a leaf and its path. Pure; no I/O.
    pub fn verify_merkle_proof(
        &self,
        leaf_hash: &str,
        path: &[ProofStep],
        expected_root: &str,
    ) -> Result<MerkleVerification, LedgerError> {
        require(leaf_hash, "Leaf hash")?;
        require(expected_root, "Expected root")?;
        Ok(verify_proof(leaf_hash, path, expected_root))
    }

    /// Relay a zero-knowledge proof to the ledger verifier.
    ///
    /// Trust boundary: the verdict is the ledger's. Nothing here checks the
    /// proof, so a compromised or mistaken verifier goes undetected.
    #[instrument(skip(self, proof, public_inputs))]
    pub async fn verify_zk_proof(
        &self,
        proof: &Value,
        public_inputs: &[String],
    ) -> Result<ZkProofVerification, LedgerError> {
        if proof.is_null() {
            return Err(LedgerError::Validation("Proof is required".to_string()));
        }
        let proof_hash = hash_value(proof);
        let details = self
            .rpc
            .call(
                methods::VERIFY_ZK_PROOF,
                vec![proof.clone(), json!(public_inputs)],
            )
            .await?;

        let record = ZkProofVerification {
            verified: flag(&details, "verified"),
            public_inputs: public_inputs.to_vec(),
            details,
            timestamp: Utc::now().timestamp(),
            proof_hash,
        };
        self.store.put(
            Namespace::Verifications,
            &format!("verify-zk-{}", record.proof_hash),
            &record,
        )?;
        info!(verified = record.verified, proof_hash = %record.proof_hash, "ZK proof relayed");
        Ok(record)
    }

    /// Validate a mining report against the hash its producer claims.
    ///
    /// The canonical hash is recomputed first; on mismatch an integrity error
    /// is returned and the remote validator is never contacted.
    #[instrument(skip(self, report))]
    pub async fn validate_mining_report(
        &self,
        report: &Value,
        claimed_hash: &str,
    ) -> Result<MiningReportValidation, LedgerError> {
        require(claimed_hash, "Report hash")?;
        let computed = hash_value(report);
        if computed != claimed_hash {
            warn!(computed = %computed, "Mining report hash mismatch");
            return Err(LedgerError::Integrity {
                expected: claimed_hash.to_string(),
                computed,
            });
        }

        let details = self
            .rpc
            .call(
                methods::VALIDATE_MINING_REPORT,
                vec![report.clone(), Value::from(claimed_hash)],
            )
            .await?;

        let record = MiningReportValidation {
            report_hash: claimed_hash.to_string(),
            validated: flag(&details, "validated") || flag(&details, "verified"),
            details,
            report: report.clone(),
            timestamp: Utc::now().timestamp(),
        };
        self.store.put(
            Namespace::Verifications,
            &format!("validate-mining-{}", claimed_hash),
            &record,
        )?;
        info!(validated = record.validated, "Mining report validated");
        Ok(record)
    }

    /// Recompute a stored proof-log entry's hash and persist the verdict.
    pub fn verify_proof_log(&self, log_id: &str) -> Result<ProofLogVerification, LedgerError> {
        require(log_id, "Log id")?;
        let check = verify_stored_entry(&self.store, log_id)?;
        let record = ProofLogVerification {
            log_id: check.id,
            verified: check.verified,
            stored_hash: check.stored_hash,
            computed_hash: check.computed_hash,
            timestamp: Utc::now().timestamp(),
        };
        self.store.put(
            Namespace::Verifications,
            &format!("verify-log-{}", log_id),
            &record,
        )?;
        Ok(record)
    }
}
