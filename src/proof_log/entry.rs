use crate::canonical::{canonical_json, content_hash};
use crate::error::LedgerError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const HASH_FIELD: &str = "hash";

/// One proof-log record. `timestamp` is unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofLogEntry {
    pub id: String,
    pub timestamp: i64,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<String>,
    /// Hex Ed25519 signature over [`signing_payload`](Self::signing_payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Hex Ed25519 public key of the signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default)]
    pub hash: String,
    /// Pointer returned by the remote content-addressed store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfs_hash: Option<String>,
}

impl ProofLogEntry {
    pub fn new(id: String, timestamp: i64, content: Value, agreement_id: Option<String>) -> Self {
        Self {
            id,
            timestamp,
            content,
            agreement_id,
            signature: None,
            public_key: None,
            hash: String::new(),
            ipfs_hash: None,
        }
    }

    pub fn compute_hash(&self) -> Result<String, LedgerError> {
        content_hash(self, HASH_FIELD)
    }

    pub fn rehash(&mut self) -> Result<(), LedgerError> {
        self.hash = self.compute_hash()?;
        Ok(())
    }

    pub fn verify_hash(&self) -> Result<bool, LedgerError> {
        Ok(!self.hash.is_empty() && self.compute_hash()? == self.hash)
    }

    /// Canonical bytes covered by the signature: id, timestamp, content and
    /// the agreement reference when present.
    pub fn signing_payload(&self) -> String {
        let mut payload = json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "content": self.content,
        });
        if let Some(agreement_id) = &self.agreement_id {
            payload["agreement_id"] = Value::from(agreement_id.as_str());
        }
        canonical_json(&payload)
    }

    /// Sign the entry. The caller rehashes afterwards.
    pub fn sign(&mut self, signing_key: &SigningKey) {
        let signature = signing_key.sign(self.signing_payload().as_bytes());
        self.signature = Some(hex::encode(signature.to_bytes()));
        self.public_key = Some(hex::encode(signing_key.verifying_key().as_bytes()));
    }

    /// `false` for unsigned entries or a signature that does not verify.
    pub fn verify_signature(&self) -> Result<bool, LedgerError> {
        let (Some(signature), Some(public_key)) = (&self.signature, &self.public_key) else {
            return Ok(false);
        };

        let sig_bytes = hex::decode(signature)
            .map_err(|e| LedgerError::Validation(format!("Malformed signature hex: {}", e)))?;
        let pk_bytes = hex::decode(public_key)
            .map_err(|e| LedgerError::Validation(format!("Malformed public key hex: {}", e)))?;

        let signature = Signature::from_bytes(sig_bytes.as_slice().try_into().map_err(|_| {
            LedgerError::Validation(format!(
                "Signature must be 64 bytes, got {}",
                sig_bytes.len()
            ))
        })?);
        let verifying_key =
            VerifyingKey::from_bytes(pk_bytes.as_slice().try_into().map_err(|_| {
                LedgerError::Validation(format!(
                    "Public key must be 32 bytes, got {}",
                    pk_bytes.len()
                ))
            })?)
            .map_err(|e| LedgerError::Validation(format!("Invalid public key: {}", e)))?;

        Ok(verifying_key
            .verify(self.signing_payload().as_bytes(), &signature)
            .is_ok())
    }
}
