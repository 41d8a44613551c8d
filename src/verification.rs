//! Verification of transactions, agreements, Merkle proofs, zero-knowledge
//! proof attestations, mining reports and proof-log entries.
//!
//! Local recomputation always runs before any remote call. Zero-knowledge
//! proofs are the exception: nothing can be recomputed locally, so the result
//! is only as trustworthy as the ledger's verifier.

mod records;
mod verifier;

pub use records::{
    AgreementVerification, MiningReportValidation, ProofLogVerification,
    TransactionVerification, ZkProofVerification,
};
pub use verifier::Verifier;
