//! Agreements between a client and a server: data model and lifecycle manager.
//!
//! An agreement is identified by a truncated hash of its participants, app and
//! creation time, and carries `agreement_hash`, the content hash over every
//! other field. Any mutation recomputes that hash before the record is stored.

mod manager;
mod types;

pub use manager::{AgreementManager, AgreementValidation, SubmissionReceipt};
pub use types::{
    Agreement, AgreementMeta, AgreementStatus, AppDescriptor, LedgerSubmission, PaymentTerms,
};
