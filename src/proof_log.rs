//! Append-only, hash-verifiable proof log.
//!
//! Entries are stored one file per id. Each carries `hash`, the content hash
//! over every other field, and may be signed with an Ed25519 key and mirrored
//! to the remote content-addressed store.

mod entry;
mod log;

pub use entry::ProofLogEntry;
pub(crate) use log::verify_stored_entry;
pub use log::{
    AppendReceipt, ExportReceipt, ProofExport, ProofHistory, ProofLog, ProofVerification,
    RemoteProofCheck,
};
