//! MetaNode ledger: hash-verified agreements, proof logs and resource telemetry
//!
//! Agreements and proof-log entries are stored locally as canonical JSON
//! records whose content hash is recomputed on every mutation. Status is
//! reconciled against a remote ledger reached over JSON-RPC, and a telemetry
//! collector samples host resources on a fixed interval and reports them to
//! the REST API.

pub mod agreement;
pub mod canonical;
pub mod config;
pub mod error;
pub mod facade;
pub mod logging;
pub mod merkle;
pub mod proof_log;
pub mod remote;
pub mod store;
pub mod telemetry;
pub mod verification;

pub use agreement::{Agreement, AgreementManager, AgreementMeta, AgreementStatus};
pub use config::{ConfigLoader, MetanodeConfig};
pub use error::{ErrorKind, LedgerError, StorageError};
pub use facade::Metanode;
pub use proof_log::{ProofLog, ProofLogEntry};
pub use store::{FileStore, Namespace};
pub use telemetry::TelemetryCollector;
pub use verification::Verifier;
