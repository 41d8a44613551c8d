//! Remote collaborators: the ledger JSON-RPC endpoint and the REST API.
//!
//! Both are traits so every component takes them by injection; the HTTP
//! implementations live in [`rpc`] and [`http`]. No call is ever retried. Each
//! request is bounded by the per-call timeout configured on the HTTP client.

use crate::config::EndpointConfig;
use crate::error::LedgerError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub mod http;
pub mod rpc;

pub use http::HttpRemoteApi;
pub use rpc::HttpLedgerRpc;

/// Ledger JSON-RPC method names.
pub mod methods {
    pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
    pub const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
    pub const SUBMIT_AGREEMENT: &str = "metanode_submitAgreement";
    pub const GET_AGREEMENT_STATUS: &str = "metanode_getAgreementStatus";
    pub const VERIFY_AGREEMENT: &str = "metanode_verifyAgreement";
    pub const VERIFY_ZK_PROOF: &str = "metanode_verifyZkProof";
    pub const VALIDATE_MINING_REPORT: &str = "metanode_validateMiningReport";
}

/// REST resource paths, relative to the API base URL.
pub mod paths {
    pub fn agreement(id: &str) -> String {
        format!("/agreement/{}", id)
    }

    pub fn agreement_verify(hash: &str) -> String {
        format!("/agreement/{}/verify", hash)
    }

    pub const PROOF_LOG: &str = "/proof/log";
    pub const PROOF_VERIFY: &str = "/proof/verify";

    pub fn proof_history(subject_id: &str) -> String {
        format!("/proof/history/{}", subject_id)
    }

    pub fn proof_agreement_logs(agreement_id: &str) -> String {
        format!("/proof/agreement/{}", agreement_id)
    }

    pub const MINING_START: &str = "/mining/start";
    pub const MINING_STOP: &str = "/mining/stop";
    pub const MINING_REPORT: &str = "/mining/report";
}

/// Authoritative ledger reachable only through JSON-RPC.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Invoke `method` with positional `params` and return the `result` member.
    ///
    /// An RPC error object is returned as [`LedgerError::Remote`] carrying the
    /// error message verbatim. A `null` result is returned as `Value::Null`.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LedgerError>;
}

/// REST API of the MetaNode service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// GET a JSON resource. A 404 maps to [`LedgerError::NotFound`].
    async fn get(&self, path: &str) -> Result<Value, LedgerError>;

    /// POST a JSON body and return the JSON response.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, LedgerError>;
}

pub(crate) fn build_http_client(endpoints: &EndpointConfig) -> Result<Client, LedgerError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(endpoints.connect_timeout_secs))
        .timeout(Duration::from_secs(endpoints.request_timeout_secs))
        .build()
        .map_err(|e| LedgerError::Config(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn map_http_error(error: reqwest::Error) -> LedgerError {
    if error.is_timeout() {
        LedgerError::Remote(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        LedgerError::Remote(format!("Connection error: {}", error))
    } else if error.is_decode() {
        LedgerError::Remote(format!("Malformed response body: {}", error))
    } else {
        LedgerError::Remote(format!("HTTP error: {}", error))
    }
}

/// Read a boolean flag from a JSON object, treating absence as `false`.
pub(crate) fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}
