//! JSON-RPC 2.0 client for the ledger.

use crate::config::EndpointConfig;
use crate::error::LedgerError;
use crate::remote::{build_http_client, map_http_error, LedgerRpc};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// Ledger RPC over HTTP POST.
pub struct HttpLedgerRpc {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpLedgerRpc {
    pub fn new(endpoints: &EndpointConfig) -> Result<Self, LedgerError> {
        Ok(Self {
            client: build_http_client(endpoints)?,
            url: endpoints.ledger_url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extract `result` from a JSON-RPC response body.
pub(crate) fn parse_response(method: &str, body: Value) -> Result<Value, LedgerError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(LedgerError::Remote(message));
    }
    match body {
        Value::Object(mut map) => map.remove("result").ok_or_else(|| {
            LedgerError::Remote(format!(
                "RPC response for {} has neither result nor error",
                method
            ))
        }),
        other => Err(LedgerError::Remote(format!(
            "RPC response for {} is not an object: {}",
            method, other
        ))),
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LedgerError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(method, id = request.id, "Ledger RPC call");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(method, status = %status, "Ledger RPC request failed");
            return Err(LedgerError::Remote(format!(
                "Ledger RPC returned status {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(map_http_error)?;
        parse_response(method, body)
    }
}
