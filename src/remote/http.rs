//! REST client for the MetaNode API.

use crate::config::EndpointConfig;
use crate::error::LedgerError;
use crate::remote::{build_http_client, map_http_error, RemoteApi};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

/// REST API over HTTP.
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
}

impl HttpRemoteApi {
    pub fn new(endpoints: &EndpointConfig) -> Result<Self, LedgerError> {
        Ok(Self {
            client: build_http_client(endpoints)?,
            base_url: endpoints.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn read_json(path: &str, response: Response) -> Result<Value, LedgerError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(LedgerError::NotFound(format!("remote resource {}", path)));
    }
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(path, status = %status, "API request failed");
        return Err(LedgerError::Remote(format!(
            "API {} returned status {}: {}",
            path, status, error_text
        )));
    }
    response.json().await.map_err(map_http_error)
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        debug!(path, "API GET");
        let response = self
            .client
            .get(self.url(path))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(map_http_error)?;
        read_json(path, response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LedgerError> {
        debug!(path, "API POST");
        let response = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_http_error)?;
        read_json(path, response).await
    }
}
