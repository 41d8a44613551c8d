//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace
//! files, then `METANODE__SECTION__KEY` environment variables. The resulting
//! [`MetanodeConfig`] is passed into every component at construction; nothing
//! reads endpoints from module-level constants.

use crate::agreement::PaymentTerms;
use crate::error::LedgerError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetanodeConfig {
    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub agreement: AgreementDefaults,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote endpoints and per-call HTTP limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Ledger JSON-RPC URL
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,

    /// Upper bound for one request, connect included
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ledger_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ledger_url: default_ledger_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Local record store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".metanode/data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// Values applied by `AgreementManager::generate` when the caller omits them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementDefaults {
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: i64,

    #[serde(default)]
    pub default_payment_terms: PaymentTerms,

    #[serde(default = "default_app_version")]
    pub default_app_version: String,
}

fn default_duration_secs() -> i64 {
    86_400
}

fn default_app_version() -> String {
    "1.0.0".to_string()
}

impl Default for AgreementDefaults {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration_secs(),
            default_payment_terms: PaymentTerms::default(),
            default_app_version: default_app_version(),
        }
    }
}

/// Telemetry session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Identity bound to the collector at construction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Bounded wait for the background task in `stop`
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_join_timeout_secs() -> u64 {
    5
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server_id: None,
            interval_secs: default_interval_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Endpoint(String, String),
    Storage(String),
    Agreement(String),
    Telemetry(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Endpoint(field, msg) => write!(f, "Endpoint '{}': {}", field, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Agreement(msg) => write!(f, "Agreement: {}", msg),
            ValidationError::Telemetry(msg) => write!(f, "Telemetry: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("URL cannot be empty".to_string());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("URL must start with http:// or https://: {}", url));
    }
    Ok(())
}

impl EndpointConfig {
    fn validate(&self, errors: &mut Vec<ValidationError>) {
        for (field, url) in [("api_url", &self.api_url), ("ledger_url", &self.ledger_url)] {
            if let Err(msg) = validate_url(url) {
                errors.push(ValidationError::Endpoint(field.to_string(), msg));
            }
        }
        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::Endpoint(
                "request_timeout_secs".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            errors.push(ValidationError::Endpoint(
                "connect_timeout_secs".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
    }
}

impl MetanodeConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        self.endpoints.validate(&mut errors);

        if self.storage.root.as_os_str().is_empty() {
            errors.push(ValidationError::Storage("root cannot be empty".to_string()));
        }
        if self.agreement.default_duration_secs <= 0 {
            errors.push(ValidationError::Agreement(
                "default_duration_secs must be positive".to_string(),
            ));
        }
        if self.telemetry.interval_secs == 0 {
            errors.push(ValidationError::Telemetry(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.join_timeout_secs == 0 {
            errors.push(ValidationError::Telemetry(
                "join_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(server_id) = &self.telemetry.server_id {
            if server_id.trim().is_empty() {
                errors.push(ValidationError::Telemetry(
                    "server_id cannot be blank".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// [`validate`](Self::validate) folded into a single [`LedgerError::Config`].
    pub fn ensure_valid(&self) -> Result<(), LedgerError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            LedgerError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &Path) -> Result<(), LedgerError> {
        let rendered = MetanodeConfig::default().to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        std::fs::write(path, rendered).map_err(|e| {
            LedgerError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
