//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come
//! from [`LoggingConfig`] and can be overridden from the environment.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path, used when output is "file"
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Colored output (text format on a terminal stream only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `metanode_ledger::telemetry = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stdout".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".metanode/metanode.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
    File,
}

/// Install the global subscriber.
///
/// Priority order (highest to lowest):
/// 1. Environment variables (METANODE_LOG, METANODE_LOG_FORMAT, METANODE_LOG_OUTPUT,
///    METANODE_LOG_MODULES)
/// 2. `config`
/// 3. Defaults
///
/// Fails with [`LedgerError::Config`] on an invalid setting or when a global
/// subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), LedgerError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let writer = match output {
        Output::Stdout => BoxMakeWriter::new(std::io::stdout),
        Output::Stderr => BoxMakeWriter::new(std::io::stderr),
        Output::File => {
            let log_file = config
                .map(|c| c.file.clone())
                .unwrap_or_else(default_log_file);
            if let Some(parent) = log_file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::Config(format!("Failed to create log directory: {}", e))
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    LedgerError::Config(format!("Failed to open log file {:?}: {}", log_file, e))
                })?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    };

    let base_subscriber = Registry::default().with(filter);
    let result = if format == "json" {
        base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        let use_color = output != Output::File && config.map(|c| c.color).unwrap_or(true);
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };

    result.map_err(|e| LedgerError::Config(format!("Failed to install log subscriber: {}", e)))
}

/// Build EnvFilter from METANODE_LOG, else from config plus module directives.
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, LedgerError> {
    if let Ok(filter) = EnvFilter::try_from_env("METANODE_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            filter = filter.add_directive(parse_directive(module, module_level)?);
        }
    }

    if let Ok(modules_str) = std::env::var("METANODE_LOG_MODULES") {
        for (module, module_level) in parse_module_list(&modules_str) {
            filter = filter.add_directive(parse_directive(module, module_level)?);
        }
    }

    Ok(filter)
}

fn parse_directive(
    module: &str,
    level: &str,
) -> Result<tracing_subscriber::filter::Directive, LedgerError> {
    format!("{}={}", module, level)
        .parse()
        .map_err(|e| LedgerError::Config(format!("Invalid log directive: {}", e)))
}

/// `a=debug,b=warn` into pairs; malformed items are skipped.
fn parse_module_list(modules: &str) -> Vec<(&str, &str)> {
    modules
        .split(',')
        .filter_map(|entry| {
            let (module, level) = entry.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            (!module.is_empty() && !level.is_empty()).then_some((module, level))
        })
        .collect()
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<String, LedgerError> {
    if let Ok(format) = std::env::var("METANODE_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(LedgerError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(format.to_string())
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<Output, LedgerError> {
    if let Ok(output) = std::env::var("METANODE_LOG_OUTPUT") {
        return parse_output(&output);
    }
    parse_output(config.map(|c| c.output.as_str()).unwrap_or("stdout"))
}

fn parse_output(output: &str) -> Result<Output, LedgerError> {
    match output {
        "stdout" => Ok(Output::Stdout),
        "stderr" => Ok(Output::Stderr),
        "file" => Ok(Output::File),
        _ => Err(LedgerError::Config(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            output
        ))),
    }
}
