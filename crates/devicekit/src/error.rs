//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use devicekit_config::ConfigError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(devicekit::no_config),
        help("Pass an existing file with --config, or omit it to use the default location.")
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(devicekit::validation),
        help("Fix the configuration file and try again.")
    )]
    Validation { field: String, reason: String },

    #[error("Could not load configuration")]
    #[diagnostic(code(devicekit::config))]
    Config(#[source] ConfigError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Discovery ended without publishing a report")]
    #[diagnostic(code(devicekit::discovery))]
    DiscoveryAborted,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode report: {0}")]
    #[diagnostic(code(devicekit::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
