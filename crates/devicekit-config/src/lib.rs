//! Shared configuration for devicekit services.
//!
//! TOML file model, layered loading (defaults, file, `DEVICEKIT_`
//! environment variables), validation, and translation to
//! `devicekit_core::ServiceConfig`. Core never reads files itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devicekit_core::{Device, DiscoveredDevice, DiscoveryConfig, ProvisionWatcher, ServiceConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub discovery: DiscoverySection,

    /// Devices seeded into the in-memory registry at startup.
    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub provision_watchers: Vec<ProvisionWatcher>,

    /// Simulated protocol driver settings.
    #[serde(default)]
    pub simulated: SimulatedSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "devicekit".into()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DiscoverySection {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between periodic scans. `<= 0` means manual triggers only.
    #[serde(default)]
    pub interval_secs: i64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SimulatedSection {
    /// How long a simulated scan takes, in milliseconds.
    #[serde(default)]
    pub scan_delay_ms: u64,

    /// Devices the simulated scan reports.
    #[serde(default)]
    pub candidates: Vec<DiscoveredDevice>,
}

impl Config {
    /// Translate into the runtime configuration consumed by core.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            name: self.service.name.clone(),
            discovery: DiscoveryConfig {
                enabled: self.discovery.enabled,
                interval_secs: self.discovery.interval_secs,
            },
        }
    }

    /// Check everything the runtime would otherwise only discover by
    /// logging and skipping.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(validation("service.name", "must not be empty"));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(validation("devices.name", "must not be empty"));
            }
            if !names.insert(device.name.as_str()) {
                return Err(validation(
                    "devices.name",
                    format!("duplicate device '{}'", device.name),
                ));
            }
            for auto_event in &device.auto_events {
                auto_event.interval_duration().map_err(|e| {
                    validation(format!("devices.{}.auto_events", device.name), e.to_string())
                })?;
            }
        }

        let mut names = HashSet::new();
        for watcher in &self.provision_watchers {
            if !names.insert(watcher.name.as_str()) {
                return Err(validation(
                    "provision_watchers.name",
                    format!("duplicate watcher '{}'", watcher.name),
                ));
            }
            for (property, pattern) in &watcher.identifiers {
                Regex::new(pattern).map_err(|e| {
                    validation(
                        format!("provision_watchers.{}.identifiers.{property}", watcher.name),
                        e.to_string(),
                    )
                })?;
            }
        }
        Ok(())
    }
}

fn validation(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "devicekit", "devicekit").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("devicekit");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from `path` (or the default location),
/// layered over built-in defaults and under `DEVICEKIT_*` env overrides.
///
/// A missing file is not an error; the defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("DEVICEKIT_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}
