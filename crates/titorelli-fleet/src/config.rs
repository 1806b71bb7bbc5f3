// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for titorelli-fleet.

use std::path::PathBuf;
use std::time::Duration;

use crate::controller::ControllerSettings;
use crate::naming::ContainerNameGenerator;
use crate::platform::DockhostConfig;
use crate::reconciler::ReconcilerConfig;
use crate::workload::WorkloadEnv;

/// Fleet configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL for the bot store.
    pub database_url: String,
    /// Dockhost CLI settings.
    pub dockhost: DockhostConfig,
    /// Project (namespace) the fleet's workloads live in.
    pub project: String,
    /// Workload name prefix.
    pub container_prefix: String,
    /// Optional generation suffix appended to workload names.
    pub container_suffix: Option<String>,
    /// Default container image for new bots.
    pub image: String,
    /// Management API origin injected into workloads.
    pub api_origin: String,
    /// Credential service origin injected into workloads.
    pub cas_origin: Option<String>,
    /// Telemetry origin injected into workloads.
    pub telemetry_origin: Option<String>,
    /// Reconciliation poll interval.
    pub poll_interval: Duration,
    /// Debounce window for configuration reloads.
    pub reload_debounce: Duration,
    /// Liveness timeout.
    pub liveness_timeout: Duration,
    /// Startup grace period for bots in `starting`.
    pub startup_grace: Duration,
    /// Consecutive idle ticks before a bot is downgraded to `stopped`.
    pub settle_ticks: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnvVar(key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match optional(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber(key, value)),
                None => Ok(default),
            }
        };

        let database_url = optional("TITORELLI_DATABASE_URL")
            .unwrap_or_else(|| "sqlite:data/bots.sqlite3?mode=rwc".to_string());

        let dockhost = DockhostConfig {
            executable: PathBuf::from(
                optional("DOCKHOST_EXECUTABLE").unwrap_or_else(|| "dockhost".to_string()),
            ),
            token: required("DOCKHOST_TOKEN")?,
        };

        let settle_ticks = number("TITORELLI_SETTLE_TICKS", 3)?;

        Ok(Self {
            database_url,
            dockhost,
            project: required("DOCKHOST_PROJECT")?,
            container_prefix: required("DOCKHOST_CONTAINER")?,
            container_suffix: optional("DOCKHOST_CONTAINER_SUFFIX"),
            image: required("DOCKHOST_IMAGE")?,
            api_origin: required("API_ORIGIN")?,
            cas_origin: optional("CAS_ORIGIN"),
            telemetry_origin: optional("TELEMETRY_ORIGIN"),
            poll_interval: Duration::from_millis(number("TITORELLI_POLL_INTERVAL_MS", 1_200)?),
            reload_debounce: Duration::from_millis(number("TITORELLI_RELOAD_DEBOUNCE_MS", 3_000)?),
            liveness_timeout: Duration::from_secs(number("TITORELLI_LIVENESS_TIMEOUT_SECS", 30)?),
            startup_grace: Duration::from_secs(number("TITORELLI_STARTUP_GRACE_SECS", 120)?),
            settle_ticks: u32::try_from(settle_ticks).map_err(|_| {
                ConfigError::InvalidNumber("TITORELLI_SETTLE_TICKS", settle_ticks.to_string())
            })?,
        })
    }

    /// Name generator for this fleet's workloads.
    pub fn naming(&self) -> ContainerNameGenerator {
        ContainerNameGenerator::new(self.container_prefix.clone(), self.container_suffix.clone())
    }

    /// Per-bot controller settings.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            env: WorkloadEnv {
                api_origin: self.api_origin.clone(),
                cas_origin: self.cas_origin.clone(),
                telemetry_origin: self.telemetry_origin.clone(),
            },
            reload_debounce: self.reload_debounce,
            liveness_timeout: self.liveness_timeout,
        }
    }

    /// Reconciler settings.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: self.poll_interval,
            startup_grace: self.startup_grace,
            settle_ticks: self.settle_ticks,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A numeric environment variable could not be parsed.
    #[error("Invalid number in {0}: {1:?}")]
    InvalidNumber(&'static str, String),
}
