// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for titorelli-fleet.

use thiserror::Error;

/// Fleet errors surfaced to the callers of management commands.
///
/// Workload-side failures are absorbed by [`crate::workload::WorkloadHandle`]
/// and never show up here, with the exception of [`Error::Platform`] which is
/// only returned by calls whose whole purpose is to query the platform.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Bot record store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Container platform call failed.
    #[error("Platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),

    /// Bot was not found by its external id.
    #[error("Bot with id = {0} not found")]
    BotNotFound(i64),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using fleet Error.
pub type Result<T> = std::result::Result<T, Error>;
