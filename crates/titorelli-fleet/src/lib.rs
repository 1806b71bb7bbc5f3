// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Titorelli Fleet - Bot Fleet Reconciliation Engine
//!
//! This crate keeps a multi-tenant fleet of messaging-bot workloads running on
//! an external container platform. Each bot record in the store carries the
//! desired configuration and the last-commanded lifecycle state; the platform
//! only tells us what is actually running through periodic listings and
//! through workloads reporting their own liveness.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     Management API (external)                        │
//! └──────────────────────────────────────────────────────────────────────┘
//!              │ create/get/list/update/remove        ▲ reportAlive,
//!              ▼                                      │ assertIdentity
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                  titorelli-fleet (This Crate)                        │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌──────────────────────┐   │
//! │  │ BotsService │──►│ BotController    │──►│ WorkloadHandle       │   │
//! │  └─────────────┘   │ (per bot: lock,  │   │ (existence-checked   │   │
//! │                    │  debounce timer, │   │  create/start/stop/  │   │
//! │  ┌─────────────┐   │  liveness timer) │   │  destroy/status)     │   │
//! │  │ Reconciler  │──►└──────────────────┘   └──────────────────────┘   │
//! │  │ (poll, diff,│            │                        │               │
//! │  │  correct)   │            ▼                        ▼               │
//! │  └─────────────┘   ┌──────────────────┐   ┌──────────────────────┐   │
//! │         └─────────►│ BotStore         │   │ ContainerPlatform    │   │
//! │                    │ (SQLite)         │   │ (Dockhost CLI)       │   │
//! │                    └──────────────────┘   └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Bot State Machine
//!
//! ```text
//!     ┌─────────┐  start   ┌──────────┐ heartbeat ┌─────────┐
//!     │ CREATED │─────────►│ STARTING │──────────►│ RUNNING │
//!     └─────────┘          └────┬─────┘           └────┬────┘
//!                               │ liveness             │ stop
//!                               │ timeout              ▼
//!                          ┌────▼───┐            ┌──────────┐  idle  ┌─────────┐
//!                          │ FAILED │◄───────────│ STOPPING │───────►│ STOPPED │
//!                          └────────┘  (running, └──────────┘        └─────────┘
//!                                       timeout)
//!
//!     any ──(delete / workload vanished)──► DELETED (terminal)
//! ```
//!
//! # Reconciliation
//!
//! | State | Observed | Action |
//! |-------|----------|--------|
//! | starting, running | stopped, paused | scale to 1 |
//! | starting, running | updating | log possibly failed |
//! | stopping | ready, paused | scale to 0 |
//! | running, stopping | all idle for several ticks | mark stopped |
//! | any (past grace) | workload absent | mark deleted |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TITORELLI_DATABASE_URL` | No | `sqlite:data/bots.sqlite3?mode=rwc` | Bot store |
//! | `DOCKHOST_TOKEN` | Yes | - | Platform API token |
//! | `DOCKHOST_EXECUTABLE` | No | `dockhost` | Platform CLI |
//! | `DOCKHOST_PROJECT` | Yes | - | Project the workloads live in |
//! | `DOCKHOST_CONTAINER` | Yes | - | Workload name prefix |
//! | `DOCKHOST_CONTAINER_SUFFIX` | No | - | Generation suffix |
//! | `DOCKHOST_IMAGE` | Yes | - | Default bot image |
//! | `API_ORIGIN` | Yes | - | Origin injected as `TITORELLI_HOST` |
//! | `CAS_ORIGIN` | No | - | Injected when set |
//! | `TELEMETRY_ORIGIN` | No | - | Injected when set |
//! | `TITORELLI_POLL_INTERVAL_MS` | No | `1200` | Reconciliation interval |
//! | `TITORELLI_RELOAD_DEBOUNCE_MS` | No | `3000` | Hard reload debounce |
//! | `TITORELLI_LIVENESS_TIMEOUT_SECS` | No | `30` | Heartbeat timeout |
//! | `TITORELLI_STARTUP_GRACE_SECS` | No | `120` | Grace for `starting` bots |
//! | `TITORELLI_SETTLE_TICKS` | No | `3` | Idle ticks before `stopped` |

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for fleet operations.
pub mod error;

/// Opaque client identifiers for workloads.
pub mod identity;

/// Workload name generation and recognition.
pub mod naming;

/// Container platform backends (Dockhost CLI, mock).
pub mod platform;

/// Bot record persistence.
pub mod store;

/// Existence-checked operations on one workload.
pub mod workload;

/// Per-bot debounce and liveness timers.
pub mod timers;

/// Per-bot lifecycle controllers.
pub mod controller;

/// Reconciliation decision table.
pub mod reconcile;

/// Background reconciliation loop.
pub mod reconciler;

/// Bot management service.
pub mod service;

/// Embeddable runtime for titorelli-fleet.
pub mod runtime;

pub use config::Config;
pub use error::Error;
