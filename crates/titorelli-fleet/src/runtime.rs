// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for titorelli-fleet.
//!
//! [`FleetRuntime`] wires the bot store, the container platform, the
//! controller registry and the reconciler together, runs the reconciliation
//! loop in the background, and hands out the [`BotsService`] the management
//! API calls into.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use titorelli_fleet::platform::{DockhostCli, DockhostConfig};
//! use titorelli_fleet::runtime::FleetRuntime;
//! use titorelli_fleet::store::SqliteBotStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteBotStore::from_path("data/bots.sqlite3").await?);
//!     let platform = Arc::new(DockhostCli::new(DockhostConfig {
//!         executable: "dockhost".into(),
//!         token: std::env::var("DOCKHOST_TOKEN")?,
//!     }));
//!
//!     let runtime = FleetRuntime::builder()
//!         .store(store)
//!         .platform(platform)
//!         .project("titorelli")
//!         .container_prefix("tbot")
//!         .image("registry/bot:latest")
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     runtime.service().start(42).await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::controller::{ControllerRegistry, ControllerSettings};
use crate::naming::ContainerNameGenerator;
use crate::platform::ContainerPlatform;
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::service::BotsService;
use crate::store::BotStore;
use crate::workload::WorkloadEnv;

/// Builder for creating a [`FleetRuntime`].
pub struct FleetRuntimeBuilder {
    store: Option<Arc<dyn BotStore>>,
    platform: Option<Arc<dyn ContainerPlatform>>,
    project: Option<String>,
    container_prefix: Option<String>,
    container_suffix: Option<String>,
    image: Option<String>,
    env: WorkloadEnv,
    reload_debounce: Duration,
    liveness_timeout: Duration,
    reconciler: ReconcilerConfig,
}

impl Default for FleetRuntimeBuilder {
    fn default() -> Self {
        let controller = ControllerSettings::default();
        Self {
            store: None,
            platform: None,
            project: None,
            container_prefix: None,
            container_suffix: None,
            image: None,
            env: controller.env,
            reload_debounce: controller.reload_debounce,
            liveness_timeout: controller.liveness_timeout,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl FleetRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every setting from a loaded [`Config`]. Store and platform still
    /// have to be provided.
    pub fn config(self, config: &Config) -> Self {
        let controller = config.controller_settings();
        Self {
            project: Some(config.project.clone()),
            container_prefix: Some(config.container_prefix.clone()),
            container_suffix: config.container_suffix.clone(),
            image: Some(config.image.clone()),
            env: controller.env,
            reload_debounce: controller.reload_debounce,
            liveness_timeout: controller.liveness_timeout,
            reconciler: config.reconciler_config(),
            ..self
        }
    }

    /// Set the bot store (required).
    pub fn store(mut self, store: Arc<dyn BotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the container platform (required).
    pub fn platform(mut self, platform: Arc<dyn ContainerPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the platform project (required).
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the workload name prefix (required).
    pub fn container_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.container_prefix = Some(prefix.into());
        self
    }

    /// Set the workload name generation suffix.
    ///
    /// Default: none.
    pub fn container_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.container_suffix = Some(suffix.into());
        self
    }

    /// Set the default image for new bots (required).
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the environment injected into workloads.
    ///
    /// Default: empty API origin, no CAS or telemetry origin.
    pub fn workload_env(mut self, env: WorkloadEnv) -> Self {
        self.env = env;
        self
    }

    /// Set the reload debounce window.
    ///
    /// Default: 3 seconds.
    pub fn reload_debounce(mut self, window: Duration) -> Self {
        self.reload_debounce = window;
        self
    }

    /// Set the liveness timeout.
    ///
    /// Default: 30 seconds.
    pub fn liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Set the reconciliation poll interval.
    ///
    /// Default: 1200 milliseconds.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.reconciler.poll_interval = interval;
        self
    }

    /// Set the startup grace period for bots in `starting`.
    ///
    /// Default: 120 seconds.
    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.reconciler.startup_grace = grace;
        self
    }

    /// Set how many consecutive idle ticks downgrade a bot to `stopped`.
    ///
    /// Default: 3.
    pub fn settle_ticks(mut self, ticks: u32) -> Self {
        self.reconciler.settle_ticks = ticks;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<FleetRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let platform = self
            .platform
            .ok_or_else(|| anyhow::anyhow!("platform is required"))?;
        let project = self
            .project
            .ok_or_else(|| anyhow::anyhow!("project is required"))?;
        let container_prefix = self
            .container_prefix
            .ok_or_else(|| anyhow::anyhow!("container_prefix is required"))?;
        let image = self
            .image
            .ok_or_else(|| anyhow::anyhow!("image is required"))?;

        Ok(FleetRuntimeConfig {
            store,
            platform,
            project,
            naming: ContainerNameGenerator::new(container_prefix, self.container_suffix),
            image,
            controller: ControllerSettings {
                env: self.env,
                reload_debounce: self.reload_debounce,
                liveness_timeout: self.liveness_timeout,
            },
            reconciler: self.reconciler,
        })
    }
}

/// Configuration for a [`FleetRuntime`].
pub struct FleetRuntimeConfig {
    store: Arc<dyn BotStore>,
    platform: Arc<dyn ContainerPlatform>,
    project: String,
    naming: ContainerNameGenerator,
    image: String,
    controller: ControllerSettings,
    reconciler: ReconcilerConfig,
}

impl FleetRuntimeConfig {
    /// Start the runtime, spawning the reconciliation loop.
    pub async fn start(self) -> Result<FleetRuntime> {
        info!(
            project = %self.project,
            platform = self.platform.platform_type(),
            prefix = self.naming.prefix(),
            suffix = ?self.naming.suffix(),
            "Starting FleetRuntime"
        );

        let registry = Arc::new(ControllerRegistry::new(
            self.platform.clone(),
            self.store.clone(),
            self.controller,
        ));

        let reconciler = Arc::new(Reconciler::new(
            self.project,
            self.naming.clone(),
            self.platform,
            self.store.clone(),
            registry.clone(),
            self.reconciler,
        ));
        let reconciler_shutdown = reconciler.shutdown_handle();

        let service = Arc::new(BotsService::new(
            self.store,
            registry.clone(),
            reconciler.clone(),
            self.naming,
            self.image,
        ));

        let worker = reconciler.clone();
        let reconciler_handle = tokio::spawn(async move {
            worker.run().await;
        });

        Ok(FleetRuntime {
            reconciler_handle,
            reconciler_shutdown,
            registry,
            reconciler,
            service,
        })
    }
}

/// Running fleet: the reconciliation loop plus the management service.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct FleetRuntime {
    reconciler_handle: JoinHandle<()>,
    reconciler_shutdown: Arc<Notify>,
    registry: Arc<ControllerRegistry>,
    reconciler: Arc<Reconciler>,
    service: Arc<BotsService>,
}

impl FleetRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> FleetRuntimeBuilder {
        FleetRuntimeBuilder::new()
    }

    /// Management service.
    pub fn service(&self) -> &Arc<BotsService> {
        &self.service
    }

    /// The reconciler driven by this runtime.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Live controllers.
    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the reconciliation loop, waits for it, then cancels every
    /// pending debounce and liveness timer.
    pub async fn shutdown(self) -> Result<()> {
        info!("FleetRuntime shutting down...");

        self.reconciler_shutdown.notify_one();

        if let Err(e) = self.reconciler_handle.await {
            error!("Reconciler task panicked: {}", e);
            self.registry.shutdown();
            return Err(anyhow::anyhow!("reconciler task panicked: {}", e));
        }

        self.registry.shutdown();
        info!("FleetRuntime shutdown complete");
        Ok(())
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.reconciler_handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;
    use crate::store::MemoryBotStore;

    fn complete_builder() -> FleetRuntimeBuilder {
        FleetRuntimeBuilder::new()
            .store(Arc::new(MemoryBotStore::new()))
            .platform(Arc::new(MockPlatform::new()))
            .project("proj")
            .container_prefix("tbot")
            .image("img")
    }

    #[test]
    fn test_builder_defaults() {
        let builder = FleetRuntimeBuilder::new();

        assert!(builder.store.is_none());
        assert!(builder.platform.is_none());
        assert_eq!(builder.reload_debounce, Duration::from_secs(3));
        assert_eq!(builder.liveness_timeout, Duration::from_secs(30));
        assert_eq!(builder.reconciler.poll_interval, Duration::from_millis(1_200));
        assert_eq!(builder.reconciler.startup_grace, Duration::from_secs(120));
        assert_eq!(builder.reconciler.settle_ticks, 3);
    }

    #[test]
    fn test_builder_setters() {
        let builder = FleetRuntimeBuilder::new()
            .reload_debounce(Duration::from_millis(500))
            .liveness_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_secs(2))
            .startup_grace(Duration::ZERO)
            .settle_ticks(1)
            .container_suffix("next");

        assert_eq!(builder.reload_debounce, Duration::from_millis(500));
        assert_eq!(builder.liveness_timeout, Duration::from_secs(5));
        assert_eq!(builder.reconciler.poll_interval, Duration::from_secs(2));
        assert_eq!(builder.reconciler.startup_grace, Duration::ZERO);
        assert_eq!(builder.reconciler.settle_ticks, 1);
        assert_eq!(builder.container_suffix.as_deref(), Some("next"));
    }

    #[test]
    fn test_builder_build_fails_without_store() {
        let result = FleetRuntimeBuilder::new().build();

        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("store is required"));
        }
    }

    #[test]
    fn test_builder_build_fails_without_image() {
        let result = FleetRuntimeBuilder::new()
            .store(Arc::new(MemoryBotStore::new()))
            .platform(Arc::new(MockPlatform::new()))
            .project("proj")
            .container_prefix("tbot")
            .build();

        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("image is required"));
        }
    }

    #[test]
    fn test_builder_build_succeeds() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.project, "proj");
        assert_eq!(config.naming.generate(1, 2), "tbot-1-2");
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let runtime = complete_builder().build().unwrap().start().await.unwrap();

        assert!(runtime.is_running());
        assert!(runtime.registry().is_empty());
        assert_eq!(runtime.reconciler().project(), "proj");

        runtime.shutdown().await.unwrap();
    }
}
