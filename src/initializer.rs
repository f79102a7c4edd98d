//! Priority-ordered startup/shutdown lifecycle for gateway components
//!
//! An [`Initializer`] is anything the gateway must bring up before it starts
//! accepting traffic and tear down, in reverse order, once it stops. Core
//! infrastructure claims the low end of the priority range; anything a
//! consumer registers with [`InitializerChain::register`] should use
//! `15` or higher so it always runs after the framework's own components.
//!
//! | Priority | Component |
//! |----------|-----------|
//! | 1        | Logger |
//! | 2        | Context |
//! | 5        | Snowflake/ID generator |
//! | 10       | Pool manager |
//! | 15+      | User-registered initializers |

use async_trait::async_trait;

use crate::agents::messages::{ComponentHealth, HealthStatus};
use crate::error::Result;
use crate::ids::NodeId;

/// Priority reserved for the structured-logging initializer.
pub const PRIORITY_LOGGER: i32 = 1;
/// Priority reserved for the request-context initializer.
pub const PRIORITY_CONTEXT: i32 = 2;
/// Priority reserved for the distributed ID generator initializer.
pub const PRIORITY_SNOWFLAKE: i32 = 5;
/// Priority reserved for the connection-pool manager initializer.
pub const PRIORITY_POOL_MANAGER: i32 = 10;
/// Lowest priority a user-registered initializer may use.
pub const PRIORITY_USER_MIN: i32 = 15;

/// A single lifecycle-managed gateway component.
///
/// `initialize` runs in ascending priority order at startup; `cleanup` runs
/// in descending priority order at shutdown, mirroring the order components
/// were brought up so later components (which may depend on earlier ones)
/// tear down first.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Human-readable component name, used in logs and health reports.
    fn name(&self) -> &str;

    /// Startup priority. Lower values initialize first.
    fn priority(&self) -> i32;

    /// Bring the component up. A non-optional component returning `Err`
    /// aborts startup entirely.
    async fn initialize(&self) -> Result<()>;

    /// Tear the component down. Errors are logged but do not block the
    /// remaining cleanup steps from running.
    async fn cleanup(&self) -> Result<()>;

    /// Report current health for aggregation into the readiness endpoint.
    async fn health_check(&self) -> ComponentHealth;
}

/// Ordered collection of [`Initializer`]s driven through startup and shutdown.
#[derive(Default)]
pub struct InitializerChain {
    initializers: Vec<Box<dyn Initializer>>,
}

impl InitializerChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Order of registration does not matter; the
    /// chain sorts by [`Initializer::priority`] before running.
    pub fn register(&mut self, initializer: Box<dyn Initializer>) -> &mut Self {
        self.initializers.push(initializer);
        self
    }

    /// Run every initializer's `initialize` in ascending priority order.
    ///
    /// Stops and returns the first error encountered; components already
    /// initialized are left running (the caller is expected to call
    /// [`Self::shutdown`] to unwind them).
    pub async fn startup(&self) -> Result<()> {
        let mut ordered: Vec<&Box<dyn Initializer>> = self.initializers.iter().collect();
        ordered.sort_by_key(|i| i.priority());

        for initializer in ordered {
            tracing::info!(
                component = initializer.name(),
                priority = initializer.priority(),
                "initializing component"
            );
            initializer.initialize().await?;
        }
        Ok(())
    }

    /// Run every initializer's `cleanup` in descending priority order.
    ///
    /// Errors are logged and collected but do not stop subsequent cleanups
    /// from running — a failing shutdown step should never strand the rest
    /// of the chain mid-teardown.
    pub async fn shutdown(&self) {
        let mut ordered: Vec<&Box<dyn Initializer>> = self.initializers.iter().collect();
        ordered.sort_by_key(|i| std::cmp::Reverse(i.priority()));

        for initializer in ordered {
            tracing::info!(component = initializer.name(), "cleaning up component");
            if let Err(e) = initializer.cleanup().await {
                tracing::error!(component = initializer.name(), error = %e, "component cleanup failed");
            }
        }
    }

    /// Aggregate health across every registered component.
    pub async fn health_check(&self) -> Vec<ComponentHealth> {
        let mut results = Vec::with_capacity(self.initializers.len());
        for initializer in &self.initializers {
            results.push(initializer.health_check().await);
        }
        results
    }

    /// Number of registered initializers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.initializers.len()
    }

    /// Whether no initializers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.initializers.is_empty()
    }
}

/// Brings the structured-logging subscriber up. `tracing_subscriber`'s
/// global subscriber can only be installed once per process, so this is a
/// no-op when the caller has already called
/// [`crate::observability::init_tracing`] up front; it exists so the logger
/// is still represented, ordered, and health-checked as a lifecycle
/// component.
pub struct LoggerInitializer {
    service_name: String,
}

impl LoggerInitializer {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl Initializer for LoggerInitializer {
    fn name(&self) -> &str {
        "logger"
    }

    fn priority(&self) -> i32 {
        PRIORITY_LOGGER
    }

    async fn initialize(&self) -> Result<()> {
        tracing::debug!(service = %self.service_name, "logger initializer ready");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name().to_string(),
            status: HealthStatus::Healthy,
            message: String::new(),
        }
    }
}

/// Validates the request-context configuration (locale negotiation, request
/// ID propagation) the middleware stack depends on before any requests are
/// accepted.
pub struct ContextInitializer {
    default_locale: String,
}

impl ContextInitializer {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
        }
    }
}

#[async_trait]
impl Initializer for ContextInitializer {
    fn name(&self) -> &str {
        "context"
    }

    fn priority(&self) -> i32 {
        PRIORITY_CONTEXT
    }

    async fn initialize(&self) -> Result<()> {
        if self.default_locale.trim().is_empty() {
            return Err(crate::error::Error::ValidationError(
                "default_locale must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name().to_string(),
            status: HealthStatus::Healthy,
            message: format!("default_locale={}", self.default_locale),
        }
    }
}

/// Mints this process's [`NodeId`], used to tag distributed WebSocket
/// messages and correlate logs across instances.
pub struct SnowflakeInitializer {
    node_id: std::sync::OnceLock<NodeId>,
}

impl SnowflakeInitializer {
    pub fn new() -> Self {
        Self {
            node_id: std::sync::OnceLock::new(),
        }
    }

    /// The ID minted during `initialize`. Panics if called before startup.
    pub fn node_id(&self) -> &NodeId {
        self.node_id
            .get()
            .expect("SnowflakeInitializer::node_id called before initialize")
    }
}

impl Default for SnowflakeInitializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Initializer for SnowflakeInitializer {
    fn name(&self) -> &str {
        "snowflake"
    }

    fn priority(&self) -> i32 {
        PRIORITY_SNOWFLAKE
    }

    async fn initialize(&self) -> Result<()> {
        let id = NodeId::new();
        tracing::info!(node_id = %id, "node id minted");
        let _ = self.node_id.set(id);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name().to_string(),
            status: if self.node_id.get().is_some() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: self
                .node_id
                .get()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Reports whether the configured backing stores (database/cache/events)
/// are expected at this instance. The pool agents themselves own connection
/// lifecycle; this just makes "is a pool manager configured at all" visible
/// to the startup chain and readiness endpoint.
pub struct PoolManagerInitializer {
    database_configured: bool,
    cache_configured: bool,
    events_configured: bool,
}

impl PoolManagerInitializer {
    pub fn new(database_configured: bool, cache_configured: bool, events_configured: bool) -> Self {
        Self {
            database_configured,
            cache_configured,
            events_configured,
        }
    }
}

#[async_trait]
impl Initializer for PoolManagerInitializer {
    fn name(&self) -> &str {
        "pool-manager"
    }

    fn priority(&self) -> i32 {
        PRIORITY_POOL_MANAGER
    }

    async fn initialize(&self) -> Result<()> {
        tracing::debug!(
            database = self.database_configured,
            cache = self.cache_configured,
            events = self.events_configured,
            "pool manager configuration resolved"
        );
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name().to_string(),
            status: HealthStatus::Healthy,
            message: format!(
                "database={} cache={} events={}",
                self.database_configured, self.cache_configured, self.events_configured
            ),
        }
    }
}

/// Assembles the chain of built-in initializers every gateway instance
/// brings up before accepting traffic: Logger(1) → Context(2) →
/// Snowflake(5) → PoolManager(10). Callers register any additional
/// components at [`PRIORITY_USER_MIN`] (15) or higher.
pub fn build_default_chain(
    service_name: impl Into<String>,
    default_locale: impl Into<String>,
    database_configured: bool,
    cache_configured: bool,
    events_configured: bool,
) -> InitializerChain {
    let mut chain = InitializerChain::new();
    chain.register(Box::new(LoggerInitializer::new(service_name)));
    chain.register(Box::new(ContextInitializer::new(default_locale)));
    chain.register(Box::new(SnowflakeInitializer::new()));
    chain.register(Box::new(PoolManagerInitializer::new(
        database_configured,
        cache_configured,
        events_configured,
    )));
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::messages::HealthStatus;
    use std::sync::Arc;

    struct RecordingInitializer {
        name: &'static str,
        priority: i32,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Initializer for RecordingInitializer {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn initialize(&self) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn cleanup(&self) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn health_check(&self) -> ComponentHealth {
            ComponentHealth {
                name: self.name.to_string(),
                status: HealthStatus::Healthy,
                message: String::new(),
            }
        }
    }

    #[tokio::test]
    async fn startup_runs_in_ascending_priority_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = InitializerChain::new();
        chain.register(Box::new(RecordingInitializer {
            name: "pool-manager",
            priority: PRIORITY_POOL_MANAGER,
            order: order.clone(),
        }));
        chain.register(Box::new(RecordingInitializer {
            name: "logger",
            priority: PRIORITY_LOGGER,
            order: order.clone(),
        }));
        chain.register(Box::new(RecordingInitializer {
            name: "user-plugin",
            priority: PRIORITY_USER_MIN,
            order: order.clone(),
        }));

        chain.startup().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["logger", "pool-manager", "user-plugin"]);
    }

    #[tokio::test]
    async fn shutdown_runs_in_descending_priority_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = InitializerChain::new();
        chain.register(Box::new(RecordingInitializer {
            name: "logger",
            priority: PRIORITY_LOGGER,
            order: order.clone(),
        }));
        chain.register(Box::new(RecordingInitializer {
            name: "pool-manager",
            priority: PRIORITY_POOL_MANAGER,
            order: order.clone(),
        }));

        chain.shutdown().await;

        assert_eq!(*order.lock().unwrap(), vec!["pool-manager", "logger"]);
    }

    #[tokio::test]
    async fn aggregated_health_reports_every_component() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = InitializerChain::new();
        chain.register(Box::new(RecordingInitializer {
            name: "logger",
            priority: PRIORITY_LOGGER,
            order,
        }));

        let health = chain.health_check().await;
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].name, "logger");
    }
}
