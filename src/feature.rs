//! Runtime feature toggles
//!
//! [`FeatureToggles`](crate::config::FeatureToggles) seeds the gateway's
//! initial feature state at load time; [`FeatureManager`] is what the
//! running process actually consults and lets operators flip at runtime
//! (e.g. from an admin endpoint) without a restart. It's backed by a
//! [`DashMap`] for the same reason the pool agents avoid a global lock:
//! every HTTP/gRPC request on every worker thread reads this map.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::FeatureToggles;
use crate::error::{Error, Result};

/// Well-known feature names, matching [`FeatureToggles`](crate::config::FeatureToggles)'s fields.
pub mod names {
    pub const SWAGGER: &str = "swagger";
    pub const MONITORING: &str = "monitoring";
    pub const TRACING: &str = "tracing";
    pub const HEALTH: &str = "health";
    pub const PPROF: &str = "pprof";
    pub const WSC: &str = "wsc";
}

/// The real work behind a feature toggle flipping on or off.
///
/// `FeatureManager` only tracks booleans; a `FeatureEnabler` is what a given
/// feature name is actually wired to (standing up a UI route, an OTel
/// provider, a background agent). Registered via
/// [`FeatureManager::register_enabler`].
#[async_trait]
pub trait FeatureEnabler: Send + Sync {
    /// Run when the feature transitions to enabled (including the initial
    /// seed from [`FeatureToggles`] at startup).
    async fn on_enable(&self) -> Result<()>;

    /// Run when the feature transitions to disabled. Most enablers have
    /// nothing to unwind and can rely on the default no-op.
    async fn on_disable(&self) -> Result<()> {
        Ok(())
    }
}

/// Runtime, thread-safe registry of feature on/off state.
///
/// `health` and `tracing` are load-bearing — the readiness endpoint and the
/// tracing subscriber are wired up once at startup, so disabling them after
/// [`FeatureManager::mark_started`] has been called is rejected rather than
/// silently accepted and ignored. `monitoring`, `tracing` and `wsc` stand up
/// process-wide resources (a meter/tracer provider, a hub agent) that can't
/// be torn down and rebuilt on the fly, so *enabling* them is likewise
/// rejected once the server has started.
pub struct FeatureManager {
    flags: DashMap<String, bool>,
    enablers: DashMap<String, Arc<dyn FeatureEnabler>>,
    started: std::sync::atomic::AtomicBool,
}

impl FeatureManager {
    /// Seed the manager from the service's configured toggles. Enablers are
    /// registered separately via [`Self::register_enabler`] and run by
    /// calling [`Self::enable`] for each toggle that started out `true`.
    #[must_use]
    pub fn from_toggles(toggles: &FeatureToggles) -> Self {
        let flags = DashMap::new();
        flags.insert(names::SWAGGER.to_string(), toggles.swagger);
        flags.insert(names::MONITORING.to_string(), toggles.monitoring);
        flags.insert(names::TRACING.to_string(), toggles.tracing);
        flags.insert(names::HEALTH.to_string(), toggles.health);
        flags.insert(names::PPROF.to_string(), toggles.pprof);
        flags.insert(names::WSC.to_string(), toggles.wsc);
        Self {
            flags,
            enablers: DashMap::new(),
            started: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Register the enabler responsible for a feature's real side effects.
    /// Replaces any enabler previously registered under the same name.
    pub fn register_enabler(&self, name: &str, enabler: Arc<dyn FeatureEnabler>) {
        self.enablers.insert(name.to_string(), enabler);
    }

    /// Called once the server has begun accepting connections. After this,
    /// `health` and `tracing` can no longer be disabled, and `monitoring`,
    /// `tracing`, `wsc` can no longer be (re-)enabled.
    pub fn mark_started(&self) {
        self.started.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_started(&self) -> bool {
        self.started.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Whether a feature is currently enabled. Unknown names are treated as
    /// disabled rather than an error, so callers can probe speculative flags.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).map(|v| *v).unwrap_or(false)
    }

    /// Enable a feature and run its registered enabler, if any.
    ///
    /// Returns [`Error::Conflict`] if the process has started and the
    /// feature is one of the process-wide-resource set (`monitoring`,
    /// `tracing`, `wsc`) that can only be wired up once.
    pub async fn enable(&self, name: &str) -> Result<()> {
        if self.is_started()
            && matches!(name, names::MONITORING | names::TRACING | names::WSC)
        {
            return Err(Error::Conflict(format!(
                "feature '{name}' cannot be enabled after the server has started"
            )));
        }
        self.flags.insert(name.to_string(), true);
        if let Some(enabler) = self.enablers.get(name).map(|e| e.clone()) {
            enabler.on_enable().await?;
        }
        Ok(())
    }

    /// Disable a feature and run its registered enabler's teardown, if any.
    ///
    /// Returns [`Error::Conflict`] if the process has started and the
    /// feature is one of the load-bearing always-on-after-start set
    /// (`health`, `tracing`).
    pub async fn disable(&self, name: &str) -> Result<()> {
        if self.is_started() && matches!(name, names::HEALTH | names::TRACING) {
            return Err(Error::Conflict(format!(
                "feature '{name}' cannot be disabled after the server has started"
            )));
        }
        self.flags.insert(name.to_string(), false);
        if let Some(enabler) = self.enablers.get(name).map(|e| e.clone()) {
            enabler.on_disable().await?;
        }
        Ok(())
    }

    /// Snapshot every registered flag, e.g. for an admin/status endpoint.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.flags.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_from_toggles() {
        let toggles = FeatureToggles {
            swagger: true,
            ..FeatureToggles::default()
        };
        let manager = FeatureManager::from_toggles(&toggles);
        assert!(manager.is_enabled(names::SWAGGER));
        assert!(manager.is_enabled(names::HEALTH));
        assert!(!manager.is_enabled(names::PPROF));
    }

    #[test]
    fn unknown_feature_is_disabled() {
        let manager = FeatureManager::from_toggles(&FeatureToggles::default());
        assert!(!manager.is_enabled("does-not-exist"));
    }

    #[tokio::test]
    async fn disable_after_start_rejects_load_bearing_features() {
        let manager = FeatureManager::from_toggles(&FeatureToggles::default());
        manager.mark_started();
        assert!(manager.disable(names::HEALTH).await.is_err());
        assert!(manager.disable(names::SWAGGER).await.is_ok());
    }

    #[tokio::test]
    async fn disable_before_start_allows_anything() {
        let manager = FeatureManager::from_toggles(&FeatureToggles::default());
        assert!(manager.disable(names::HEALTH).await.is_ok());
    }

    #[tokio::test]
    async fn enable_after_start_rejects_process_wide_features() {
        let manager = FeatureManager::from_toggles(&FeatureToggles::default());
        manager.mark_started();
        assert!(manager.enable(names::MONITORING).await.is_err());
        assert!(manager.enable(names::SWAGGER).await.is_ok());
    }

    struct CountingEnabler {
        enabled: std::sync::atomic::AtomicUsize,
        disabled: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl FeatureEnabler for CountingEnabler {
        async fn on_enable(&self) -> Result<()> {
            self.enabled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn on_disable(&self) -> Result<()> {
            self.disabled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn enable_runs_registered_enabler() {
        let manager = FeatureManager::from_toggles(&FeatureToggles::default());
        let enabler = Arc::new(CountingEnabler {
            enabled: std::sync::atomic::AtomicUsize::new(0),
            disabled: std::sync::atomic::AtomicUsize::new(0),
        });
        manager.register_enabler(names::SWAGGER, enabler.clone());

        manager.enable(names::SWAGGER).await.unwrap();
        assert_eq!(enabler.enabled.load(std::sync::atomic::Ordering::SeqCst), 1);

        manager.disable(names::SWAGGER).await.unwrap();
        assert_eq!(enabler.disabled.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
