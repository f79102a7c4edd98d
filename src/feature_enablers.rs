//! Concrete [`FeatureEnabler`](crate::feature::FeatureEnabler) implementations
//!
//! Each struct here is the real side effect behind one of the `enable`able
//! feature names in [`crate::feature::names`]. They're registered against a
//! [`FeatureManager`](crate::feature::FeatureManager) in
//! `ServiceBuilder::build()`/`Server::serve()` and run once, either at boot
//! (seeding from [`crate::config::FeatureToggles`]) or later via an
//! operator-facing `enable`/`disable` call.

use async_trait::async_trait;

use crate::error::Result;
use crate::feature::FeatureEnabler;

/// Swagger/OpenAPI UI. The actual `utoipa_swagger_ui` router is mounted
/// unconditionally at build time (Axum routers can't be extended after
/// `.into_make_service()`); this enabler's job is just to log that the UI
/// became reachable, mirroring how `health`/`pprof` behave - the mount
/// point stays put and a feature check at request time decides whether it
/// answers or 404s.
pub struct SwaggerEnabler {
    pub path: String,
}

#[async_trait]
impl FeatureEnabler for SwaggerEnabler {
    async fn on_enable(&self) -> Result<()> {
        tracing::info!(path = %self.path, "swagger UI enabled");
        Ok(())
    }

    async fn on_disable(&self) -> Result<()> {
        tracing::info!(path = %self.path, "swagger UI disabled");
        Ok(())
    }
}

/// HTTP metrics. Stands up the OpenTelemetry meter provider (via
/// [`crate::observability::enable_otel_tracing`], which brings up both the
/// tracer and meter providers together) so
/// [`crate::middleware::metrics::create_metrics_layer`] has a meter to pull
/// from. Rejected post-start by `FeatureManager`, matching the one-shot
/// nature of standing up a meter provider.
pub struct MonitoringEnabler {
    pub service_name: String,
}

#[async_trait]
impl FeatureEnabler for MonitoringEnabler {
    async fn on_enable(&self) -> Result<()> {
        crate::observability::enable_otel_tracing(&self.service_name)?;
        tracing::info!(service = %self.service_name, "HTTP metrics enabled");
        Ok(())
    }
}

/// Distributed tracing. Stands up the OTel tracer provider and slots its
/// span layer into the subscriber installed by
/// [`crate::observability::init_tracing`]. Rejected post-start by
/// `FeatureManager` since the subscriber's layer can't be swapped back out
/// once real request spans have started flowing through it.
pub struct TracingEnabler {
    pub service_name: String,
}

#[async_trait]
impl FeatureEnabler for TracingEnabler {
    async fn on_enable(&self) -> Result<()> {
        crate::observability::enable_otel_tracing(&self.service_name)
    }

    async fn on_disable(&self) -> Result<()> {
        crate::observability::disable_otel_tracing();
        Ok(())
    }
}

/// WebSocket hub. Spawning the hub agent needs a live `AgentRuntime`, which
/// only `ServiceBuilder::build()` owns, so this enabler can't spawn it
/// itself - it just confirms the toggle is honored and logs. The actual
/// `WsHub::spawn` call happens in `build()` alongside the other
/// runtime-dependent agents (pool manager, etc.), gated on this same flag.
pub struct WscEnabler {
    pub path: String,
}

#[async_trait]
impl FeatureEnabler for WscEnabler {
    async fn on_enable(&self) -> Result<()> {
        tracing::info!(path = %self.path, "WebSocket hub enabled");
        Ok(())
    }

    async fn on_disable(&self) -> Result<()> {
        tracing::info!(path = %self.path, "WebSocket hub disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn swagger_enabler_on_enable_succeeds() {
        let enabler = SwaggerEnabler {
            path: "/swagger-ui".to_string(),
        };
        assert!(enabler.on_enable().await.is_ok());
        assert!(enabler.on_disable().await.is_ok());
    }

    #[tokio::test]
    async fn wsc_enabler_on_enable_succeeds() {
        let enabler = WscEnabler {
            path: "/ws".to_string(),
        };
        assert!(enabler.on_enable().await.is_ok());
    }
}
