//! HTTP server with graceful shutdown

use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::Result,
    middleware::{request_id_layer, request_id_propagation_layer, sensitive_headers_layer, I18n},
};

#[cfg(feature = "signature")]
use crate::middleware::SignatureVerifier;

#[cfg(feature = "resilience")]
use crate::middleware::CircuitBreaker;

#[cfg(feature = "cache")]
use crate::middleware::RateLimit;

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server with the given router
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);

        // Run the built-in lifecycle chain (Logger → Context → Snowflake →
        // PoolManager) before anything else is wired up. A failure here
        // aborts startup; nothing has bound a socket yet.
        let chain = crate::initializer::build_default_chain(
            self.config.service.name.clone(),
            self.config.middleware.i18n.default_locale.clone(),
            cfg!(feature = "database") && self.config.database.is_some(),
            cfg!(feature = "cache") && self.config.redis.is_some(),
            cfg!(feature = "events") && self.config.nats.is_some(),
        );
        chain.startup().await?;

        // Feature registry: register enablers and run whatever the config
        // seeded as on. `Server::serve` is the bring-your-own-router entry
        // point, so unlike `ServiceBuilder::build` there's no `AppState` here
        // to attach the registry to - this only drives the process-wide side
        // effects (OTel providers), not per-request `is_enabled` gating.
        let features = crate::feature::FeatureManager::from_toggles(&self.config.features);
        features.register_enabler(
            crate::feature::names::MONITORING,
            std::sync::Arc::new(crate::feature_enablers::MonitoringEnabler {
                service_name: self.config.service.name.clone(),
            }),
        );
        features.register_enabler(
            crate::feature::names::TRACING,
            std::sync::Arc::new(crate::feature_enablers::TracingEnabler {
                service_name: self.config.service.name.clone(),
            }),
        );
        for (name, seeded_on) in features.snapshot() {
            if seeded_on {
                if let Err(e) = features.enable(&name).await {
                    tracing::warn!(feature = %name, error = %e, "failed to enable feature");
                }
            }
        }
        features.mark_started();

        // Log middleware configuration
        self.log_middleware_config();

        // Middleware stack, built bottom-up so the call order is the reverse
        // of the canonical pipeline order (the last `.layer()` call becomes
        // outermost, i.e. it runs first on the way in): Logging=10,
        // Recovery=20, RequestID=30, CORS=40, SecurityHeaders=110, Auth=120,
        // Signature=130, RateLimit=210, CircuitBreaker=215, I18N=310,
        // Metrics=320, Tracing=330.
        let body_limit = self.config.middleware.body_limit_mb * 1024 * 1024;
        let cors_layer = self.build_cors_layer();
        let i18n = I18n::new(&self.config.middleware.i18n);

        let mut app = app
            // Tracing(330) / Metrics(320): request span + latency histogram.
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            )
            // I18N(310): negotiate Accept-Language, attach Locale extension.
            .layer(axum::middleware::from_fn_with_state(i18n, I18n::middleware));

        // CircuitBreaker(215): trips open on a run of downstream 5xx and
        // fails fast with a 503 until the wait duration elapses.
        #[cfg(feature = "resilience")]
        if let Some(resilience_config) = &self.config.middleware.resilience {
            let breaker = CircuitBreaker::new(resilience_config);
            app = app.layer(axum::middleware::from_fn_with_state(
                breaker,
                CircuitBreaker::middleware,
            ));
        }

        // RateLimit(210): Redis-backed per-user/per-client request counter,
        // short-circuits with a 429 + Retry-After once the window is spent.
        #[cfg(feature = "cache")]
        {
            let redis_pool = match &self.config.redis {
                Some(redis_config) => match crate::cache::create_pool(redis_config).await {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        tracing::warn!(error = %e, "rate limiter: failed to connect to redis, rate limiting disabled");
                        None
                    }
                },
                None => None,
            };

            if let Some(pool) = redis_pool {
                let rate_limit = RateLimit::new(self.config.rate_limit.clone(), pool);
                app = app.layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    RateLimit::middleware,
                ));
            } else {
                tracing::warn!("  - Rate limiting: no Redis configured, layer not installed");
            }
        }

        // Signature(130): only wired when a shared secret is configured.
        #[cfg(feature = "signature")]
        if let Some(signature_config) = &self.config.middleware.signature {
            if signature_config.enabled {
                let verifier = SignatureVerifier::new(signature_config);
                app = app.layer(axum::middleware::from_fn_with_state(
                    verifier,
                    SignatureVerifier::middleware,
                ));
            }
        }

        let app = app
            // CORS(40)
            .layer(cors_layer)
            // Compression and request timeout sit alongside the fixed
            // pipeline rather than in it; always enabled.
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::with_status_code(
                http::StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(self.config.service.timeout_secs),
            ))
            .layer(RequestBodyLimitLayer::new(body_limit))
            // RequestID(30)
            .layer(sensitive_headers_layer())
            .layer(request_id_propagation_layer())
            .layer(request_id_layer())
            // Recovery(20) / Logging(10): outermost, sees every request first.
            .layer(CatchPanicLayer::new());

        // Create TCP listener
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        chain.shutdown().await;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Log middleware configuration for debugging
    fn log_middleware_config(&self) {
        tracing::info!("Middleware configuration:");
        tracing::info!("  - Panic recovery: enabled");
        tracing::info!("  - Request ID tracking: enabled");
        tracing::info!("  - Sensitive header masking: enabled");
        tracing::info!(
            "  - Request body limit: {} MB",
            self.config.middleware.body_limit_mb
        );
        tracing::info!("  - Compression: enabled");
        tracing::info!("  - CORS mode: {}", self.config.middleware.cors_mode);
        tracing::info!(
            "  - Request timeout: {} seconds",
            self.config.service.timeout_secs
        );

        // Log optional advanced middleware
        if let Some(ref resilience) = self.config.middleware.resilience {
            tracing::info!("  - Resilience configured:");
            tracing::info!(
                "    - Circuit breaker: {}",
                resilience.circuit_breaker_enabled
            );
            tracing::info!("    - Retry: {}", resilience.retry_enabled);
            tracing::info!("    - Bulkhead: {}", resilience.bulkhead_enabled);
        } else {
            tracing::info!("  - Resilience: not configured");
        }

        if let Some(ref metrics) = self.config.middleware.metrics {
            tracing::info!("  - HTTP metrics: enabled");
            tracing::info!("    - Include path: {}", metrics.include_path);
            tracing::info!("    - Include method: {}", metrics.include_method);
            tracing::info!("    - Include status: {}", metrics.include_status);
        } else {
            tracing::info!("  - HTTP metrics: not configured");
        }

        if let Some(ref governor) = self.config.middleware.governor {
            tracing::info!(
                "  - Local rate limiting: {} req / {} sec (burst: {})",
                governor.requests_per_period,
                governor.period_secs,
                governor.burst_size
            );
        } else {
            tracing::info!("  - Local rate limiting: not configured");
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build CORS layer based on configuration
    fn build_cors_layer(&self) -> CorsLayer {
        match self.config.middleware.cors_mode.as_str() {
            "permissive" => {
                tracing::debug!("Enabling permissive CORS");
                CorsLayer::permissive()
            }
            "restrictive" => {
                tracing::debug!("Enabling restrictive CORS (default deny)");
                CorsLayer::new()
            }
            "disabled" => {
                tracing::debug!("CORS disabled (using restrictive)");
                CorsLayer::new()
            }
            _ => {
                tracing::warn!(
                    "Unknown CORS mode: {}, defaulting to permissive",
                    self.config.middleware.cors_mode
                );
                CorsLayer::permissive()
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let config = Config::default();
        let server = Server::new(config.clone());
        assert_eq!(server.config().service.port, config.service.port);
    }
}
