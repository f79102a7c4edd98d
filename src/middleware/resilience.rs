//! Resilience middleware for fault tolerance and reliability
//!
//! This module provides circuit breaker, retry, and bulkhead patterns
//! to ensure service stability and graceful degradation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::ResilienceConfig as ResilienceSettings;
use crate::error::Error;

/// Configuration for resilience patterns
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Enable circuit breaker
    pub circuit_breaker_enabled: bool,
    /// Failure threshold before circuit opens (0.0-1.0)
    pub circuit_breaker_threshold: f64,
    /// Minimum requests before calculating failure rate
    pub circuit_breaker_min_requests: u64,
    /// Duration to wait before attempting to close circuit
    pub circuit_breaker_wait_duration: Duration,

    /// Enable retry logic
    pub retry_enabled: bool,
    /// Maximum number of retry attempts
    pub retry_max_attempts: usize,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Maximum delay for exponential backoff
    pub retry_max_delay: Duration,

    /// Enable bulkhead (concurrency limiting)
    pub bulkhead_enabled: bool,
    /// Maximum concurrent requests
    pub bulkhead_max_concurrent: usize,
    /// Maximum queued requests
    pub bulkhead_max_queued: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 0.5, // 50% failure rate
            circuit_breaker_min_requests: 10,
            circuit_breaker_wait_duration: Duration::from_secs(30),

            retry_enabled: true,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(10),

            bulkhead_enabled: true,
            bulkhead_max_concurrent: 100,
            bulkhead_max_queued: 200,
        }
    }
}

impl ResilienceConfig {
    /// Create a new resilience configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set circuit breaker enabled
    pub fn with_circuit_breaker(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    /// Set circuit breaker threshold
    pub fn with_circuit_breaker_threshold(mut self, threshold: f64) -> Self {
        self.circuit_breaker_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set retry enabled
    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    /// Set maximum retry attempts
    pub fn with_retry_max_attempts(mut self, attempts: usize) -> Self {
        self.retry_max_attempts = attempts;
        self
    }

    /// Set bulkhead enabled
    pub fn with_bulkhead(mut self, enabled: bool) -> Self {
        self.bulkhead_enabled = enabled;
        self
    }

    /// Set bulkhead maximum concurrent requests
    pub fn with_bulkhead_max_concurrent(mut self, max: usize) -> Self {
        self.bulkhead_max_concurrent = max;
        self
    }
}

/// Circuit breaker run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct CircuitBreakerState {
    current: CircuitState,
    consecutive_failures: u64,
    consecutive_successes: u64,
    opened_at: Option<Instant>,
    window: VecDeque<bool>,
}

/// Request-path circuit breaker, applied as CircuitBreaker(215) — after
/// RateLimit, before I18N. A downstream 5xx response counts as a failure;
/// once `circuit_breaker_threshold` of the sliding window (or
/// `circuit_breaker_min_requests` consecutive failures) trips, the circuit
/// opens and every request fails fast with a 503 until
/// `circuit_breaker_wait_duration` elapses, at which point a single
/// half-open probe is allowed through.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: ResilienceSettings,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: &ResilienceSettings) -> Self {
        let config = config.clone();
        let window_size = config.circuit_breaker_min_requests.max(1) as usize;
        Self {
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                window: VecDeque::with_capacity(window_size),
            })),
        }
    }

    /// `true` if this call should be let through (and is now on probation as
    /// the half-open probe).
    fn admit(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.current {
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.circuit_breaker_wait_duration())
                    .unwrap_or(false);
                if elapsed {
                    tracing::info!("circuit breaker: open -> half-open");
                    state.current = CircuitState::HalfOpen;
                    state.consecutive_successes = 0;
                    state.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen | CircuitState::Closed => true,
        }
    }

    fn record(&self, success: bool) {
        let mut state = self.state.lock().unwrap();
        if state.window.len() >= self.config.circuit_breaker_min_requests.max(1) as usize {
            state.window.pop_front();
        }
        state.window.push_back(success);

        if success {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
            if state.current == CircuitState::HalfOpen
                && state.consecutive_successes >= 1
            {
                tracing::info!("circuit breaker: half-open -> closed");
                state.current = CircuitState::Closed;
                state.opened_at = None;
            }
            return;
        }

        state.consecutive_failures += 1;
        state.consecutive_successes = 0;

        match state.current {
            CircuitState::Closed => {
                let enough_samples = state.window.len() as u64 >= self.config.circuit_breaker_min_requests;
                let failure_rate = state.window.iter().filter(|ok| !**ok).count() as f64 / state.window.len() as f64;
                if enough_samples && failure_rate >= self.config.circuit_breaker_threshold {
                    tracing::warn!(failure_rate, "circuit breaker: closed -> open");
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("circuit breaker: half-open probe failed, re-opening");
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Axum middleware entry point; registered via
    /// `axum::middleware::from_fn_with_state`.
    pub async fn middleware(
        State(breaker): State<Self>,
        request: Request<Body>,
        next: Next,
    ) -> Result<Response, Error> {
        if !breaker.config.circuit_breaker_enabled {
            return Ok(next.run(request).await);
        }

        if !breaker.admit() {
            return Err(Error::CircuitBreakerOpen);
        }

        let response = next.run(request).await;
        breaker.record(!response.status().is_server_error());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();
        assert!(config.circuit_breaker_enabled);
        assert!(config.retry_enabled);
        assert!(config.bulkhead_enabled);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ResilienceConfig::new()
            .with_circuit_breaker(false)
            .with_retry_max_attempts(5)
            .with_bulkhead_max_concurrent(50);

        assert!(!config.circuit_breaker_enabled);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.bulkhead_max_concurrent, 50);
    }

    #[test]
    fn test_threshold_clamping() {
        let config = ResilienceConfig::new()
            .with_circuit_breaker_threshold(1.5);

        assert_eq!(config.circuit_breaker_threshold, 1.0);

        let config = ResilienceConfig::new()
            .with_circuit_breaker_threshold(-0.5);

        assert_eq!(config.circuit_breaker_threshold, 0.0);
    }

    fn test_settings(min_requests: u64, threshold: f64, wait_secs: u64) -> ResilienceSettings {
        ResilienceSettings {
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: threshold,
            circuit_breaker_min_requests: min_requests,
            circuit_breaker_wait_secs: wait_secs,
            retry_enabled: false,
            retry_max_attempts: 0,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 0,
            bulkhead_enabled: false,
            bulkhead_max_concurrent: 0,
            bulkhead_max_queued: 0,
        }
    }

    #[test]
    fn circuit_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(&test_settings(2, 0.5, 30));

        assert!(breaker.admit());
        breaker.record(false);
        assert!(breaker.admit());
        breaker.record(false);

        assert!(!breaker.admit());
    }

    #[test]
    fn circuit_half_opens_after_wait_duration() {
        let breaker = CircuitBreaker::new(&test_settings(1, 0.5, 0));

        breaker.record(false);
        assert_eq!(breaker.state.lock().unwrap().current, CircuitState::Open);
        // Wait duration is zero, so the very next admission probes half-open.
        assert!(breaker.admit());
    }
}
