//! Error types, the numeric error-code taxonomy, and response conversion
//!
//! Every [`Error`] variant carries an explicit [`ErrorCode`] drawn from a fixed,
//! reserved numeric range. One static table (`ErrorCode::status` / `ErrorCode::grpc_code`)
//! maps a code to both the HTTP status and the `tonic::Code` it produces, so the
//! HTTP and gRPC error writers can never disagree about the same failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

// ============================================================================
// Structured Database Errors
// ============================================================================

/// Database operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
pub enum DatabaseOperation {
    /// Establishing a database connection
    Connect,
    /// Executing a query
    Query,
    /// Inserting records
    Insert,
    /// Updating records
    Update,
    /// Deleting records
    Delete,
    /// Transaction operations (begin, commit, rollback)
    Transaction,
    /// Syncing data (e.g., Turso embedded replica sync)
    Sync,
    /// Running database migrations
    Migration,
    /// Acquiring a connection from the pool
    PoolAcquire,
}

#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Transaction => write!(f, "transaction"),
            Self::Sync => write!(f, "sync"),
            Self::Migration => write!(f, "migration"),
            Self::PoolAcquire => write!(f, "pool_acquire"),
        }
    }
}

/// Category of database error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
pub enum DatabaseErrorKind {
    /// Failed to establish connection
    ConnectionFailed,
    /// Record not found
    NotFound,
    /// Constraint violation (unique, foreign key, check)
    ConstraintViolation,
    /// Query execution failed
    QueryFailed,
    /// Transaction failed (begin, commit, or rollback)
    TransactionFailed,
    /// Type conversion error
    TypeConversion,
    /// Sync operation failed (Turso specific)
    SyncFailed,
    /// Configuration error
    Configuration,
    /// Operation timed out
    Timeout,
    /// Permission denied
    PermissionDenied,
    /// Connection pool exhausted
    PoolExhausted,
    /// Other/unknown error
    Other,
}

#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::SyncFailed => write!(f, "sync_failed"),
            Self::Configuration => write!(f, "configuration"),
            Self::Timeout => write!(f, "timeout"),
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured database error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
pub struct DatabaseError {
    /// The operation being performed when the error occurred
    pub operation: DatabaseOperation,
    /// The category of error
    pub kind: DatabaseErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Additional context (e.g., table name, query fragment)
    pub context: Option<String>,
}

#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
impl DatabaseError {
    pub fn new(operation: DatabaseOperation, kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(
        operation: DatabaseOperation,
        kind: DatabaseErrorKind,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            context: Some(context.into()),
        }
    }

    pub fn not_found(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::NotFound, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseOperation::Connect, DatabaseErrorKind::ConnectionFailed, message)
    }

    pub fn constraint_violation(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::ConstraintViolation, message)
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseOperation::Query, DatabaseErrorKind::QueryFailed, message)
    }

    pub fn timeout(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::new(operation, DatabaseErrorKind::Timeout, message)
    }

    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(DatabaseOperation::PoolAcquire, DatabaseErrorKind::PoolExhausted, message)
    }

    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseOperation::Transaction, DatabaseErrorKind::TransactionFailed, message)
    }

    pub fn sync_failed(message: impl Into<String>) -> Self {
        Self::new(DatabaseOperation::Sync, DatabaseErrorKind::SyncFailed, message)
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailed
                | DatabaseErrorKind::Timeout
                | DatabaseErrorKind::PoolExhausted
                | DatabaseErrorKind::SyncFailed
        )
    }

    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Database {} error during {}: {}", self.kind, self.operation, self.message)?;
        if let Some(ref ctx) = self.context {
            write!(f, " [context: {}]", ctx)?;
        }
        Ok(())
    }
}

#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
impl std::error::Error for DatabaseError {}

/// Sanitize a database URL by removing credentials
#[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos + 1..];
            return format!("{}<redacted>@{}", scheme, after_at);
        }
    }
    if url.contains("authToken=") || url.contains("auth_token=") {
        let base = url.split('?').next().unwrap_or(url);
        return format!("{}?<credentials redacted>", base);
    }
    url.to_string()
}

// ============================================================================
// Error code taxonomy
// ============================================================================

/// Numeric error code drawn from a fixed, reserved range.
///
/// Ranges:
/// - `1000-1999` gateway core (config `1100-1199`, server infra `1200-1299`)
/// - `2000-2999` auth (tokens `2100-2199`)
/// - `3000-3999` requests (validation `3100-3199`)
/// - `4000-4999` rate limiting / circuit breaker
/// - `5000-5999` middleware (recovery/signature `5100-5199`)
/// - `6000-6999` gRPC
/// - `7000-7999` health
/// - `8000-8999` swagger
/// - `9000-9999` generic / uncategorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    InternalError = 1000,
    ConfigError = 1001,
    IoError = 1002,
    FeatureDisabled = 1100,
    FeatureAlreadyEnabled = 1101,
    ServerBindError = 1200,
    ShutdownTimeout = 1201,

    Unauthorized = 2000,
    Forbidden = 2001,
    AuthError = 2002,
    TokenExpired = 2100,
    InvalidToken = 2101,
    AccountLoginElsewhere = 2102,

    BadRequest = 3000,
    NotFound = 3001,
    Conflict = 3002,
    ValidationError = 3100,

    RateLimitExceeded = 4000,
    CircuitBreakerOpen = 4001,
    BulkheadRejected = 4002,

    RecoveryError = 5000,
    SignatureMissing = 5100,
    SignatureInvalid = 5101,

    GrpcInternal = 6000,
    GrpcUnavailable = 6001,

    HealthCheckFailed = 7000,
    DependencyUnavailable = 7001,

    SwaggerError = 8000,

    ExternalError = 9000,
    NotSupported = 9001,
    Other = 9002,
    DatabaseError = 9003,
    CacheError = 9004,
    EventError = 9005,
    SessionError = 9006,
    AuditError = 9007,
}

impl ErrorCode {
    /// HTTP status this code maps to.
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::InternalError
            | ErrorCode::ConfigError
            | ErrorCode::IoError
            | ErrorCode::ServerBindError
            | ErrorCode::ShutdownTimeout
            | ErrorCode::DatabaseError
            | ErrorCode::CacheError
            | ErrorCode::EventError
            | ErrorCode::SessionError
            | ErrorCode::AuditError
            | ErrorCode::Other => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::FeatureDisabled | ErrorCode::FeatureAlreadyEnabled => StatusCode::CONFLICT,

            ErrorCode::Unauthorized
            | ErrorCode::AuthError
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidToken
            | ErrorCode::AccountLoginElsewhere => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::BulkheadRejected => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::RecoveryError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::SignatureMissing | ErrorCode::SignatureInvalid => StatusCode::UNAUTHORIZED,

            ErrorCode::GrpcInternal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::GrpcUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::HealthCheckFailed | ErrorCode::DependencyUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::SwaggerError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::ExternalError => StatusCode::BAD_GATEWAY,
            ErrorCode::NotSupported => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// gRPC status code this error code maps to.
    #[cfg(feature = "grpc")]
    pub fn grpc_code(self) -> tonic::Code {
        match self {
            ErrorCode::Unauthorized
            | ErrorCode::AuthError
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidToken
            | ErrorCode::AccountLoginElsewhere => tonic::Code::Unauthenticated,

            ErrorCode::Forbidden => tonic::Code::PermissionDenied,
            ErrorCode::BadRequest | ErrorCode::ValidationError => tonic::Code::InvalidArgument,
            ErrorCode::NotFound => tonic::Code::NotFound,
            ErrorCode::Conflict | ErrorCode::FeatureAlreadyEnabled => tonic::Code::AlreadyExists,
            ErrorCode::RateLimitExceeded => tonic::Code::ResourceExhausted,
            ErrorCode::CircuitBreakerOpen | ErrorCode::BulkheadRejected => tonic::Code::Unavailable,
            ErrorCode::SignatureMissing | ErrorCode::SignatureInvalid => tonic::Code::Unauthenticated,
            ErrorCode::HealthCheckFailed | ErrorCode::DependencyUnavailable => tonic::Code::Unavailable,
            ErrorCode::GrpcUnavailable | ErrorCode::ExternalError => tonic::Code::Unavailable,
            ErrorCode::NotSupported => tonic::Code::Unimplemented,
            _ => tonic::Code::Internal,
        }
    }

    /// Stable, machine-readable string for the HTTP envelope (`{code, error, status}`).
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::FeatureDisabled => "FEATURE_DISABLED",
            ErrorCode::FeatureAlreadyEnabled => "FEATURE_ALREADY_ENABLED",
            ErrorCode::ServerBindError => "SERVER_BIND_ERROR",
            ErrorCode::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::AccountLoginElsewhere => "ACCOUNT_LOGIN_ELSEWHERE",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            ErrorCode::BulkheadRejected => "BULKHEAD_REJECTED",
            ErrorCode::RecoveryError => "RECOVERY_ERROR",
            ErrorCode::SignatureMissing => "SIGNATURE_MISSING",
            ErrorCode::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorCode::GrpcInternal => "GRPC_INTERNAL",
            ErrorCode::GrpcUnavailable => "GRPC_UNAVAILABLE",
            ErrorCode::HealthCheckFailed => "HEALTH_CHECK_FAILED",
            ErrorCode::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            ErrorCode::SwaggerError => "SWAGGER_ERROR",
            ErrorCode::ExternalError => "EXTERNAL_ERROR",
            ErrorCode::NotSupported => "NOT_SUPPORTED",
            ErrorCode::Other => "OTHER",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::EventError => "EVENT_ERROR",
            ErrorCode::SessionError => "SESSION_ERROR",
            ErrorCode::AuditError => "AUDIT_ERROR",
        }
    }

    /// Numeric value of the code.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type alias using the framework error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway runtime.
///
/// Every variant carries its [`ErrorCode`] explicitly via [`Error::code`], which
/// both [`IntoResponse`] and the `tonic::Status` conversion read from — there is
/// exactly one place a failure is mapped to a wire representation.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
    #[error("{0}")]
    Database(DatabaseError),

    #[cfg(feature = "cache")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    #[cfg(feature = "events")]
    #[error("NATS error: {0}")]
    Nats(String),

    #[error("PASETO error: {0}")]
    Paseto(String),

    #[cfg(feature = "auth")]
    #[error("Auth error: {0}")]
    Auth(String),

    #[cfg(feature = "jwt")]
    #[error("JWT error: {0}")]
    Jwt(Box<jsonwebtoken::errors::Error>),

    #[error("HTTP error: {0}")]
    Http(Box<axum::http::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Account signed in from another session")]
    AccountLoginElsewhere,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Circuit breaker open")]
    CircuitBreakerOpen,

    #[error("Request signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),

    #[cfg(feature = "session")]
    #[error("Session error: {0}")]
    Session(String),

    #[cfg(feature = "audit")]
    #[error("Audit error: {0}")]
    Audit(String),
}

impl Error {
    /// Construct an [`Error::Internal`] from anything `Display`-able.
    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    /// The [`ErrorCode`] this error reports to both the HTTP and gRPC writers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Config(_) => ErrorCode::ConfigError,
            #[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
            Error::Database(_) => ErrorCode::DatabaseError,
            #[cfg(feature = "cache")]
            Error::Redis(_) => ErrorCode::CacheError,
            #[cfg(feature = "events")]
            Error::Nats(_) => ErrorCode::EventError,
            Error::Paseto(_) => ErrorCode::InvalidToken,
            #[cfg(feature = "auth")]
            Error::Auth(_) => ErrorCode::AuthError,
            #[cfg(feature = "jwt")]
            Error::Jwt(_) => ErrorCode::InvalidToken,
            Error::Http(_) => ErrorCode::BadRequest,
            Error::Io(_) => ErrorCode::IoError,
            Error::Unauthorized(_) => ErrorCode::Unauthorized,
            Error::TokenExpired => ErrorCode::TokenExpired,
            Error::InvalidToken(_) => ErrorCode::InvalidToken,
            Error::AccountLoginElsewhere => ErrorCode::AccountLoginElsewhere,
            Error::Forbidden(_) => ErrorCode::Forbidden,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::BadRequest(_) => ErrorCode::BadRequest,
            Error::RateLimitExceeded => ErrorCode::RateLimitExceeded,
            Error::CircuitBreakerOpen => ErrorCode::CircuitBreakerOpen,
            Error::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::ValidationError(_) => ErrorCode::ValidationError,
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::External(_) => ErrorCode::ExternalError,
            Error::Internal(_) => ErrorCode::InternalError,
            Error::Other(_) => ErrorCode::Other,
            #[cfg(feature = "session")]
            Error::Session(_) => ErrorCode::SessionError,
            #[cfg(feature = "audit")]
            Error::Audit(_) => ErrorCode::AuditError,
        }
    }
}

/// Error response body: the `{code, error, status}` envelope for HTTP.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Numeric error code
    pub code: u32,

    /// Human-readable error message
    pub error: String,

    /// HTTP status code
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u32(),
            error: message.into(),
            status: code.http_status().as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = code.http_status();

        // Internal failure detail is logged, never reflected back to the caller.
        match &self {
            Error::Config(e) => tracing::error!("config error: {e}"),
            #[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
            Error::Database(e) => tracing::error!(
                operation = %e.operation,
                kind = %e.kind,
                context = ?e.context,
                retriable = e.is_retriable(),
                "database error: {}", e.message
            ),
            #[cfg(feature = "cache")]
            Error::Redis(e) => tracing::error!("redis error: {e}"),
            #[cfg(feature = "events")]
            Error::Nats(e) => tracing::error!("nats error: {e}"),
            Error::Io(e) => tracing::error!("io error: {e}"),
            Error::External(msg) => tracing::error!("external service error: {msg}"),
            Error::Internal(msg) => tracing::error!("internal error: {msg}"),
            Error::Other(msg) => tracing::error!("unexpected error: {msg}"),
            _ => {}
        }

        let user_message = match &self {
            #[cfg(any(feature = "database", feature = "turso", feature = "surrealdb"))]
            Error::Database(e) => match e.kind {
                DatabaseErrorKind::NotFound => "Resource not found".to_string(),
                DatabaseErrorKind::ConstraintViolation => "Operation conflicts with existing data".to_string(),
                DatabaseErrorKind::Timeout => "Database operation timed out".to_string(),
                DatabaseErrorKind::PermissionDenied => "Database permission denied".to_string(),
                _ => "Database operation failed".to_string(),
            },
            #[cfg(feature = "cache")]
            Error::Redis(_) => "Cache operation failed".to_string(),
            #[cfg(feature = "events")]
            Error::Nats(_) => "Event system error".to_string(),
            Error::Io(_) => "I/O operation failed".to_string(),
            Error::Internal(_) => "Internal server error".to_string(),
            Error::Other(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(code, user_message))).into_response()
    }
}

#[cfg(feature = "grpc")]
impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        let code = err.code();
        tonic::Status::new(code.grpc_code(), err.to_string())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.error, self.status)
    }
}

// Manual `From` implementations for third-party error types

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let db_err = match &e {
            sqlx::Error::RowNotFound => {
                DatabaseError::not_found(DatabaseOperation::Query, "row not found")
            }
            sqlx::Error::PoolTimedOut => {
                DatabaseError::timeout(DatabaseOperation::PoolAcquire, "pool acquire timed out")
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::constraint_violation(DatabaseOperation::Insert, db.message().to_string())
            }
            other => DatabaseError::query_failed(other.to_string()),
        };
        Error::Database(db_err)
    }
}

#[cfg(feature = "turso")]
impl From<libsql::Error> for Error {
    fn from(e: libsql::Error) -> Self {
        Error::Database(DatabaseError::query_failed(e.to_string()))
    }
}

#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for Error {
    fn from(e: surrealdb::Error) -> Self {
        Error::Database(DatabaseError::query_failed(e.to_string()))
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Redis(Box::new(e))
    }
}

#[cfg(feature = "jwt")]
impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => Error::TokenExpired,
            _ => Error::Jwt(Box::new(e)),
        }
    }
}

impl From<axum::http::Error> for Error {
    fn from(e: axum::http::Error) -> Self {
        Error::Http(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_ranges_match_taxonomy() {
        assert!((1000..2000).contains(&ErrorCode::InternalError.as_u32()));
        assert!((2000..3000).contains(&ErrorCode::Unauthorized.as_u32()));
        assert!((2100..2200).contains(&ErrorCode::TokenExpired.as_u32()));
        assert!((3000..4000).contains(&ErrorCode::BadRequest.as_u32()));
        assert!((4000..5000).contains(&ErrorCode::RateLimitExceeded.as_u32()));
        assert!((5000..6000).contains(&ErrorCode::RecoveryError.as_u32()));
        assert!((7000..8000).contains(&ErrorCode::HealthCheckFailed.as_u32()));
        assert!((9000..10000).contains(&ErrorCode::Other.as_u32()));
    }

    #[test]
    fn token_expired_maps_to_unauthorized() {
        let err = Error::TokenExpired;
        assert_eq!(err.code().http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code().as_str(), "TOKEN_EXPIRED");
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let err = Error::RateLimitExceeded;
        assert_eq!(err.code().http_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn error_response_envelope_shape() {
        let resp = ErrorResponse::new(ErrorCode::NotFound, "widget missing");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 3001);
        assert_eq!(json["status"], 404);
        assert_eq!(json["error"], "widget missing");
    }

    #[cfg(feature = "grpc")]
    #[test]
    fn grpc_status_round_trip() {
        let err = Error::Forbidden("no access".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
    }
}
