use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

pub use bridge_types::CERTIFICATE_INVALID_STATUS;

/// Application error type for the cloud service HTTP surface.
///
/// Carries enough structure for logging and for the JSON error body. The
/// `CertificateInvalid` variant maps to the reserved 495 status that drives
/// client-side rotation.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Storage Errors =====
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Message cache error: {0}")]
    Cache(String),

    // ===== Message Bus Errors =====
    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // ===== Authentication Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Certificate invalid: {0}")]
    CertificateInvalid(String),

    #[error("Registration rejected: {0}")]
    Forbidden(String),

    // ===== Validation Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Internal Server Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::CertificateInvalid(_) => {
                StatusCode::from_u16(CERTIFICATE_INVALID_STATUS).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Bus(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(msg) => format!("Authentication failed: {}", msg),
            AppError::CertificateInvalid(_) => "Certificate invalid, rotate and retry".to_string(),
            AppError::Forbidden(msg) => format!("Registration rejected: {}", msg),
            AppError::Validation(msg) => format!("Validation error: {}", msg),
            AppError::Json(_) => "Malformed JSON body".to_string(),
            AppError::NotFound(msg) => format!("Not found: {}", msg),
            AppError::Timeout(msg) => format!("Timed out: {}", msg),
            AppError::Bus(_) => "Message bus error".to_string(),
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "Cache error".to_string(),
            AppError::KeyStore(_) => "Key store error".to_string(),
            AppError::Cache(_) => "Message cache error".to_string(),
            AppError::Config(msg) => format!("Configuration error: {}", msg),
            AppError::Internal(msg) => format!("Internal error: {}", msg),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::CertificateInvalid(_) => "CERTIFICATE_INVALID",
            AppError::Forbidden(_) => "REGISTRATION_REJECTED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Bus(_) => "BUS_ERROR",
            #[cfg(feature = "redis")]
            AppError::Redis(_) => "REDIS_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::KeyStore(_) => "KEY_STORE_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication failed"
            );
        } else if matches!(self, AppError::CertificateInvalid(_)) {
            tracing::info!(
                error = %self,
                error_code = %code,
                "Demanding certificate rotation"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        let response_body = if status.is_server_error() {
            // For server errors, don't expose internal details to client
            json!({
                "error": "Internal server error",
                "error_code": error_code,
                "status": status.as_u16(),
            })
        } else {
            json!({
                "error": self.user_message(),
                "error_code": error_code,
                "status": status.as_u16(),
            })
        };

        (status, axum::Json(response_body)).into_response()
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        AppError::Auth(msg.into())
    }

    /// Create a rotation demand (HTTP 495)
    pub fn certificate_invalid(msg: impl Into<String>) -> Self {
        AppError::CertificateInvalid(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn bus(msg: impl Into<String>) -> Self {
        AppError::Bus(msg.into())
    }

    pub fn key_store(msg: impl Into<String>) -> Self {
        AppError::KeyStore(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        AppError::Cache(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        AppError::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    /// Create an internal server error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
