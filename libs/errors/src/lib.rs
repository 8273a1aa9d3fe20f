//! Unified error handling for PLC polling services
//!
//! Library crates keep their own error enums (`blocklink::BlockError`);
//! binaries and service layers convert everything into [`ServiceError`].

use blocklink::BlockError;
use thiserror::Error;

// ============================================================================
// ServiceError - Main error type
// ============================================================================

/// Main error type for service crates
#[derive(Debug, Error)]
pub enum ServiceError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Device Errors
    // ======================================
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Invalid parameter: {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    // ======================================
    // Output & Runtime Errors
    // ======================================
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Service startup failed: {0}")]
    StartupFailed(String),
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_parameter(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transport failures are; the next poll tick reconnects.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Block(e) => e.is_connection_error(),
            _ => false,
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Block(e) => match e {
                BlockError::OutOfRange { .. } => "OUT_OF_RANGE",
                BlockError::ValueOutOfDomain { .. } => "VALUE_OUT_OF_DOMAIN",
                BlockError::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
                BlockError::BlockNotAvailable(_) => "BLOCK_NOT_AVAILABLE",
                BlockError::InvalidAddress(_) => "INVALID_ADDRESS",
                BlockError::Connection(_) => "CONNECTION_ERROR",
            },
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::StartupFailed(_) => "STARTUP_FAILED",
        }
    }

    /// Process exit code for CLI front-ends
    ///
    /// 2 = bad input or configuration, 3 = device unreachable, 1 = anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::InvalidParameter { .. }
            | Self::NotFound { .. } => 2,
            Self::Block(e) if e.is_unavailable() => 3,
            Self::Block(_) => 2,
            Self::Serialization(_) | Self::StartupFailed(_) => 1,
        }
    }
}

// Conversion traits for common error types
impl From<figment::Error> for ServiceError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<blocklink::TransportError> for ServiceError {
    fn from(err: blocklink::TransportError) -> Self {
        Self::Block(BlockError::Connection(err))
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::ServiceError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::ServiceError::Configuration(format!($fmt, $($arg)*))
    };
}
