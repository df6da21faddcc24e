use thiserror::Error;

use super::CacheKind;

/// Errors that can occur during cache operations.
///
/// A cache miss is never an error: reads of absent keys return the
/// zero-value of the requested type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),
    #[error("The {0} cache backend is not configured")]
    NotConfigured(CacheKind),
    #[error("The {backend} cache backend does not support {operation}")]
    Unsupported {
        backend: CacheKind,
        operation: &'static str,
    },
}

impl CacheError {
    /// Shorthand for [`CacheError::Unsupported`].
    pub fn unsupported(backend: CacheKind, operation: &'static str) -> Self {
        CacheError::Unsupported { backend, operation }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let error = CacheError::ConnectionFailed("timeout".to_string());
        assert_eq!(error.to_string(), "Cache connection failed: timeout");
    }

    #[test]
    fn test_operation_failed_display() {
        let error = CacheError::OperationFailed("WRONGTYPE".to_string());
        assert_eq!(error.to_string(), "Cache operation failed: WRONGTYPE");
    }

    #[test]
    fn test_serialization_display() {
        let error = CacheError::Serialization("invalid JSON".to_string());
        assert_eq!(error.to_string(), "Serialization error: invalid JSON");
    }

    #[test]
    fn test_configuration_display() {
        let error = CacheError::Configuration("port is empty".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid cache configuration: port is empty"
        );
    }

    #[test]
    fn test_not_configured_display() {
        let error = CacheError::NotConfigured(CacheKind::Memcached);
        assert_eq!(
            error.to_string(),
            "The memcached cache backend is not configured"
        );
    }

    #[test]
    fn test_unsupported_display() {
        let error = CacheError::unsupported(CacheKind::InProcess, "increase");
        assert_eq!(
            error.to_string(),
            "The inprocess cache backend does not support increase"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::Serialization(_)));
    }
}
