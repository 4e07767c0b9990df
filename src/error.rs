//! Error types for permisync
//!
//! Defines a comprehensive error enum covering all failure modes across the
//! system. Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Result type alias for permisync operations
pub type Result<T> = std::result::Result<T, PermisyncError>;

/// Comprehensive error type for permisync operations
#[derive(Error, Debug)]
pub enum PermisyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// The remote answered but reported an unsuccessful payload
    #[error("Remote error: {0}")]
    Remote(String),

    /// Identity validation errors (malformed or checksum-failing identity)
    #[error("Validation error: {0}")]
    Validation(String),

    /// An identity already registered to another employee
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// One canonical identity maps to two differing display names
    #[error("Identity conflict: {rut} is already registered to \"{existing_name}\"")]
    IdentityConflict {
        rut: String,
        existing_name: String,
    },

    /// Offline with no usable local backup
    #[error("No local backup available")]
    NoLocalData,

    /// Record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Parsing errors outside the tolerant row parser
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl PermisyncError {
    /// Whether this failure should drive the retry/offline-fallback path.
    ///
    /// Transport failures and unsuccessful remote payloads are transient;
    /// validation, configuration, and local-storage failures are not and
    /// reject the operation at the point of attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            PermisyncError::Network(_) | PermisyncError::Remote(_) => true,
            PermisyncError::Http(e) => {
                // Non-transport HTTP failures (e.g. body decode) are permanent
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_status()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PermisyncError::Network("connection refused".into()).is_transient());
        assert!(PermisyncError::Remote("quota exceeded".into()).is_transient());
        assert!(!PermisyncError::Validation("bad identity".into()).is_transient());
        assert!(!PermisyncError::Config("missing endpoint".into()).is_transient());
        assert!(!PermisyncError::NoLocalData.is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = PermisyncError::IdentityConflict {
            rut: "123456785".into(),
            existing_name: "Juan Pérez".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("123456785"));
        assert!(msg.contains("Juan Pérez"));
    }
}
