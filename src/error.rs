//! Error types for capture pipeline operations

use crate::types::RequestId;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for capture pipeline operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Error taxonomy for the capture-completion pipeline
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Matte or photo bytes could not be turned into a pixel buffer
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// The terminal capture event arrived without photo bytes
    #[error("No photo data was received before the capture finished")]
    MissingPhotoData,

    /// The capture subsystem reported a native error (message kept verbatim)
    #[error("{0}")]
    CaptureSubsystem(String),

    /// A single save call failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Every save call of a session failed
    #[error("Failed to save images")]
    SaveFailed,

    /// An event targeted a request that is not in flight
    #[error("Unknown capture request: {0}")]
    UnknownRequest(RequestId),

    /// An event arrived in a lifecycle state that cannot accept it
    #[error("Event '{event}' is not valid in state '{state}'")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    /// The session stayed in flight longer than the watchdog allows
    #[error("Capture session still in flight after {0:?}")]
    StaleSession(Duration),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Sidecar or config (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Create a new decode failure
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::DecodeFailure(msg.into())
    }

    /// Wrap a native capture-subsystem error, keeping its message verbatim
    pub fn native<E: std::fmt::Display>(error: E) -> Self {
        Self::CaptureSubsystem(error.to_string())
    }

    /// Create a new persistence failure
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::PersistenceFailure(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether this error ends the session it occurred in.
    ///
    /// Per-feature decode and persistence failures are absorbed and only
    /// lower the saved count.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, Self::DecodeFailure(_) | Self::PersistenceFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        assert_eq!(CaptureError::SaveFailed.to_string(), "Failed to save images");

        let err = CaptureError::native("The operation couldn't be completed");
        assert_eq!(err.to_string(), "The operation couldn't be completed");

        let err = CaptureError::UnknownRequest(RequestId::new(7));
        assert_eq!(err.to_string(), "Unknown capture request: #7");
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(!CaptureError::decode("bad matte").is_session_fatal());
        assert!(!CaptureError::persistence("disk full").is_session_fatal());
        assert!(CaptureError::MissingPhotoData.is_session_fatal());
        assert!(CaptureError::native("device busy").is_session_fatal());
        assert!(CaptureError::SaveFailed.is_session_fatal());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CaptureError::file_io_error("write image", Path::new("/sandbox/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write image"));
        assert!(error_string.contains("/sandbox/a.png"));

        let err = CaptureError::config_value_error("jpeg_quality", 150, "0-100");
        let error_string = err.to_string();
        assert!(error_string.contains("jpeg_quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("0-100"));
    }
}
