//! Error types and handling for cdata

/// Result type alias for cdata operations
pub type Result<T> = std::result::Result<T, CdataError>;

/// Errors surfaced by sessions, the side channel and views.
///
/// A full buffer on the blocking write path is not an error: the writer
/// suspends until the drain fires. Only the conditions below reach callers.
#[derive(Debug, thiserror::Error)]
pub enum CdataError {
    /// The writer was interrupted while suspended on a full buffer
    #[error("Write cancelled after admitting {admitted} byte(s)")]
    Cancelled { admitted: usize },

    /// Non-blocking append ran out of room
    #[error("Overflow: admitted {admitted} byte(s), rejected {rejected}")]
    Overflow { admitted: usize, rejected: usize },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Side-channel command code not recognised
    #[error("Unknown control command: {code:#x}")]
    UnknownCommand { code: u32 },

    /// Operation not permitted by the view's access mode
    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },

    /// The session backing this handle has been closed
    #[error("Session closed")]
    SessionClosed,

    /// I/O related errors (anonymous maps, sinks)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The deferred drain context could not be started
    #[error("Timer error: {message}")]
    Timer { message: String },
}

impl CdataError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(admitted: usize) -> Self {
        Self::Cancelled { admitted }
    }

    /// Create an overflow error
    pub fn overflow(admitted: usize, rejected: usize) -> Self {
        Self::Overflow { admitted, rejected }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a permission error
    pub fn permission_denied(operation: impl Into<String>) -> Self {
        Self::PermissionDenied {
            operation: operation.into(),
        }
    }

    /// Create a timer error
    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer {
            message: message.into(),
        }
    }

    /// Bytes committed before the failure, for the partial-write errors
    pub fn admitted(&self) -> Option<usize> {
        match self {
            Self::Cancelled { admitted } | Self::Overflow { admitted, .. } => Some(*admitted),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CdataError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CdataError::cancelled(3);
        assert!(matches!(err, CdataError::Cancelled { admitted: 3 }));

        let err = CdataError::invalid_parameter("capacity", "must be non-zero");
        assert!(matches!(err, CdataError::InvalidParameter { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = CdataError::overflow(2, 5);
        assert_eq!(err.to_string(), "Overflow: admitted 2 byte(s), rejected 5");

        let err = CdataError::UnknownCommand { code: 0x42 };
        assert_eq!(err.to_string(), "Unknown control command: 0x42");
    }

    #[test]
    fn test_admitted_count() {
        assert_eq!(CdataError::cancelled(4).admitted(), Some(4));
        assert_eq!(CdataError::overflow(1, 2).admitted(), Some(1));
        assert_eq!(CdataError::SessionClosed.admitted(), None);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: CdataError = io.into();
        assert!(matches!(err, CdataError::Io { source: Some(_), .. }));
    }
}
