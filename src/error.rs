//! Error types for serial acceleration capture

use thiserror::Error;

/// Error type for capture operations
///
/// Framing loss is deliberately absent: malformed bytes are recovered inside
/// the frame decoder and only ever show up as counters.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Serial port could not be opened
    #[error("Failed to open source {port}: {source}")]
    SourceOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Byte source failed irrecoverably while reading
    #[error("Source read error: {0}")]
    SourceRead(#[source] std::io::Error),

    /// Row sink failed to write or flush
    #[error("Sink write error: {0}")]
    Sink(#[source] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted recording could not be parsed
    #[error("Malformed recording at line {line}: {message}")]
    Recording { line: usize, message: String },

    /// Storage backend error (HDF5)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Capture thread could not be started or died before reporting
    #[error("Capture thread failed: {0}")]
    SessionThread(String),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;
