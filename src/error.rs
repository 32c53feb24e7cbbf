//! Error types for the self-update flow.

/// Failure of one step of an update attempt.
///
/// "No asset for this platform" is not an error: the resolver returns
/// `Ok(None)`. Cleanup failures are logged and never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Bad HTTP status, timeout, or an interrupted response stream.
    #[error("network error: {0}")]
    Network(String),

    /// Release metadata could not be understood.
    #[error("parse error: {0}")]
    Parse(String),

    /// The downloaded archive is corrupt or could not be unpacked.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The updater binary is missing or could not be started.
    #[error("launch error: {0}")]
    Launch(String),

    /// A file could not be copied into the install directory, even after the retry.
    #[error("copy error: {0}")]
    Copy(String),

    /// The update configuration file is unreadable.
    #[error("config error: {0}")]
    Config(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;
