//! Error types for stint-core operations.

/// All errors that can occur while driving a stint timer.
#[derive(Debug, thiserror::Error)]
pub enum StintError {
    /// Every run must be tagged; a tag that is empty after trimming is
    /// rejected before any state changes.
    #[error("tag must not be empty")]
    EmptyTag,

    /// The backing store rejected a write or could not be reached.
    #[error("store operation failed: {0}")]
    Store(String),

    /// An open-stint row exists but cannot be interpreted. Recovery treats
    /// this as "no recoverable run" rather than a fatal condition.
    #[error("open stint row is malformed: {0}")]
    CorruptOpenStint(String),
}

/// Convenience type alias for Results using StintError.
pub type Result<T> = std::result::Result<T, StintError>;

// Conversion for string error compatibility at the store boundary
impl From<StintError> for String {
    fn from(err: StintError) -> String {
        err.to_string()
    }
}
