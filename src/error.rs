//! Error types for fleetwatch

use crate::session::Role;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Location access was refused by the user or the platform
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("No signed in session")]
    NotSignedIn,

    #[error("Operation requires a {expected:?} session, current session is {actual:?}")]
    WrongRole {
        expected: Role,
        actual: Role,
    },

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Change feed error: {0}")]
    Feed(String),

    #[error("Location service error: {0}")]
    Location(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Decode(#[from] serde_json::Error),
}
