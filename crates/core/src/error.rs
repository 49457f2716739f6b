use crate::types::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A lock target or batch failed validation. Maps to HTTP 400.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The resource is leased by another user. Maps to HTTP 423.
    #[error("Locked: {message}")]
    Locked {
        message: String,
        locked_by: String,
        until: Timestamp,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}
