use buksu_core::types::Timestamp;

/// Errors from the lock service client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Another user holds the lease (HTTP 423).
    #[error("{message}")]
    Locked {
        message: String,
        locked_by: String,
        until: Timestamp,
    },

    /// The lock service returned a non-2xx status code.
    #[error("Lock API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The target could not be resolved or failed validation locally.
    #[error("Invalid lock target: {0}")]
    InvalidTarget(String),

    /// No usable access token, or the server rejected it after a refresh.
    #[error("Not authenticated")]
    Unauthorized,

    /// The configured base URL cannot carry API paths.
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}
