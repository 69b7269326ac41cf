//! crates/mangati_client/src/error.rs

/// Everything the client can report to the calling UI layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with {status}: {message}")]
    Status { status: u16, message: String },

    /// The server rejected the session; credentials have been cleared and the
    /// user should be sent to the login screen, then back to `return_to`.
    #[error("Login required")]
    LoginRequired { return_to: Option<String> },

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Malformed token: {0}")]
    Token(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}
