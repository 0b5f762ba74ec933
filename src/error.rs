#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Backend answered with a non-success status.
    #[error("{operation} failed ({status}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Store(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// Rejected locally before any request was sent.
    #[error("{0}")]
    InvalidInput(&'static str),
}

impl Error {
    /// HTTP status of a backend rejection, if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            #[cfg(feature = "http")]
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for 401/403: the backend no longer accepts the credential.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
