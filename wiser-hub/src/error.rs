use thiserror::Error;

/// Errors raised while talking to a Wiser hub.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid hub host: '{0}'")]
    InvalidHost(String),

    #[error("Invalid hub secret: not a valid HTTP header value")]
    InvalidSecret,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Hub returned {status} for {path}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl HubError {
    /// True when the hub could not be reached at all (connect failure or timeout).
    pub fn is_unreachable(&self) -> bool {
        match self {
            HubError::Http { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias using [`HubError`].
pub type Result<T> = std::result::Result<T, HubError>;
