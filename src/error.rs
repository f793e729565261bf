use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid response from server")]
    InvalidResponse,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Network error: {0}")]
    Network(String),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Internal client error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// The HTTP status the error originated from, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the query layer may retry a request that failed with this
    /// error. Unauthorized/forbidden responses and classified network
    /// failures are exempt from the retry budget.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Unauthorized
                | Self::Network(_)
                | Self::Http { status: 401 | 403, .. }
                | Self::InvalidCredentials
                | Self::Storage(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Network(format!("Unable to reach the LendHub API: {err}"))
        } else if err.is_timeout() {
            Self::Network(format!("Request timed out: {err}"))
        } else if err.is_decode() {
            Self::InvalidResponse
        } else {
            Self::Network(err.to_string())
        }
    }
}
