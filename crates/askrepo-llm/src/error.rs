/// Coarse classification of a failed model-service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Endpoint could not be reached (connection refused, DNS, timeout).
    ServiceUnavailable,
    /// Endpoint answered with a non-2xx status.
    NonSuccess,
    /// Endpoint answered 2xx but the body did not have the expected shape.
    MalformedResponse,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("service unavailable at {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    Malformed {
        endpoint: &'static str,
        reason: String,
    },

    #[error("rate limited")]
    RateLimited,

    #[error("service reported an error: {0}")]
    Remote(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Map a transport error onto `Unavailable` when the service could not be reached.
    pub(crate) fn from_send(url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable {
                url: url.to_owned(),
                reason: err.to_string(),
            }
        } else {
            Self::Http(err)
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unavailable { .. } => FailureKind::ServiceUnavailable,
            Self::Status { .. } | Self::RateLimited => FailureKind::NonSuccess,
            Self::Malformed { .. } | Self::Json(_) => FailureKind::MalformedResponse,
            Self::Remote(_) | Self::Http(_) | Self::Other(_) => FailureKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
