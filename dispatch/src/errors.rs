use http::StatusCode;
use thiserror::Error;

/// Errors that stop the dispatch service itself, or reject a request before
/// any decision is made.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("collaborator setup failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("campaign not found")]
    NotFound,
}

impl DispatchError {
    /// Status reported to callers of the request boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// Failure talking to an external collaborator. Callers treat it as a
/// lookup failure and fail open.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CollaboratorError {
    pub const fn kind(&self) -> &'static str {
        match self {
            CollaboratorError::Timeout(_) => "timeout",
            CollaboratorError::Transport(_) => "transport",
            CollaboratorError::Status(_) => "status",
            CollaboratorError::Decode(_) => "decode",
            CollaboratorError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Malformed request input, surfaced to the request boundary without retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("campaign hash must be {expected} characters, got {actual}")]
    HashLength { expected: usize, actual: usize },

    #[error("missing MSISDN")]
    MissingMsisdn,
}
