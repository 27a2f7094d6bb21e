use thiserror::Error;

/// Per-item extraction failure. Stored as the article's `extract_error`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("transport error: {0}")]
    Transport(String),
    /// The request could not be built, e.g. a relative or malformed url.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("too short html ({0} bytes)")]
    TooShortHtml(usize),
    #[error("no content extracted")]
    NoContent,
    #[error("text too short ({0} chars)")]
    TooShortText(usize),
}

impl ExtractError {
    /// Worth another attempt: network trouble, rate limiting or a server error.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::Transport(_) | ExtractError::Timeout => true,
            ExtractError::Status(code) => *code == 429 || (500..600).contains(code),
            ExtractError::InvalidRequest(_)
            | ExtractError::TooShortHtml(_)
            | ExtractError::NoContent
            | ExtractError::TooShortText(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ExtractError::InvalidRequest(e.to_string())
        } else if e.is_timeout() {
            ExtractError::Timeout
        } else if let Some(status) = e.status() {
            ExtractError::Status(status.as_u16())
        } else {
            ExtractError::Transport(e.to_string())
        }
    }
}
