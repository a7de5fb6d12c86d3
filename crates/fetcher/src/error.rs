use thiserror::Error;

/// Errors from talking to the upstream forum. All of them are transient to
/// the polling loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("access token rejected")]
    Unauthorized,

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed listing: {0}")]
    Decode(#[from] serde_json::Error),
}
