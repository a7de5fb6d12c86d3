use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("sentiment model is malformed: {0}")]
    Model(#[from] serde_json::Error),

    #[error("sentiment model is empty: {0}")]
    EmptyModel(&'static str),
}
