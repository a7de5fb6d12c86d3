use thiserror::Error;

/// Errors that can occur in the bus layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("writer closed")]
    Closed,
}
