//! Durable append-log plumbing between the fetcher and the consumers.
//!
//! The log itself sits behind [`LogWriter`], [`LogReader`] and [`TopicAdmin`];
//! [`Producer`] and [`Consumer`] are the pipeline stages built on top of them.

pub mod balancer;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod record;
pub mod streams;
pub mod traits;

use std::sync::Arc;

use newswire_core::config::{BusBackend, BusConfig};

pub use balancer::LeastBytes;
pub use consumer::{Consumer, ConsumerMode};
pub use error::BusError;
pub use memory::MemoryLog;
pub use producer::Producer;
pub use record::Record;
pub use traits::{LogReader, LogWriter, TopicAdmin, TopicSpec};

/// A connected log backend, handing out writers, readers and admin access.
#[derive(Clone)]
pub enum Bus {
    Redis(streams::RedisLog),
    Memory(MemoryLog),
}

impl Bus {
    /// Connect to the backend named in config. Dial failures are fatal to the caller.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        match config.backend {
            BusBackend::Redis => Ok(Self::Redis(
                streams::RedisLog::connect(&config.brokers)
                    .await?
                    .with_consumer_name(config.consumer_name.clone()),
            )),
            BusBackend::Memory => Ok(Self::Memory(MemoryLog::new())),
        }
    }

    pub fn admin(&self) -> Arc<dyn TopicAdmin> {
        match self {
            Self::Redis(log) => Arc::new(log.clone()),
            Self::Memory(log) => Arc::new(log.clone()),
        }
    }

    pub async fn writer(&self, topic: &str) -> Result<Arc<dyn LogWriter>, BusError> {
        match self {
            Self::Redis(log) => Ok(Arc::new(log.writer(topic).await?)),
            Self::Memory(log) => Ok(Arc::new(log.writer(topic))),
        }
    }

    pub async fn reader(
        &self,
        topic: &str,
        group: &str,
        partitions: u32,
    ) -> Result<Box<dyn LogReader>, BusError> {
        match self {
            Self::Redis(log) => Ok(Box::new(log.reader(topic, group, partitions).await?)),
            Self::Memory(log) => Ok(Box::new(log.reader(topic, group))),
        }
    }
}
