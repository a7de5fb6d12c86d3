use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::record::Record;

/// Topic layout requested at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: u32,
    pub replication_factor: u16,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor: 1,
        }
    }
}

/// Appends keyed records to a topic.
#[async_trait]
pub trait LogWriter: Send + Sync {
    /// Append one record. The partition is chosen by the writer's balancer.
    async fn write(&self, record: Record) -> Result<(), BusError>;

    /// Flush and release the writer. Later writes fail with [`BusError::Closed`].
    async fn close(&self) -> Result<(), BusError>;
}

/// Blanket implementation so `Arc<dyn LogWriter>` can be used directly.
#[async_trait]
impl<T: LogWriter + ?Sized> LogWriter for Arc<T> {
    async fn write(&self, record: Record) -> Result<(), BusError> {
        (**self).write(record).await
    }

    async fn close(&self) -> Result<(), BusError> {
        (**self).close().await
    }
}

/// Reads records for one consumer group.
///
/// Distinct groups each see every record; members of one group split the
/// partitions between them. A record counts as committed once `read` returns it.
#[async_trait]
pub trait LogReader: Send + Sync {
    /// Wait for the next record.
    async fn read(&self) -> Result<Record, BusError>;

    async fn close(&self) -> Result<(), BusError>;
}

/// Topic lifecycle management.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Fails with [`BusError::TopicExists`] if the topic is already there.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError>;

    /// Fails with [`BusError::UnknownTopic`] if there is nothing to delete.
    async fn delete_topic(&self, name: &str) -> Result<(), BusError>;
}
