//! In-process partitioned log.
//!
//! Mirrors the semantics the pipeline relies on from a real broker: ordered
//! partitions, per-group committed offsets, and topics that can be deleted and
//! recreated underneath running readers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::balancer::LeastBytes;
use crate::error::BusError;
use crate::record::Record;
use crate::traits::{LogReader, LogWriter, TopicAdmin, TopicSpec};

#[derive(Default)]
struct TopicLog {
    partitions: Vec<Vec<Record>>,
    /// Next offset to hand out, per group and partition.
    groups: HashMap<String, Vec<usize>>,
}

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<String, TopicLog>>,
    appended: Notify,
}

/// Shared handle to an in-memory log. Cloning shares the same topics.
#[derive(Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writer(&self, topic: &str) -> MemoryWriter {
        MemoryWriter {
            log: self.clone(),
            topic: topic.to_string(),
            balancer: Mutex::new(LeastBytes::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn reader(&self, topic: &str, group: &str) -> MemoryReader {
        MemoryReader {
            log: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Total records currently held for a topic, across partitions.
    pub fn len(&self, topic: &str) -> usize {
        self.topics()
            .get(topic)
            .map(|t| t.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics().contains_key(topic)
    }

    /// Take the next record for `group`, scanning partitions round-robin from `start`.
    fn take_next(&self, topic: &str, group: &str, start: usize) -> Result<Option<Record>, BusError> {
        let mut topics = self.topics();
        let log = topics
            .get_mut(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;

        let count = log.partitions.len();
        let offsets = log
            .groups
            .entry(group.to_string())
            .or_insert_with(|| vec![0; count]);

        for i in 0..count {
            let p = (start + i) % count;
            if let Some(record) = log.partitions[p].get(offsets[p]) {
                offsets[p] += 1;
                let mut record = record.clone();
                record.partition = Some(p as u32);
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TopicAdmin for MemoryLog {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError> {
        if spec.partitions == 0 {
            return Err(BusError::Config("a topic needs at least one partition".into()));
        }
        let mut topics = self.topics();
        if topics.contains_key(&spec.name) {
            return Err(BusError::TopicExists(spec.name.clone()));
        }
        topics.insert(
            spec.name.clone(),
            TopicLog {
                partitions: vec![Vec::new(); spec.partitions as usize],
                groups: HashMap::new(),
            },
        );
        debug!(topic = %spec.name, partitions = spec.partitions, "created topic");
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BusError> {
        match self.topics().remove(name) {
            Some(_) => {
                debug!(topic = %name, "deleted topic");
                Ok(())
            }
            None => Err(BusError::UnknownTopic(name.to_string())),
        }
    }
}

/// Writer half of a [`MemoryLog`] topic.
pub struct MemoryWriter {
    log: MemoryLog,
    topic: String,
    balancer: Mutex<LeastBytes>,
    closed: AtomicBool,
}

#[async_trait]
impl LogWriter for MemoryWriter {
    async fn write(&self, mut record: Record) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        {
            let mut topics = self.log.topics();
            let log = topics
                .get_mut(&self.topic)
                .ok_or_else(|| BusError::UnknownTopic(self.topic.clone()))?;
            let p = self
                .balancer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pick(log.partitions.len(), record.size());
            record.partition = Some(p as u32);
            log.partitions[p].push(record);
        }
        self.log.inner.appended.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Reader half of a [`MemoryLog`] topic for one consumer group.
pub struct MemoryReader {
    log: MemoryLog,
    topic: String,
    group: String,
    cursor: AtomicUsize,
}

#[async_trait]
impl LogReader for MemoryReader {
    async fn read(&self) -> Result<Record, BusError> {
        loop {
            // Register interest before checking, so an append between the
            // check and the await still wakes us.
            let appended = self.log.inner.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let start = self.cursor.fetch_add(1, Ordering::Relaxed);
            if let Some(record) = self.log.take_next(&self.topic, &self.group, start)? {
                return Ok(record);
            }
            appended.await;
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}
