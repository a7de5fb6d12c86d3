//! Redis Streams backend.
//!
//! A topic with `n` partitions is stored as `n` stream keys
//! (`<topic>:0` .. `<topic>:n-1`) plus a metadata hash `<topic>:meta`.
//! Consumer groups map directly onto stream consumer groups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::balancer::LeastBytes;
use crate::error::BusError;
use crate::record::Record;
use crate::traits::{LogReader, LogWriter, TopicAdmin, TopicSpec};

/// Entries fetched per `XREADGROUP` round trip.
const READ_BATCH: usize = 32;

/// How long a single `XREADGROUP` blocks server-side, in milliseconds.
const READ_BLOCK_MS: usize = 250;

/// Pending entries idle at least this long are taken over from other members
/// of the group when a reader starts.
pub const CLAIM_MIN_IDLE: Duration = Duration::from_secs(10);

const CLAIM_BATCH: usize = 100;

fn stream_key(topic: &str, partition: u32) -> String {
    format!("{topic}:{partition}")
}

fn meta_key(topic: &str) -> String {
    format!("{topic}:meta")
}

/// Turn a `host:port` broker entry into a redis URL.
fn broker_url(broker: &str) -> String {
    if broker.starts_with("redis://") || broker.starts_with("rediss://") {
        broker.to_string()
    } else {
        format!("redis://{broker}")
    }
}

/// Consumer name inside a group. It must survive restarts: `XREADGROUP 0`
/// only re-delivers entries pending under the caller's own name.
pub fn consumer_name(configured: Option<&str>, group: &str) -> String {
    match configured.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let host = std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .ok()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "local".to_string());
            format!("{group}-{host}")
        }
    }
}

/// Connection to the Redis server backing the log.
#[derive(Clone)]
pub struct RedisLog {
    client: redis::Client,
    conn: ConnectionManager,
    consumer_name: Option<String>,
    claim_idle: Duration,
}

impl RedisLog {
    /// Dial the first broker and verify it answers `PING`.
    pub async fn connect(brokers: &[String]) -> Result<Self, BusError> {
        let broker = brokers
            .first()
            .ok_or_else(|| BusError::Config("no brokers configured".into()))?;
        let url = broker_url(broker);
        info!(url = %url, "connecting to redis log");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            client,
            conn,
            consumer_name: None,
            claim_idle: CLAIM_MIN_IDLE,
        })
    }

    /// Fixed consumer name for every reader this log opens. Defaults to
    /// `<group>-<hostname>`.
    pub fn with_consumer_name(mut self, name: Option<String>) -> Self {
        self.consumer_name = name;
        self
    }

    pub fn with_claim_idle(mut self, idle: Duration) -> Self {
        self.claim_idle = idle;
        self
    }

    /// Partition count recorded when the topic was created.
    pub async fn partitions(&self, topic: &str) -> Result<Option<u32>, BusError> {
        let mut conn = self.conn.clone();
        let n: Option<u32> = conn.hget(meta_key(topic), "partitions").await?;
        Ok(n)
    }

    pub async fn writer(&self, topic: &str) -> Result<RedisWriter, BusError> {
        let partitions = self
            .partitions(topic)
            .await?
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;
        Ok(RedisWriter {
            conn: self.conn.clone(),
            topic: topic.to_string(),
            partitions,
            balancer: Mutex::new(LeastBytes::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a reader for `group`. `fallback_partitions` is used when the topic
    /// metadata does not exist yet (the producer may not have started).
    pub async fn reader(
        &self,
        topic: &str,
        group: &str,
        fallback_partitions: u32,
    ) -> Result<RedisReader, BusError> {
        let partitions = self.partitions(topic).await?.unwrap_or(fallback_partitions);
        let keys = (0..partitions.max(1)).map(|p| stream_key(topic, p)).collect();

        // Blocking reads get their own connection so they never stall writers.
        let conn = ConnectionManager::new(self.client.clone()).await?;

        Ok(RedisReader {
            state: AsyncMutex::new(ReaderState {
                conn,
                buffered: VecDeque::new(),
                groups_ready: false,
                drain_pending: true,
            }),
            keys,
            group: group.to_string(),
            consumer: consumer_name(self.consumer_name.as_deref(), group),
            claim_idle: self.claim_idle,
        })
    }
}

#[async_trait]
impl TopicAdmin for RedisLog {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError> {
        if spec.partitions == 0 {
            return Err(BusError::Config("a topic needs at least one partition".into()));
        }
        let mut conn = self.conn.clone();
        let created: bool = conn
            .hset_nx(meta_key(&spec.name), "partitions", spec.partitions)
            .await?;
        if !created {
            return Err(BusError::TopicExists(spec.name.clone()));
        }
        debug!(topic = %spec.name, partitions = spec.partitions, "created topic");
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), BusError> {
        let partitions = self
            .partitions(name)
            .await?
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))?;

        let mut keys: Vec<String> = (0..partitions).map(|p| stream_key(name, p)).collect();
        keys.push(meta_key(name));

        let mut conn = self.conn.clone();
        let _: i64 = conn.del(keys).await?;
        debug!(topic = %name, "deleted topic");
        Ok(())
    }
}

/// Appends records to a topic's partition streams.
pub struct RedisWriter {
    conn: ConnectionManager,
    topic: String,
    partitions: u32,
    balancer: Mutex<LeastBytes>,
    closed: AtomicBool,
}

#[async_trait]
impl LogWriter for RedisWriter {
    async fn write(&self, record: Record) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let partition = self
            .balancer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pick(self.partitions as usize, record.size()) as u32;

        let mut conn = self.conn.clone();
        let _: String = redis::cmd("XADD")
            .arg(stream_key(&self.topic, partition))
            .arg("*")
            .arg("key")
            .arg(&record.key)
            .arg("value")
            .arg(&record.value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct Buffered {
    stream: String,
    id: String,
    record: Record,
}

struct ReaderState {
    conn: ConnectionManager,
    buffered: VecDeque<Buffered>,
    groups_ready: bool,
    /// Re-deliver entries this consumer read but never acknowledged (e.g. the
    /// process stopped mid-batch) before asking for new ones.
    drain_pending: bool,
}

/// Reads a topic's partition streams as one member of a consumer group.
pub struct RedisReader {
    state: AsyncMutex<ReaderState>,
    keys: Vec<String>,
    group: String,
    consumer: String,
    claim_idle: Duration,
}

impl RedisReader {
    async fn ensure_groups(&self, state: &mut ReaderState) -> Result<(), BusError> {
        if state.groups_ready {
            return Ok(());
        }
        for key in &self.keys {
            let created: Result<String, redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(key)
                .arg(&self.group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut state.conn)
                .await;
            match created {
                Ok(_) => debug!(stream = %key, group = %self.group, "created consumer group"),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.claim_abandoned(state).await?;
        state.groups_ready = true;
        state.drain_pending = true;
        Ok(())
    }

    /// Move entries left pending by other (usually dead) consumers of the
    /// group to this one, so the pending drain re-delivers them.
    async fn claim_abandoned(&self, state: &mut ReaderState) -> Result<(), BusError> {
        let min_idle = u64::try_from(self.claim_idle.as_millis()).unwrap_or(u64::MAX);
        for key in &self.keys {
            let mut cursor = "0-0".to_string();
            let mut claimed = 0usize;
            loop {
                let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
                    .arg(key)
                    .arg(&self.group)
                    .arg(&self.consumer)
                    .arg(min_idle)
                    .arg(&cursor)
                    .arg("COUNT")
                    .arg(CLAIM_BATCH)
                    .query_async(&mut state.conn)
                    .await?;
                claimed += reply.claimed.len();
                if reply.next_stream_id == "0-0" || reply.next_stream_id == cursor {
                    break;
                }
                cursor = reply.next_stream_id;
            }
            if claimed > 0 {
                info!(stream = %key, group = %self.group, consumer = %self.consumer, claimed, "claimed abandoned pending entries");
            }
        }
        Ok(())
    }

    async fn fetch(&self, state: &mut ReaderState) -> Result<(), BusError> {
        let start_id = if state.drain_pending { "0" } else { ">" };
        let reply: Result<Option<StreamReadReply>, redis::RedisError> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(READ_BATCH)
            .arg("BLOCK")
            .arg(READ_BLOCK_MS)
            .arg("STREAMS")
            .arg(&self.keys)
            .arg(vec![start_id; self.keys.len()])
            .query_async(&mut state.conn)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) if e.code() == Some("NOGROUP") => {
                // The topic was deleted and recreated under us.
                warn!(group = %self.group, "consumer group vanished, recreating");
                state.groups_ready = false;
                state.drain_pending = true;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut fetched = 0usize;
        for stream in reply.map(|r| r.keys).unwrap_or_default() {
            let partition = self.keys.iter().position(|k| *k == stream.key).map(|p| p as u32);
            for entry in stream.ids {
                let key: Vec<u8> = entry.get("key").unwrap_or_default();
                let value: Vec<u8> = entry.get("value").unwrap_or_default();
                let mut record = Record::new(key, value);
                record.partition = partition;
                state.buffered.push_back(Buffered {
                    stream: stream.key.clone(),
                    id: entry.id.clone(),
                    record,
                });
                fetched += 1;
            }
        }

        if state.drain_pending && fetched == 0 {
            state.drain_pending = false;
        }
        Ok(())
    }
}

#[async_trait]
impl LogReader for RedisReader {
    async fn read(&self) -> Result<Record, BusError> {
        let mut state = self.state.lock().await;
        loop {
            // Ack before handing out; a failed ack leaves the entry buffered.
            if let Some(next) = state.buffered.front() {
                let (stream, id) = (next.stream.clone(), next.id.clone());
                let _: i64 = state.conn.xack(&stream, &self.group, &[&id]).await?;
                if let Some(next) = state.buffered.pop_front() {
                    return Ok(next.record);
                }
            }
            self.ensure_groups(&mut state).await?;
            self.fetch(&mut state).await?;
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_entries_become_urls() {
        assert_eq!(broker_url("localhost:6379"), "redis://localhost:6379");
        assert_eq!(broker_url("redis://cache:6380/1"), "redis://cache:6380/1");
    }

    #[test]
    fn configured_consumer_name_wins() {
        assert_eq!(consumer_name(Some("archiver-1"), "reddit-consumer"), "archiver-1");
    }

    #[test]
    fn default_consumer_name_is_stable_per_group() {
        let a = consumer_name(None, "reddit-consumer-api");
        let b = consumer_name(Some("  "), "reddit-consumer-api");
        assert_eq!(a, b);
        assert!(a.starts_with("reddit-consumer-api-"));
    }

    #[test]
    fn keys_are_namespaced_by_topic() {
        assert_eq!(stream_key("reddit-posts", 0), "reddit-posts:0");
        assert_eq!(meta_key("reddit-posts"), "reddit-posts:meta");
    }
}
