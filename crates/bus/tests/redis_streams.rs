//! Redis Streams log against a live server.
//!
//! Needs `REDIS_URL` (default `redis://127.0.0.1:6379`, Redis 6.2+);
//! `#[ignore]`d for CI; run with `cargo test -p newswire-bus -- --ignored`.

use std::time::Duration;

use newswire_bus::streams::RedisLog;
use newswire_bus::{BusError, LogReader, LogWriter, Record, TopicAdmin, TopicSpec};

async fn connect() -> RedisLog {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisLog::connect(&[url]).await.unwrap()
}

fn unique_topic(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_{name}_{nanos}")
}

/// Next record, retrying transient errors (e.g. a vanished group).
async fn next_key(reader: &dyn LogReader) -> String {
    for _ in 0..20 {
        match tokio::time::timeout(Duration::from_secs(5), reader.read()).await {
            Ok(Ok(record)) => return record.key_str(),
            Ok(Err(BusError::Redis(_))) => tokio::time::sleep(Duration::from_millis(50)).await,
            Ok(Err(e)) => panic!("unexpected read error: {e}"),
            Err(_) => panic!("no record within 5s"),
        }
    }
    panic!("reader never recovered")
}

async fn write_keys(log: &RedisLog, topic: &str, keys: &[&str]) {
    let writer = log.writer(topic).await.unwrap();
    for key in keys {
        writer.write(Record::new(*key, format!("{{\"id\":\"{key}\"}}"))).await.unwrap();
    }
}

#[tokio::test]
#[ignore]
async fn every_group_sees_every_record() {
    let log = connect().await;
    let topic = unique_topic("groups");
    log.create_topic(&TopicSpec::new(&topic, 2)).await.unwrap();
    write_keys(&log, &topic, &["a", "b", "c"]).await;

    for group in ["archive", "archive-api"] {
        let reader = log.reader(&topic, group, 2).await.unwrap();
        let mut keys = Vec::new();
        for _ in 0..3 {
            keys.push(next_key(&reader).await);
        }
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"], "group {group}");
    }

    log.delete_topic(&topic).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn reader_recovers_after_topic_is_recreated() {
    let log = connect().await;
    let topic = unique_topic("recreate");
    log.create_topic(&TopicSpec::new(&topic, 1)).await.unwrap();
    write_keys(&log, &topic, &["before"]).await;

    let reader = log.reader(&topic, "g", 1).await.unwrap();
    assert_eq!(next_key(&reader).await, "before");

    log.delete_topic(&topic).await.unwrap();
    assert!(matches!(
        log.delete_topic(&topic).await,
        Err(BusError::UnknownTopic(_))
    ));
    log.create_topic(&TopicSpec::new(&topic, 1)).await.unwrap();
    write_keys(&log, &topic, &["after"]).await;

    assert_eq!(next_key(&reader).await, "after");
    log.delete_topic(&topic).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn restarted_reader_gets_unread_entries_back() {
    let log = connect().await;
    let topic = unique_topic("restart");
    log.create_topic(&TopicSpec::new(&topic, 1)).await.unwrap();
    write_keys(&log, &topic, &["1", "2", "3", "4", "5"]).await;

    // The first reader pulls a whole batch but hands out one record.
    let named = log.clone().with_consumer_name(Some("worker-a".into()));
    let first = named.reader(&topic, "g", 1).await.unwrap();
    assert_eq!(next_key(&first).await, "1");
    drop(first);

    // Same name after a restart: the pending entries come back.
    let second = named.reader(&topic, "g", 1).await.unwrap();
    let mut keys = Vec::new();
    for _ in 0..4 {
        keys.push(next_key(&second).await);
    }
    assert_eq!(keys, vec!["2", "3", "4", "5"]);

    log.delete_topic(&topic).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn entries_left_by_another_consumer_are_claimed() {
    let log = connect().await;
    let topic = unique_topic("claim");
    log.create_topic(&TopicSpec::new(&topic, 1)).await.unwrap();
    write_keys(&log, &topic, &["1", "2", "3"]).await;

    let dead = log
        .clone()
        .with_consumer_name(Some("worker-dead".into()))
        .reader(&topic, "g", 1)
        .await
        .unwrap();
    assert_eq!(next_key(&dead).await, "1");
    drop(dead);

    let successor = log
        .clone()
        .with_consumer_name(Some("worker-new".into()))
        .with_claim_idle(Duration::ZERO)
        .reader(&topic, "g", 1)
        .await
        .unwrap();
    let mut keys = Vec::new();
    for _ in 0..2 {
        keys.push(next_key(&successor).await);
    }
    assert_eq!(keys, vec!["2", "3"]);

    log.delete_topic(&topic).await.unwrap();
}
