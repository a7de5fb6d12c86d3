//! Fetch to socket over the in-memory log and a real listener.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use newswire_bus::{Consumer, MemoryLog, Producer, TopicAdmin, TopicSpec};
use newswire_core::{Submission, TargetBoards};
use newswire_enrich::Enricher;
use newswire_fetcher::{FetchError, Fetcher, PostSource};
use newswire_server::{build_router, AppState, FanoutConfig, Hub};
use newswire_store::{MemoryStore, PostStore};

const TOPIC: &str = "reddit-posts";

struct Pages(Mutex<VecDeque<Vec<Submission>>>);

#[async_trait]
impl PostSource for Pages {
    async fn fetch_new(&self, _boards: &TargetBoards) -> Result<Vec<Submission>, FetchError> {
        Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn post(id: &str, title: &str, board: &str) -> Submission {
    Submission::new(id, title, "", board, 42, format!("https://example.com/{id}"), 1.7e9)
}

async fn next_post<S>(ws: &mut S) -> Submission
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("frame within timeout")
            .expect("socket open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return Submission::from_json(text.as_bytes()).unwrap();
        }
    }
}

#[tokio::test]
async fn fetched_post_reaches_socket_enriched() {
    let cancel = CancellationToken::new();
    let log = MemoryLog::new();
    log.create_topic(&TopicSpec::new(TOPIC, 3)).await.unwrap();

    // Fetcher → Producer → log
    let source = Pages(Mutex::new(VecDeque::from([vec![
        post("t1", "Treaty signed", "worldnews"),
        post("c1", "Sourdough starter tips", "cooking"),
    ]])));
    let fetcher = Fetcher::new(source, TargetBoards::default())
        .with_intervals(Duration::from_millis(10), Duration::from_millis(10));
    let producer = Producer::new(Arc::new(log.writer(TOPIC)), TOPIC, TargetBoards::default());
    let (fetch_tx, fetch_rx) = mpsc::channel(100);
    let fetch_task = tokio::spawn(fetcher.run(cancel.clone(), fetch_tx));
    let produce_task = tokio::spawn(producer.run(cancel.clone(), fetch_rx));

    // log → Consumer → Hub
    let store = Arc::new(MemoryStore::new());
    let consumer = Consumer::new(
        Box::new(log.reader(TOPIC, "reddit-consumer-api")),
        Arc::new(Enricher::new()),
        Some(store.clone() as Arc<dyn PostStore>),
        "reddit-consumer-api",
    );
    let hub = Arc::new(Hub::new(FanoutConfig::default()));
    let (post_tx, post_rx) = mpsc::channel(100);
    let consume_task = tokio::spawn(consumer.start_with_channel(cancel.clone(), post_tx));
    let hub_task = tokio::spawn(hub.clone().run(cancel.clone(), post_rx));

    // Hub → /ws
    let static_dir = tempfile::tempdir().unwrap();
    let app = build_router(Arc::new(AppState::new(hub.clone())), static_dir.path());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
            .await
            .unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let got = next_post(&mut ws).await;
    assert_eq!(got.id, "t1");
    assert_eq!(got.subreddit, "worldnews");
    assert_eq!(got.topics, vec!["Treaty", "Signed"]);
    assert_eq!(got.sentiment.abs(), 1.0);

    let stored = store.get("t1").expect("post persisted");
    assert_eq!(stored.sentiment, got.sentiment);
    assert!(store.get("c1").is_none());

    drop(ws);
    cancel.cancel();
    fetch_task.await.unwrap();
    produce_task.await.unwrap().unwrap();
    consume_task.await.unwrap().unwrap();
    hub_task.await.unwrap();
    server.await.unwrap();
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn late_socket_gets_replay_then_live() {
    let hub = Arc::new(Hub::new(FanoutConfig::default()));
    for i in 0..3 {
        let mut p = post(&format!("old{i}"), "Election results", "politics");
        p.topics = vec!["Election".into(), "Results".into()];
        hub.broadcast(&p);
    }

    let static_dir = tempfile::tempdir().unwrap();
    let app = build_router(Arc::new(AppState::new(hub.clone())), static_dir.path());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
            .await
            .unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    for i in 0..3 {
        assert_eq!(next_post(&mut ws).await.id, format!("old{i}"));
    }

    hub.broadcast(&post("fresh", "Summit opens", "geopolitics"));
    assert_eq!(next_post(&mut ws).await.id, "fresh");

    drop(ws);
    hub.shutdown();
    cancel.cancel();
    server.await.unwrap();
}
