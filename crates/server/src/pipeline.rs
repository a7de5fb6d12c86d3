//! Stage wiring for the three processes.
//!
//! ```text
//! producer:  Fetcher ─▶ Producer ─▶ log
//! archiver:  log ─▶ Consumer(archival) ─▶ Enricher ─▶ Store
//! api:       log ─▶ Consumer(streaming) ─▶ Enricher ─▶ Store ─▶ Hub ─▶ /ws
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newswire_bus::producer::TOPIC_SETTLE;
use newswire_bus::{Bus, Consumer, Producer, TopicSpec};
use newswire_core::config::BusBackend;
use newswire_core::{Config, TargetBoards};
use newswire_enrich::Enricher;
use newswire_fetcher::{Fetcher, RedditClient};
use newswire_store::{PgStore, PostStore};

use crate::fanout::{FanoutConfig, Hub};
use crate::router::build_router;
use crate::state::AppState;

/// Capacity of every in-process stage channel.
pub const CHANNEL_CAPACITY: usize = 100;

/// Group suffix used by the serving process.
pub const API_GROUP_SUFFIX: &str = "api";

/// Create (or reset) the topic and start Fetcher + Producer as tasks.
pub async fn start_ingest(
    config: &Config,
    bus: &Bus,
    cancel: &CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let spec = TopicSpec::new(&config.kafka.topic, config.kafka.partitions);
    Producer::prepare_topic(
        bus.admin().as_ref(),
        &spec,
        config.kafka.reset_on_start,
        TOPIC_SETTLE,
    )
    .await
    .context("failed to prepare topic")?;

    let writer = bus
        .writer(&config.kafka.topic)
        .await
        .context("failed to open log writer")?;
    let client = RedditClient::new(&config.reddit).context("failed to build upstream client")?;
    let boards = TargetBoards::default();

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let fetcher = Fetcher::from_config(client, boards.clone(), &config.reddit);
    let producer = Producer::new(writer, config.kafka.topic.clone(), boards);

    let fetch_task = tokio::spawn(fetcher.run(cancel.clone(), tx));
    let produce_cancel = cancel.clone();
    Ok(tokio::spawn(async move {
        if let Err(e) = producer.run(produce_cancel, rx).await {
            warn!(error = %e, "producer exited with error");
        }
        let _ = fetch_task.await;
    }))
}

/// Fetcher + Producer until cancelled.
pub async fn run_producer(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let bus = Bus::connect(&config.kafka)
        .await
        .context("failed to connect to log")?;
    if config.kafka.backend == BusBackend::Memory {
        warn!("memory log backend: nothing outside this process will see these posts");
    }
    let ingest = start_ingest(&config, &bus, &cancel).await?;
    ingest.await?;
    info!("producer shut down");
    Ok(())
}

/// Archival consumer under the base group until cancelled.
pub async fn run_archiver(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = PgStore::connect(&config.postgres)
        .await
        .context("failed to connect to postgres")?;
    let bus = Bus::connect(&config.kafka)
        .await
        .context("failed to connect to log")?;

    let group = config.kafka.group_with_suffix(None);
    let reader = bus
        .reader(&config.kafka.topic, &group, config.kafka.partitions)
        .await
        .context("failed to open log reader")?;

    let consumer = Consumer::new(
        reader,
        Arc::new(Enricher::new()),
        Some(Arc::new(store.clone()) as Arc<dyn PostStore>),
        group,
    );
    if let Err(e) = consumer.start(cancel).await {
        warn!(error = %e, "consumer exited with error");
    }

    store.close().await;
    info!("archiver shut down");
    Ok(())
}

/// Serving process: streaming consumer, fan-out hub and HTTP until cancelled.
///
/// With `persist = false` the database is skipped entirely.
pub async fn run_api(config: Config, persist: bool, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = if persist {
        Some(
            PgStore::connect(&config.postgres)
                .await
                .context("failed to connect to postgres")?,
        )
    } else {
        warn!("running without persistence");
        None
    };
    let bus = Bus::connect(&config.kafka)
        .await
        .context("failed to connect to log")?;

    let ingest = if config.kafka.backend == BusBackend::Memory {
        info!("memory log backend: running fetcher and producer in-process");
        Some(start_ingest(&config, &bus, &cancel).await?)
    } else {
        None
    };

    let group = config.kafka.group_with_suffix(Some(API_GROUP_SUFFIX));
    let reader = bus
        .reader(&config.kafka.topic, &group, config.kafka.partitions)
        .await
        .context("failed to open log reader")?;

    let hub = Arc::new(Hub::new(FanoutConfig::from(&config.api)));
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let consumer = Consumer::new(
        reader,
        Arc::new(Enricher::new()),
        store.clone().map(|s| Arc::new(s) as Arc<dyn PostStore>),
        group,
    );
    let consume_cancel = cancel.clone();
    let consume_task = tokio::spawn(async move {
        if let Err(e) = consumer.start_with_channel(consume_cancel, tx).await {
            warn!(error = %e, "consumer exited with error");
        }
    });
    let broadcast_task = tokio::spawn(hub.clone().run(cancel.clone(), rx));

    let app = build_router(Arc::new(AppState::new(hub.clone())), &config.api.static_dir);
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, static_dir = %config.api.static_dir.display(), "listening");

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await
        .context("http server failed")?;

    hub.shutdown();
    let _ = consume_task.await;
    let _ = broadcast_task.await;
    if let Some(ingest) = ingest {
        let _ = ingest.await;
    }
    if let Some(store) = store {
        store.close().await;
    }
    info!("api shut down");
    Ok(())
}
