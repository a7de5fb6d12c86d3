//! Bus consumer: read, decode, enrich, persist and (optionally) forward.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_core::Submission;
use newswire_enrich::Enricher;
use newswire_store::PostStore;

use crate::error::BusError;
use crate::record::Record;
use crate::traits::LogReader;

/// Pause after a failed read before trying again.
pub const READ_BACKOFF: Duration = Duration::from_secs(1);

const TELEMETRY_TICK: Duration = Duration::from_secs(1);
const REPORT_EVERY: Duration = Duration::from_secs(10);
const WAITING_AFTER: Duration = Duration::from_secs(30);

/// How the consumer treats a post after enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    /// Persist only. A failed save drops the post.
    Archival,
    /// Persist best-effort, then forward downstream regardless.
    Streaming,
}

impl ConsumerMode {
    fn label(self) -> &'static str {
        match self {
            ConsumerMode::Archival => "archival",
            ConsumerMode::Streaming => "streaming",
        }
    }
}

/// Reads one topic as a member of a consumer group.
pub struct Consumer {
    reader: Box<dyn LogReader>,
    enricher: Arc<Enricher>,
    store: Option<Arc<dyn PostStore>>,
    group: String,
}

enum Step {
    Record(Result<Record, BusError>),
    Cancelled,
}

impl Consumer {
    pub fn new(
        reader: Box<dyn LogReader>,
        enricher: Arc<Enricher>,
        store: Option<Arc<dyn PostStore>>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            enricher,
            store,
            group: group.into(),
        }
    }

    /// Archival mode: consume, enrich and upsert until cancelled.
    pub async fn start(self, cancel: CancellationToken) -> Result<(), BusError> {
        self.run(cancel, ConsumerMode::Archival, None).await
    }

    /// Streaming mode: like [`Consumer::start`], but every post is also sent on
    /// `posts`. The channel is closed when this returns.
    pub async fn start_with_channel(
        self,
        cancel: CancellationToken,
        posts: mpsc::Sender<Submission>,
    ) -> Result<(), BusError> {
        self.run(cancel, ConsumerMode::Streaming, Some(posts)).await
    }

    async fn run(
        self,
        cancel: CancellationToken,
        mode: ConsumerMode,
        posts: Option<mpsc::Sender<Submission>>,
    ) -> Result<(), BusError> {
        info!(group = %self.group, mode = mode.label(), "consumer started");

        let mut telemetry = Telemetry::new(Instant::now());
        let mut tick = tokio::time::interval(TELEMETRY_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let record = match self.next_record(&cancel, &mut tick, &mut telemetry).await {
                Step::Cancelled => break,
                Step::Record(Ok(record)) => record,
                Step::Record(Err(e)) => {
                    warn!(group = %self.group, error = %e, "error reading from log");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(READ_BACKOFF) => continue,
                    }
                }
            };
            telemetry.on_message(Instant::now());

            let mut post = match record.decode() {
                Ok(post) => post,
                Err(e) => {
                    warn!(key = %record.key_str(), error = %e, "skipping undecodable record");
                    continue;
                }
            };
            debug!(post_id = %post.id, partition = ?record.partition, "received post");

            self.enricher.enrich(&mut post);

            if let Some(store) = &self.store {
                if let Err(e) = store.save_post(&post).await {
                    warn!(post_id = %post.id, error = %e, "failed to save post");
                    if mode == ConsumerMode::Archival {
                        continue;
                    }
                } else {
                    debug!(post_id = %post.id, "saved post");
                }
            }

            let Some(tx) = &posts else {
                info!(post_id = %post.id, subreddit = %post.subreddit, "archived post");
                continue;
            };
            let post_id = post.id.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(post_id = %post_id, "cancelled while forwarding post");
                    break;
                }
                sent = tx.send(post) => {
                    if sent.is_err() {
                        info!(group = %self.group, "downstream channel closed");
                        break;
                    }
                    debug!(post_id = %post_id, "forwarded post");
                }
            }
        }

        info!(group = %self.group, total = telemetry.total, "consumer stopping");
        drop(posts);
        self.reader.close().await
    }

    /// Wait for the next record, emitting telemetry while idle. The pending
    /// read survives telemetry ticks.
    async fn next_record(
        &self,
        cancel: &CancellationToken,
        tick: &mut tokio::time::Interval,
        telemetry: &mut Telemetry,
    ) -> Step {
        let read = self.reader.read();
        tokio::pin!(read);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Step::Cancelled,
                result = &mut read => return Step::Record(result),
                now = tick.tick() => match telemetry.on_tick(now) {
                    Report::Count(processed) => info!(
                        group = %self.group,
                        processed,
                        total = telemetry.total,
                        "consumer throughput (last 10s)"
                    ),
                    Report::Waiting => {
                        info!(group = %self.group, total = telemetry.total, "waiting for messages")
                    }
                    Report::Nothing => {}
                },
            }
        }
    }
}

// ── Telemetry ───────────────────────────────────────────────────────

/// What a telemetry tick should log, if anything.
#[derive(Debug, PartialEq, Eq)]
enum Report {
    Nothing,
    Count(u64),
    Waiting,
}

struct Telemetry {
    window: u64,
    total: u64,
    window_start: Instant,
    last_message: Instant,
    last_waiting: Option<Instant>,
}

impl Telemetry {
    fn new(now: Instant) -> Self {
        Self {
            window: 0,
            total: 0,
            window_start: now,
            last_message: now,
            last_waiting: None,
        }
    }

    fn on_message(&mut self, now: Instant) {
        self.window += 1;
        self.total += 1;
        self.last_message = now;
        self.last_waiting = None;
    }

    fn on_tick(&mut self, now: Instant) -> Report {
        let mut report = Report::Nothing;

        if now.duration_since(self.window_start) >= REPORT_EVERY {
            if self.window > 0 {
                report = Report::Count(self.window);
            }
            self.window = 0;
            self.window_start = now;
        }

        let idle = now.duration_since(self.last_message) >= WAITING_AFTER;
        let due = self
            .last_waiting
            .map_or(true, |at| now.duration_since(at) >= WAITING_AFTER);
        if idle && due {
            self.last_waiting = Some(now);
            report = Report::Waiting;
        }

        report
    }
}
