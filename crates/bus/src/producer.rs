use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_core::{Submission, TargetBoards};

use crate::error::BusError;
use crate::record::Record;
use crate::traits::{LogWriter, TopicAdmin, TopicSpec};

/// Pause between deleting and recreating a topic so the broker settles.
pub const TOPIC_SETTLE: Duration = Duration::from_secs(2);

/// Publishes fetched submissions to the log, keyed by id.
pub struct Producer {
    writer: Arc<dyn LogWriter>,
    topic: String,
    boards: TargetBoards,
}

impl Producer {
    pub fn new(writer: Arc<dyn LogWriter>, topic: impl Into<String>, boards: TargetBoards) -> Self {
        Self {
            writer,
            topic: topic.into(),
            boards,
        }
    }

    /// Make sure the topic exists before the first write.
    ///
    /// With `reset` the topic is deleted first (a missing topic is fine), then
    /// recreated after `settle`. Consumers must tolerate this.
    pub async fn prepare_topic(
        admin: &dyn TopicAdmin,
        spec: &TopicSpec,
        reset: bool,
        settle: Duration,
    ) -> Result<(), BusError> {
        if reset {
            info!(topic = %spec.name, "deleting topic before fresh start");
            match admin.delete_topic(&spec.name).await {
                Ok(()) => info!(topic = %spec.name, "deleted topic"),
                Err(BusError::UnknownTopic(_)) => debug!(topic = %spec.name, "topic did not exist"),
                Err(e) => warn!(topic = %spec.name, error = %e, "failed to delete topic"),
            }
            tokio::time::sleep(settle).await;
        }

        match admin.create_topic(spec).await {
            Ok(()) => {
                info!(
                    topic = %spec.name,
                    partitions = spec.partitions,
                    replication_factor = spec.replication_factor,
                    "created topic"
                );
                Ok(())
            }
            Err(BusError::TopicExists(_)) => {
                info!(topic = %spec.name, "topic already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drain `posts` into the log until cancelled or the channel closes.
    /// Publish failures are logged and the post is dropped.
    pub async fn run(
        self,
        cancel: CancellationToken,
        mut posts: mpsc::Receiver<Submission>,
    ) -> Result<(), BusError> {
        info!(
            topic = %self.topic,
            boards = %self.boards.query(),
            "producer started"
        );

        loop {
            let post = tokio::select! {
                _ = cancel.cancelled() => break,
                post = posts.recv() => match post {
                    Some(post) => post,
                    None => {
                        info!("fetcher channel closed");
                        break;
                    }
                },
            };

            if !self.boards.contains(&post.subreddit) {
                info!(subreddit = %post.subreddit, post_id = %post.id, "skipping post from non-target board");
                continue;
            }

            if let Err(e) = self.send_post(&post).await {
                warn!(post_id = %post.id, error = %e, "failed to publish post");
            }
        }

        info!("producer stopping, closing writer");
        self.writer.close().await
    }

    /// Encode and publish a single post.
    pub async fn send_post(&self, post: &Submission) -> Result<(), BusError> {
        debug!(post_id = %post.id, subreddit = %post.subreddit, title = %post.title, "publishing post");
        let record = Record::from_submission(post)?;
        self.writer.write(record).await?;
        debug!(post_id = %post.id, "published post");
        Ok(())
    }
}
