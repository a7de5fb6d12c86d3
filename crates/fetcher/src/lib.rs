//! Polls the upstream forum for new submissions on the target boards.
//!
//! [`Fetcher::run`] turns repeated [`PostSource::fetch_new`] calls into a
//! stream of unseen, on-board submissions on a bounded channel.

pub mod client;
pub mod error;
pub mod seen;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_core::config::RedditConfig;
use newswire_core::{Submission, TargetBoards};

pub use client::RedditClient;
pub use error::FetchError;
pub use seen::SeenSet;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// One page of the newest submissions across a set of boards.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_new(&self, boards: &TargetBoards) -> Result<Vec<Submission>, FetchError>;
}

pub struct Fetcher<S> {
    source: S,
    boards: TargetBoards,
    seen: SeenSet,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl<S: PostSource> Fetcher<S> {
    pub fn new(source: S, boards: TargetBoards) -> Self {
        Self {
            source,
            boards,
            seen: SeenSet::new(),
            poll_interval: POLL_INTERVAL,
            error_backoff: ERROR_BACKOFF,
        }
    }

    /// Take the polling cadence from config.
    pub fn from_config(source: S, boards: TargetBoards, config: &RedditConfig) -> Self {
        Self::new(source, boards).with_intervals(
            Duration::from_secs(config.poll_interval_secs),
            Duration::from_secs(config.error_backoff_secs),
        )
    }

    pub fn with_intervals(mut self, poll_interval: Duration, error_backoff: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.error_backoff = error_backoff;
        self
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Fetch one page and keep the submissions that are on a target board and
    /// not yet seen. Nothing is marked seen here, so a batch that was never
    /// delivered comes back on the next poll.
    pub async fn poll_once(&self) -> Result<Vec<Submission>, FetchError> {
        let page = self.source.fetch_new(&self.boards).await?;
        let mut fresh = Vec::with_capacity(page.len());
        for post in page {
            if !self.boards.contains(&post.subreddit) {
                debug!(subreddit = %post.subreddit, post_id = %post.id, "skipping post from non-target board");
                continue;
            }
            if self.seen.contains(&post.id) || fresh.iter().any(|p: &Submission| p.id == post.id) {
                continue;
            }
            fresh.push(post);
        }
        Ok(fresh)
    }

    /// Poll until cancelled, sending each new submission on `posts`. The
    /// channel is closed when this returns.
    pub async fn run(mut self, cancel: CancellationToken, posts: mpsc::Sender<Submission>) {
        info!(boards = %self.boards.query(), "starting to poll boards");

        'poll: loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = self.poll_once() => batch,
            };

            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, backoff_secs = self.error_backoff.as_secs(), "error fetching posts");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => continue,
                    }
                }
            };

            for post in batch {
                let id = post.id.clone();
                let subreddit = post.subreddit.clone();
                tokio::select! {
                    _ = cancel.cancelled() => break 'poll,
                    sent = posts.send(post) => {
                        if sent.is_err() {
                            info!("post channel closed, stopping fetcher");
                            break 'poll;
                        }
                        info!(post_id = %id, subreddit = %subreddit, "sent new post");
                        self.seen.insert(id);
                    }
                }
            }

            let pruned = self.seen.prune();
            if pruned > 0 {
                debug!(pruned, remaining = self.seen.len(), "pruned seen set");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("fetcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays scripted pages, then empty pages forever.
    #[derive(Clone, Default)]
    struct Scripted {
        pages: Arc<Mutex<VecDeque<Result<Vec<Submission>, FetchError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn push(&self, page: Result<Vec<Submission>, FetchError>) {
            self.pages.lock().unwrap().push_back(page);
        }
    }

    #[async_trait]
    impl PostSource for Scripted {
        async fn fetch_new(&self, _boards: &TargetBoards) -> Result<Vec<Submission>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn post(id: &str, board: &str) -> Submission {
        Submission::new(id, "Treaty signed", "", board, 10, "https://e.com", 1.7e9)
    }

    async fn collect(rx: &mut mpsc::Receiver<Submission>, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(rx.recv().await.unwrap().id);
        }
        ids
    }

    #[tokio::test(start_paused = true)]
    async fn drops_off_board_posts() {
        let source = Scripted::default();
        source.push(Ok(vec![post("x", "aww"), post("y", "WorldNews")]));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Fetcher::new(source, TargetBoards::default()).run(cancel.clone(), tx));

        assert_eq!(collect(&mut rx, 1).await, vec!["y"]);
        cancel.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_across_polls_are_emitted_once() {
        let source = Scripted::default();
        source.push(Ok(vec![post("dup", "news")]));
        source.push(Ok(vec![post("dup", "news"), post("next", "politics")]));

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Fetcher::new(source, TargetBoards::default()).run(cancel.clone(), tx));

        assert_eq!(collect(&mut rx, 2).await, vec!["dup", "next"]);
        cancel.cancel();
        task.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn duplicates_within_a_page_collapse() {
        let source = Scripted::default();
        source.push(Ok(vec![post("a", "news"), post("a", "news")]));
        let fetcher = Fetcher::new(source, TargetBoards::default());
        let batch = fetcher.poll_once().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(fetcher.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off_before_retrying() {
        let source = Scripted::default();
        source.push(Err(FetchError::Unauthorized));
        source.push(Ok(vec![post("after", "news")]));
        let calls = source.calls.clone();

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let task = tokio::spawn(Fetcher::new(source, TargetBoards::default()).run(cancel.clone(), tx));

        assert_eq!(collect(&mut rx, 1).await, vec!["after"]);
        assert!(started.elapsed() >= ERROR_BACKOFF);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval() {
        let source = Scripted::default();
        let calls = source.calls.clone();
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Fetcher::new(source, TargetBoards::default()).run(cancel.clone(), tx));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        // t = 0, 2s, 4s
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_send_yields_to_cancellation() {
        let source = Scripted::default();
        source.push(Ok(vec![post("a", "news"), post("b", "news")]));
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Fetcher::new(source, TargetBoards::default()).run(cancel.clone(), tx));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert!(rx.recv().await.is_none());
    }
}
