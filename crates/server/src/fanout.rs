//! Multicast of enriched submissions to connected socket clients.
//!
//! # Model
//!
//! ```text
//!  consumer ──mpsc──▶ Hub::run ──broadcast──▶ per-client queue ──▶ writer task ──▶ socket
//!                        │
//!                        └──▶ replay buffer (last N frames, snapshot on register)
//! ```
//!
//! The registry lock is held only to register, evict and enqueue. Socket
//! writes happen in each client's own writer task, so one slow client cannot
//! hold up the rest: when its queue fills it is evicted.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes};
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_core::config::ApiConfig;
use newswire_core::Submission;

/// One serialised submission, shared by every client it is sent to.
pub type Frame = Utf8Bytes;

pub type ClientId = u64;

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    pub replay_capacity: usize,
    pub replay_pacing: Duration,
    pub write_timeout: Duration,
    pub client_buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for FanoutConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            replay_capacity: api.replay_capacity.max(1),
            replay_pacing: Duration::from_millis(api.replay_pacing_ms),
            write_timeout: Duration::from_secs(api.write_timeout_secs.max(1)),
            client_buffer: api.client_buffer.max(1),
        }
    }
}

struct Client {
    queue: mpsc::Sender<Frame>,
    kill: CancellationToken,
}

#[derive(Default)]
struct Registry {
    clients: HashMap<ClientId, Client>,
    replay: VecDeque<Frame>,
}

/// Everything a freshly registered client needs to start writing.
pub struct Subscription {
    pub id: ClientId,
    /// Replay frames, oldest first, captured atomically with registration.
    pub replay: Vec<Frame>,
    pub live: mpsc::Receiver<Frame>,
    /// Cancelled when the client is evicted.
    pub kill: CancellationToken,
}

/// Outcome of a single [`Hub::broadcast`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queued: usize,
    pub evicted: Vec<ClientId>,
}

/// Client registry plus replay buffer behind one lock.
pub struct Hub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    config: FanoutConfig,
}

impl Hub {
    pub fn new(config: FanoutConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a client. The replay snapshot and the insertion happen under the
    /// same lock, so the client sees every frame exactly once: buffered ones
    /// through `replay`, later ones through `live`.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, live) = mpsc::channel(self.config.client_buffer);
        let kill = CancellationToken::new();

        let mut registry = self.registry();
        let replay = registry.replay.iter().cloned().collect();
        registry.clients.insert(
            id,
            Client {
                queue,
                kill: kill.clone(),
            },
        );
        let clients = registry.clients.len();
        drop(registry);

        info!(client_id = id, clients, "client registered");
        Subscription {
            id,
            replay,
            live,
            kill,
        }
    }

    /// Remove a client and signal its writer to close. Returns `false` if it
    /// was already gone, so the close happens once.
    pub fn evict(&self, id: ClientId) -> bool {
        let mut registry = self.registry();
        let Some(client) = registry.clients.remove(&id) else {
            return false;
        };
        let remaining = registry.clients.len();
        drop(registry);

        client.kill.cancel();
        info!(client_id = id, remaining, "client evicted");
        true
    }

    /// Append to the replay buffer and queue the frame for every client.
    /// Clients whose queue is full or closed are evicted.
    pub fn broadcast(&self, post: &Submission) -> Delivery {
        let frame: Frame = match serde_json::to_string(post) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "failed to serialise post");
                return Delivery::default();
            }
        };

        let mut delivery = Delivery::default();
        let mut evicted = Vec::new();
        {
            let mut registry = self.registry();
            registry.replay.push_back(frame.clone());
            while registry.replay.len() > self.config.replay_capacity {
                registry.replay.pop_front();
            }

            if registry.clients.is_empty() {
                debug!(post_id = %post.id, replay = registry.replay.len(), "no clients, post kept for replay");
                return delivery;
            }

            for (&id, client) in &registry.clients {
                match client.queue.try_send(frame.clone()) {
                    Ok(()) => delivery.queued += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(client_id = id, "client queue full, evicting");
                        delivery.evicted.push(id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(client_id = id, "client writer gone, evicting");
                        delivery.evicted.push(id);
                    }
                }
            }

            for id in &delivery.evicted {
                if let Some(client) = registry.clients.remove(id) {
                    evicted.push((*id, client));
                }
            }
        }

        for (id, client) in evicted {
            client.kill.cancel();
            info!(client_id = id, "client evicted");
        }
        debug!(post_id = %post.id, queued = delivery.queued, "broadcast post");
        delivery
    }

    /// Drain `posts` into [`Hub::broadcast`] until cancelled or the channel closes.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, mut posts: mpsc::Receiver<Submission>) {
        info!("broadcast loop started");
        loop {
            let post = tokio::select! {
                _ = cancel.cancelled() => break,
                post = posts.recv() => match post {
                    Some(post) => post,
                    None => {
                        info!("post channel closed, broadcast loop exiting");
                        break;
                    }
                },
            };
            debug!(post_id = %post.id, subreddit = %post.subreddit, "received post for broadcast");
            self.broadcast(&post);
        }
        self.shutdown();
    }

    /// Evict every client.
    pub fn shutdown(&self) {
        let clients: Vec<(ClientId, Client)> = self.registry().clients.drain().collect();
        for (_, client) in &clients {
            client.kill.cancel();
        }
        if !clients.is_empty() {
            info!(clients = clients.len(), "closed all clients");
        }
    }

    pub fn client_count(&self) -> usize {
        self.registry().clients.len()
    }

    pub fn replay_len(&self) -> usize {
        self.registry().replay.len()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.registry().clients.contains_key(&id)
    }
}

/// Why a single socket write did not complete.
enum WriteFailure {
    Failed(String),
    TimedOut,
}

async fn send_frame<S>(sink: &mut S, frame: Frame, timeout: Duration) -> Result<(), WriteFailure>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(timeout, sink.send(Message::Text(frame))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteFailure::Failed(e.to_string())),
        Err(_) => Err(WriteFailure::TimedOut),
    }
}

/// Drive one client's socket: paced replay, then live frames until the
/// client is evicted or a write fails. Always deregisters the client on exit.
///
/// Live frames broadcast while the replay is still being paced are moved off
/// the bounded queue into a local backlog, so replay time never counts
/// against `client_buffer`. The backlog is written, in order, right after
/// the last replay frame.
///
/// A failed replay write only ends the replay; the live phase decides
/// whether the client stays.
pub async fn write_client<S>(hub: Arc<Hub>, sub: Subscription, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let Subscription {
        id,
        replay,
        mut live,
        kill,
    } = sub;
    let timeout = hub.config().write_timeout;
    let pacing = hub.config().replay_pacing;

    let mut backlog: VecDeque<Frame> = VecDeque::new();
    let mut live_open = true;

    if !replay.is_empty() {
        debug!(client_id = id, frames = replay.len(), "replaying recent posts");
    }
    let mut replay = replay.into_iter().peekable();
    'replay: while let Some(frame) = replay.next() {
        match send_frame(&mut sink, frame, timeout).await {
            Ok(()) => {}
            Err(WriteFailure::Failed(e)) => {
                warn!(client_id = id, error = %e, "replay write failed, skipping rest of replay");
                break;
            }
            Err(WriteFailure::TimedOut) => {
                warn!(client_id = id, "replay write timed out, skipping rest of replay");
                break;
            }
        }
        if replay.peek().is_none() {
            break;
        }

        let pause = tokio::time::sleep(pacing);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                biased;
                _ = kill.cancelled() => break 'replay,
                _ = &mut pause => break,
                frame = live.recv(), if live_open => match frame {
                    Some(frame) => backlog.push_back(frame),
                    None => live_open = false,
                },
            }
        }
    }
    if !backlog.is_empty() {
        debug!(client_id = id, frames = backlog.len(), "flushing posts broadcast during replay");
    }

    loop {
        let frame = if let Some(frame) = backlog.pop_front() {
            if kill.is_cancelled() {
                break;
            }
            frame
        } else {
            tokio::select! {
                biased;
                _ = kill.cancelled() => break,
                frame = live.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            }
        };
        match send_frame(&mut sink, frame, timeout).await {
            Ok(()) => {}
            Err(WriteFailure::Failed(e)) => {
                warn!(client_id = id, error = %e, "write to client failed");
                break;
            }
            Err(WriteFailure::TimedOut) => {
                warn!(client_id = id, timeout_secs = timeout.as_secs(), "write to client timed out");
                break;
            }
        }
    }

    hub.evict(id);
    let _ = tokio::time::timeout(timeout, sink.close()).await;
}
