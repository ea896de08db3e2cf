//! Client-side poll/merge/persist loop for one channel.
//!
//! The engine shows the cached events first, then polls the server on a fixed
//! interval and merges every nonempty reply into the held set by id. The
//! visible set only ever grows: empty replies and failed polls leave it as it
//! was. Each tick runs in its own task so a stalled request never holds back
//! the next tick; commits are serialized by the state lock.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::cache::PersistentCache;
use crate::merge::{count_new, merge};
use crate::types::{ChannelId, Event};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Where the engine pulls the authoritative event list from.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    async fn fetch_events(&self, channel: &ChannelId) -> Result<Vec<Event>>;
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub channel: ChannelId,
    pub poll_interval: Duration,
}

impl SyncConfig {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// New events were merged into the view. `persisted` is false when the
    /// cache write failed and will be retried on a later cycle.
    Merged { added: usize, persisted: bool },
    /// The reply only held events already visible.
    Unchanged,
    /// The server had nothing for the channel; local state untouched.
    Empty,
    /// The poll failed; local state untouched.
    Failed,
}

pub type View = Arc<Vec<Event>>;

struct LocalState {
    events: Vec<Event>,
    /// Set when the view holds events the cache has not accepted yet.
    unpersisted: bool,
}

struct Shared {
    cfg: SyncConfig,
    source: Arc<dyn EventSource>,
    cache: Arc<PersistentCache>,
    state: Mutex<LocalState>,
    view_tx: watch::Sender<View>,
}

#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    pub fn new(cfg: SyncConfig, source: Arc<dyn EventSource>, cache: Arc<PersistentCache>) -> Self {
        let (view_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                cfg,
                source,
                cache,
                state: Mutex::new(LocalState {
                    events: Vec::new(),
                    unpersisted: false,
                }),
                view_tx,
            }),
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.shared.cfg.channel
    }

    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.shared.view_tx.subscribe()
    }

    /// The currently rendered events, newest first.
    pub fn view(&self) -> View {
        self.shared.view_tx.borrow().clone()
    }

    /// Seed the view from the cache. A cache failure is logged and the engine
    /// carries on with whatever it already holds.
    pub async fn load_cached(&self) -> usize {
        let shared = &self.shared;
        let cached = match shared.cache.events_for(&shared.cfg.channel).await {
            Ok(events) => events,
            Err(err) => {
                warn!(
                    "channel {}: could not read event cache: {err:?}",
                    shared.cfg.channel
                );
                return 0;
            }
        };
        let mut state = shared.state.lock().await;
        let added = count_new(&state.events, &cached);
        if added > 0 {
            state.events = merge(&state.events, &cached);
            shared.view_tx.send_replace(Arc::new(state.events.clone()));
        }
        info!(
            "channel {}: loaded {} cached events",
            shared.cfg.channel, added
        );
        added
    }

    /// Fetch once and fold the reply into the view and the cache.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.shared.run_cycle().await
    }

    /// Load the cache, then poll immediately and every `poll_interval` until
    /// the returned handle is stopped.
    pub async fn start(self) -> SyncHandle {
        self.load_cached().await;
        let shutdown = CancellationToken::new();
        let view_rx = self.subscribe();
        let join = tokio::spawn(poll_loop(self.shared.clone(), shutdown.clone()));
        SyncHandle {
            _cancel_on_drop: shutdown.clone().drop_guard(),
            shutdown,
            join,
            view_rx,
        }
    }
}

impl Shared {
    async fn run_cycle(&self) -> CycleOutcome {
        let channel = &self.cfg.channel;
        let mut fetched = match self.source.fetch_events(channel).await {
            Ok(events) => events,
            Err(err) => {
                warn!("channel {channel}: poll failed, keeping current view: {err:?}");
                return CycleOutcome::Failed;
            }
        };

        let before = fetched.len();
        fetched.retain(|e| &e.channel_id == channel);
        if fetched.len() != before {
            warn!(
                "channel {channel}: ignored {} events addressed to other channels",
                before - fetched.len()
            );
        }
        if fetched.is_empty() {
            debug!("channel {channel}: empty reply, keeping current view");
            return CycleOutcome::Empty;
        }

        let mut state = self.state.lock().await;
        let added = count_new(&state.events, &fetched);
        if added == 0 && !state.unpersisted {
            return CycleOutcome::Unchanged;
        }

        let merged = merge(&state.events, &fetched);
        let persisted = match self.cache.put_many(&merged).await {
            Ok(written) => {
                debug!("channel {channel}: cached {written} events");
                true
            }
            Err(err) => {
                warn!("channel {channel}: skipping cache write this cycle: {err:?}");
                false
            }
        };
        state.unpersisted = !persisted;

        if added == 0 {
            return CycleOutcome::Unchanged;
        }
        state.events = merged;
        self.view_tx.send_replace(Arc::new(state.events.clone()));
        info!(
            "channel {channel}: merged {added} new events ({} visible)",
            state.events.len()
        );
        CycleOutcome::Merged { added, persisted }
    }
}

async fn poll_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut ticker = interval(shared.cfg.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycles: JoinSet<CycleOutcome> = JoinSet::new();
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(err) = joined {
                    warn!("channel {}: poll cycle task failed: {err:?}", shared.cfg.channel);
                }
            }

            _ = ticker.tick() => {
                let shared = shared.clone();
                cycles.spawn(async move { shared.run_cycle().await });
            }
        }
    }
    // A cycle can only be aborted at an await. Its last await precedes the
    // first mutation of cache or view.
    cycles.shutdown().await;
    info!("channel {}: polling stopped", shared.cfg.channel);
}

/// Running engine. Dropping it cancels the schedule without waiting for the
/// poll task; [`SyncHandle::stop`] also waits.
pub struct SyncHandle {
    _cancel_on_drop: DropGuard,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    view_rx: watch::Receiver<View>,
}

impl SyncHandle {
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view_rx.clone()
    }

    pub fn view(&self) -> View {
        self.view_rx.borrow().clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the schedule and wait until no cycle is running.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.join.await.context("sync loop join failed")
    }
}
