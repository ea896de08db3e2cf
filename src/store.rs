//! Process-lifetime store of captured events.
//! Append-only: nothing is ever evicted or rewritten.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{ChannelId, Event};

#[derive(Clone, Default)]
pub struct EventStore {
    inner: Arc<RwLock<HashMap<ChannelId, Vec<Arc<Event>>>>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fully built event. The write lock makes the append atomic
    /// with respect to other writers and to readers.
    pub async fn append(&self, event: Event) -> Arc<Event> {
        let event = Arc::new(event);
        let mut guard = self.inner.write().await;
        guard
            .entry(event.channel_id.clone())
            .or_default()
            .push(event.clone());
        event
    }

    /// Snapshot of every event captured for `channel`, in append order.
    pub async fn filter(&self, channel: &ChannelId) -> Vec<Arc<Event>> {
        let guard = self.inner.read().await;
        guard.get(channel).cloned().unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
