//! Durable client-side cache of captured events.
//!
//! One JSON document holds the `webhooks` collection keyed by event id. A
//! per-channel index ordered by timestamp is rebuilt when the file is opened,
//! so reading a channel never walks other channels' events. The file is opened
//! lazily on first use and every write replaces it atomically.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::types::{ChannelId, Event};

pub const COLLECTION: &str = "webhooks";
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    webhooks: BTreeMap<String, Event>,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            webhooks: BTreeMap::new(),
        }
    }
}

struct Handle {
    file: CacheFile,
    by_channel: HashMap<ChannelId, BTreeSet<(i64, String)>>,
}

impl Handle {
    fn new(file: CacheFile) -> Self {
        let mut by_channel: HashMap<ChannelId, BTreeSet<(i64, String)>> = HashMap::new();
        for event in file.webhooks.values() {
            by_channel
                .entry(event.channel_id.clone())
                .or_default()
                .insert((event.timestamp, event.id.clone()));
        }
        Self { file, by_channel }
    }

    fn index(&mut self, event: &Event) {
        self.by_channel
            .entry(event.channel_id.clone())
            .or_default()
            .insert((event.timestamp, event.id.clone()));
    }

    fn unindex(&mut self, event: &Event) {
        if let Some(keys) = self.by_channel.get_mut(&event.channel_id) {
            keys.remove(&(event.timestamp, event.id.clone()));
            if keys.is_empty() {
                self.by_channel.remove(&event.channel_id);
            }
        }
    }

    /// Insert or replace, returning the previous record when it differed.
    fn upsert(&mut self, event: &Event) -> Option<Option<Event>> {
        if self.file.webhooks.get(&event.id) == Some(event) {
            return None;
        }
        let previous = self.file.webhooks.insert(event.id.clone(), event.clone());
        if let Some(prev) = &previous {
            self.unindex(prev);
        }
        self.index(event);
        Some(previous)
    }

    fn revert(&mut self, id: &str, previous: Option<Event>) {
        if let Some(current) = self.file.webhooks.remove(id) {
            self.unindex(&current);
        }
        if let Some(prev) = previous {
            self.index(&prev);
            self.file.webhooks.insert(prev.id.clone(), prev);
        }
    }
}

pub struct PersistentCache {
    path: PathBuf,
    handle: OnceCell<Mutex<Handle>>,
}

impl PersistentCache {
    /// Nothing touches the disk until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.handle.initialized()
    }

    /// Open the backing file, creating it if absent. A failed open leaves the
    /// cache closed so the next operation retries.
    pub async fn open(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<&Mutex<Handle>> {
        self.handle
            .get_or_try_init(|| async {
                let file = open_or_create(&self.path)?;
                info!(
                    "opened {} cache at {} ({} events)",
                    COLLECTION,
                    self.path.display(),
                    file.webhooks.len()
                );
                Ok::<_, anyhow::Error>(Mutex::new(Handle::new(file)))
            })
            .await
    }

    /// Upsert by id. Records already stored unchanged are skipped, and when
    /// nothing changed the file is left alone. Returns the number of records
    /// written.
    pub async fn put_many(&self, events: &[Event]) -> Result<usize> {
        let mut guard = self.handle().await?.lock().await;
        let mut undo: Vec<(String, Option<Event>)> = Vec::new();
        for event in events {
            if let Some(previous) = guard.upsert(event) {
                undo.push((event.id.clone(), previous));
            }
        }
        if undo.is_empty() {
            return Ok(0);
        }
        if let Err(err) = save_file(&guard.file, &self.path) {
            for (id, previous) in undo.into_iter().rev() {
                guard.revert(&id, previous);
            }
            return Err(err);
        }
        debug!("persisted {} events to {}", undo.len(), self.path.display());
        Ok(undo.len())
    }

    pub async fn put(&self, event: &Event) -> Result<bool> {
        Ok(self.put_many(std::slice::from_ref(event)).await? > 0)
    }

    /// All cached events for `channel`, oldest first.
    pub async fn events_for(&self, channel: &ChannelId) -> Result<Vec<Event>> {
        let guard = self.handle().await?.lock().await;
        let Some(keys) = guard.by_channel.get(channel) else {
            return Ok(Vec::new());
        };
        let events = keys
            .iter()
            .filter_map(|(_, id)| guard.file.webhooks.get(id).cloned())
            .collect();
        Ok(events)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Event>> {
        let guard = self.handle().await?.lock().await;
        Ok(guard.file.webhooks.get(id).cloned())
    }

    pub async fn len(&self) -> Result<usize> {
        let guard = self.handle().await?.lock().await;
        Ok(guard.file.webhooks.len())
    }
}

fn open_or_create(path: &Path) -> Result<CacheFile> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let file = CacheFile::default();
            save_file(&file, path)?;
            return Ok(file);
        }
        Err(err) => return Err(err).context("reading event cache"),
    };
    let file: CacheFile = serde_json::from_slice(&data).context("parsing event cache")?;
    if file.version != CACHE_VERSION {
        anyhow::bail!(
            "unsupported event cache version {} (expected {})",
            file.version,
            CACHE_VERSION
        );
    }
    Ok(file)
}

fn save_file(file: &CacheFile, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("creating event cache directory")?;
    }
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(file).context("serializing event cache")?;
    fs::write(&tmp, data).context("writing temp event cache")?;
    fs::rename(&tmp, path).context("replacing event cache")?;
    Ok(())
}
