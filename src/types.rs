use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Name of the logical endpoint events are captured under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            anyhow::bail!("channel id must not be empty");
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Viewer path recorded on every event of this channel.
    pub fn viewer_path(&self) -> String {
        format!("/webhook/{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelId {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0.to_string()
    }
}

/// One captured inbound request. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub channel_id: ChannelId,
    pub timestamp: i64,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    /// `null` when the payload was not valid JSON.
    pub body: serde_json::Value,
    pub query: BTreeMap<String, String>,
    pub path: String,
}

/// Response to a successful capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAck {
    pub success: bool,
    pub webhook_id: String,
}

impl IngestAck {
    pub fn for_event(event: &Event) -> Self {
        Self {
            success: true,
            webhook_id: event.id.clone(),
        }
    }
}
