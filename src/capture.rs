use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method};
use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::types::{ChannelId, Event};

/// The parts of an inbound request that end up in an [`Event`].
#[derive(Debug, Clone, Copy)]
pub struct RawRequest<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub query: Option<&'a str>,
    pub body: &'a [u8],
}

/// Build an event stamped with a fresh id and the current time.
pub fn capture_event(channel: ChannelId, req: RawRequest<'_>) -> Event {
    capture_event_at(channel, req, Utc::now().timestamp_millis())
}

pub fn capture_event_at(channel: ChannelId, req: RawRequest<'_>, timestamp_ms: i64) -> Event {
    Event {
        id: Uuid::new_v4().to_string(),
        path: channel.viewer_path(),
        channel_id: channel,
        timestamp: timestamp_ms,
        method: req.method.as_str().to_string(),
        headers: collect_headers(req.headers),
        body: parse_body(req.body),
        query: parse_query(req.query),
    }
}

/// Best-effort JSON decode. Anything that is not JSON is captured as `null`.
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(err) => {
            warn!("capturing non-json body ({} bytes) as null: {err}", bytes.len());
            Value::Null
        }
    }
}

/// Repeated header names are folded into one `", "`-joined value.
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}

/// Decode a raw query string; the last occurrence of a key wins.
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    let Some(raw) = raw else {
        return BTreeMap::new();
    };
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}
