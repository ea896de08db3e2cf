//! Plain-text rendering of captured events for the terminal viewer.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::types::Event;

/// Events in `view` whose ids are not in `shown`, oldest first, recording
/// them as shown.
pub fn take_unseen<'a>(view: &'a [Event], shown: &mut HashSet<String>) -> Vec<&'a Event> {
    let mut fresh: Vec<&Event> = view
        .iter()
        .filter(|e| shown.insert(e.id.clone()))
        .collect();
    fresh.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
    fresh
}

pub fn render_event(event: &Event) -> String {
    let when = DateTime::from_timestamp_millis(event.timestamp)
        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| event.timestamp.to_string());

    let mut out = String::new();
    let _ = writeln!(out, "── {when}  {}  {}", event.method, event.id);
    section(&mut out, "Headers", &event.headers);
    section(&mut out, "Body", &event.body);
    section(&mut out, "Query Params", &event.query);
    out
}

fn section<T: Serialize>(out: &mut String, title: &str, value: &T) {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("<{err}>"));
    let _ = writeln!(out, "{title}:");
    for line in pretty.lines() {
        let _ = writeln!(out, "  {line}");
    }
}
