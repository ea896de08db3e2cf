//! Tests for id-keyed event merging.

use std::collections::BTreeMap;

use hookwatch::merge::{count_new, merge, sort_newest_first};
use hookwatch::types::{ChannelId, Event};

fn make_event(id: &str, ts: i64) -> Event {
    let channel = ChannelId::new("abc").unwrap();
    Event {
        id: id.to_string(),
        path: channel.viewer_path(),
        channel_id: channel,
        timestamp: ts,
        method: "POST".to_string(),
        headers: BTreeMap::new(),
        body: serde_json::json!({ "id": id }),
        query: BTreeMap::new(),
    }
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

#[test]
fn test_merge_sorts_newest_first() {
    let local = vec![make_event("a", 10)];
    let incoming = vec![make_event("b", 30), make_event("c", 20)];

    let merged = merge(&local, &incoming);
    assert_eq!(ids(&merged), vec!["b", "c", "a"]);
}

#[test]
fn test_merge_collapses_duplicate_ids() {
    let local = vec![make_event("a", 10), make_event("b", 20)];
    let incoming = vec![make_event("b", 20), make_event("c", 30), make_event("c", 30)];

    let merged = merge(&local, &incoming);
    assert_eq!(ids(&merged), vec!["c", "b", "a"]);
}

#[test]
fn test_merge_is_idempotent() {
    let a = vec![make_event("a", 10), make_event("b", 20)];
    let b = vec![make_event("b", 20), make_event("c", 5)];

    let once = merge(&a, &b);
    let twice = merge(&once, &b);
    assert_eq!(once, twice);
}

#[test]
fn test_merge_is_commutative() {
    let a = vec![make_event("a", 10), make_event("b", 20)];
    let b = vec![make_event("c", 20), make_event("d", 1)];

    assert_eq!(merge(&a, &b), merge(&b, &a));
}

#[test]
fn test_merge_with_empty_incoming_keeps_local() {
    let local = vec![make_event("a", 10), make_event("b", 20)];
    let merged = merge(&local, &[]);
    assert_eq!(ids(&merged), vec!["b", "a"]);
}

#[test]
fn test_equal_timestamps_tie_break_on_id() {
    let mut events = vec![make_event("x", 7), make_event("z", 7), make_event("y", 7)];
    sort_newest_first(&mut events);
    assert_eq!(ids(&events), vec!["z", "y", "x"]);
}

#[test]
fn test_count_new_ignores_known_and_repeated_ids() {
    let local = vec![make_event("a", 1)];
    let incoming = vec![make_event("a", 1), make_event("b", 2), make_event("b", 2)];
    assert_eq!(count_new(&local, &incoming), 1);
    assert_eq!(count_new(&incoming, &local), 0);
}
