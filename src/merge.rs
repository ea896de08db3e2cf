//! Id-keyed merge of event sets.
//!
//! Events are immutable, so two copies with the same id are interchangeable
//! and the copy already held locally is kept. The result is ordered newest
//! first with the id as a tie-break, which makes the merge idempotent and
//! commutative over whole sets.

use std::collections::HashSet;

use crate::types::Event;

pub fn merge(local: &[Event], incoming: &[Event]) -> Vec<Event> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(local.len() + incoming.len());
    let mut merged: Vec<Event> = Vec::with_capacity(local.len() + incoming.len());
    for event in local.iter().chain(incoming) {
        if seen.insert(event.id.as_str()) {
            merged.push(event.clone());
        }
    }
    sort_newest_first(&mut merged);
    merged
}

/// Number of events in `incoming` whose id is not in `local`.
pub fn count_new(local: &[Event], incoming: &[Event]) -> usize {
    let known: HashSet<&str> = local.iter().map(|e| e.id.as_str()).collect();
    incoming
        .iter()
        .map(|e| e.id.as_str())
        .collect::<HashSet<_>>()
        .difference(&known)
        .count()
}

pub fn sort_newest_first(events: &mut [Event]) {
    events.sort_by(|a, b| (b.timestamp, &b.id).cmp(&(a.timestamp, &a.id)));
}
