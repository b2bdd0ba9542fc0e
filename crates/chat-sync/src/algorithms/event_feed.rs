//! # Event Feed
//!
//! Ordered, deduplicated, append-only set of `MessagePosted` events.
//!
//! Backfill and live delivery both feed [`EventFeed::admit`]. The feed keys
//! events by `(block_number, log_index)`:
//! 1. A key seen before is dropped (first admission wins, events are immutable)
//! 2. Iteration is always ascending by key
//! 3. Nothing is ever removed; the relative order of admitted events never changes

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::domain::{ChatMessageEvent, EventKey};

/// Canonical chat feed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFeed {
    events: BTreeMap<EventKey, ChatMessageEvent>,
    /// Highest key admitted so far.
    tip: Option<EventKey>,
    /// Admissions that landed below the tip (late deliveries).
    late_admissions: u64,
}

impl EventFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one event. Returns `false` if its key was already present.
    pub fn admit(&mut self, event: ChatMessageEvent) -> bool {
        let key = event.key();
        if self.events.contains_key(&key) {
            return false;
        }

        match self.tip {
            Some(tip) if key < tip => self.late_admissions += 1,
            _ => self.tip = Some(key),
        }
        self.events.insert(key, event);
        true
    }

    /// Admit a batch. Returns the number of new events.
    pub fn extend<I>(&mut self, events: I) -> usize
    where
        I: IntoIterator<Item = ChatMessageEvent>,
    {
        let mut admitted = 0;
        for event in events {
            if self.admit(event) {
                admitted += 1;
            }
        }
        admitted
    }

    /// Events oldest-first (newest last), the rendering order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatMessageEvent> {
        self.events.values()
    }

    /// Owned copy in rendering order.
    pub fn to_vec(&self) -> Vec<ChatMessageEvent> {
        self.events.values().cloned().collect()
    }

    /// Events with a key above `key` (all events for `None`), ascending.
    pub fn after(&self, key: Option<EventKey>) -> impl Iterator<Item = &ChatMessageEvent> {
        let lower = key.map_or(Bound::Unbounded, Bound::Excluded);
        self.events.range((lower, Bound::Unbounded)).map(|(_, e)| e)
    }

    /// Is this key already admitted?
    pub fn contains(&self, key: &EventKey) -> bool {
        self.events.contains_key(key)
    }

    /// Highest admitted key.
    pub fn tip(&self) -> Option<EventKey> {
        self.tip
    }

    /// Highest block with an admitted event.
    pub fn latest_block(&self) -> Option<u64> {
        self.tip.map(|k| k.block_number)
    }

    /// Number of admitted events that arrived below the tip.
    pub fn late_admissions(&self) -> u64 {
        self.late_admissions
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Is the feed empty?
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
