//! The durable event log a workflow replays against (spec §3, §4.8).
//!
//! `serde_json::Value`'s derived `PartialEq` already distinguishes integer
//! from float representations (its `Number` type stores which one it was
//! constructed from), so deep structural comparisons here are plain `==` —
//! no separate "preserve numeric kind" machinery is needed.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("push called while the cursor is not at the end of recorded history (index {index}, len {len})")]
    NonFinalPush { index: usize, len: usize },
}

/// Tags an event as either the canonical arguments of an activity call, or
/// the value it returned, both scoped to the activity's own key so replay
/// can tell two different activities' events apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKey {
    Args(String),
    Return(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub key: EventKey,
    pub value: Value,
}

/// An append-only ordered log plus a cursor used by replay. `start` rewinds
/// the cursor without discarding `events`, so a fresh attempt replays
/// everything recorded by a prior one before falling through to live
/// execution (spec §4.8).
#[derive(Clone, Debug, Default)]
pub struct EventHistory {
    events: Vec<Event>,
    idx: usize,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events, idx: 0 }
    }

    pub fn start(&mut self) {
        self.idx = 0;
    }

    /// Returns the event at the cursor and advances it, or `None` if the
    /// cursor is already at the end of recorded history.
    pub fn next(&mut self) -> Option<Event> {
        let event = self.events.get(self.idx).cloned();
        if event.is_some() {
            self.idx += 1;
        }
        event
    }

    /// Appends a new event. Only valid when the cursor sits at the end of
    /// the log — i.e. we're extending history during live execution, not
    /// part way through a replay, where every position up to the end must
    /// already be backed by a recorded event.
    pub fn push(&mut self, key: EventKey, value: Value) -> Result<(), HistoryError> {
        if self.idx != self.events.len() {
            return Err(HistoryError::NonFinalPush {
                index: self.idx,
                len: self.events.len(),
            });
        }
        self.events.push(Event { key, value });
        self.idx = self.events.len();
        Ok(())
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
