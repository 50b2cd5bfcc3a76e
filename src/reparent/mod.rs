//! Cross-trackable reparenting

pub mod coordinator;

use std::collections::HashMap;

use crate::scene::attachment::AttachmentId;
use crate::scene::trackable::TrackableId;

pub use coordinator::{abort, reparent, PendingSync, ReparentOutcome};

/// The visual transition slot.
///
/// While a global attachment is dragged between trackables its original
/// owner may disappear; the occupant of this slot keeps rendering from its
/// preserved composed pose and is exempt from lifecycle countdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionSlot {
    pub owner: TrackableId,
    pub attachment: AttachmentId,
}

/// Free-form JSON data keyed by entity path string.
///
/// Entries belonging to a reparented attachment are rekeyed with it so the
/// data stays addressable under the new owner.
#[derive(Default)]
pub struct KeyedStore {
    entries: HashMap<String, serde_json::Value>,
}

impl KeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry under `from` (the key itself or any `from/` child)
    /// to the corresponding key under `to`. Returns the `(old, new)` pairs
    /// so the move can be undone.
    pub fn rekey(&mut self, from: &str, to: &str) -> Vec<(String, String)> {
        let child_prefix = format!("{from}/");
        let moved: Vec<String> = self
            .entries
            .keys()
            .filter(|k| *k == from || k.starts_with(&child_prefix))
            .cloned()
            .collect();

        let mut pairs = Vec::with_capacity(moved.len());
        for old in moved {
            let new = format!("{to}{}", &old[from.len()..]);
            if let Some(value) = self.entries.remove(&old) {
                self.entries.insert(new.clone(), value);
            }
            pairs.push((old, new));
        }
        pairs
    }
}
