//! Smart Delta: change detection against the last snapshot

use crate::library::LightEntry;
use crate::snapshot::{content_hash, Snapshot};
use std::collections::{BTreeSet, HashMap};

/// Entry ids classified by how they changed since the snapshot
///
/// The three sets are pairwise disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackDelta {
    pub added: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl TrackDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Ids that exist now and need resolution (added ∪ updated)
    pub fn changed_ids(&self) -> BTreeSet<String> {
        self.added.union(&self.updated).cloned().collect()
    }
}

/// Compare a cheap current listing against a snapshot
pub fn compute(snapshot: &Snapshot, current: &[LightEntry]) -> TrackDelta {
    let previous: HashMap<&str, _> = snapshot
        .entries
        .iter()
        .map(|e| (e.entry_id.as_str(), e))
        .collect();

    let mut delta = TrackDelta::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for entry in current {
        if !seen.insert(entry.id.as_str()) {
            continue;
        }
        match previous.get(entry.id.as_str()) {
            None => {
                delta.added.insert(entry.id.clone());
            }
            Some(old) => {
                if old.last_modified != entry.last_modified || old.content_hash != content_hash(entry) {
                    delta.updated.insert(entry.id.clone());
                }
            }
        }
    }

    for id in previous.keys() {
        if !seen.contains(id) {
            delta.removed.insert((*id).to_string());
        }
    }

    tracing::debug!(
        added = delta.added.len(),
        updated = delta.updated.len(),
        removed = delta.removed.len(),
        "Delta computed"
    );
    delta
}
