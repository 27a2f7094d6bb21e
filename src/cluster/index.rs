use std::collections::HashMap;

use crate::fingerprint::Fingerprint;
use crate::model::IndexedEvent;

/// Per-run snapshot of known events grouped by fingerprint bucket. Only events
/// sharing a bucket are ever compared.
#[derive(Debug, Default)]
pub struct BucketIndex {
    buckets: HashMap<u16, Vec<(i64, Fingerprint)>>,
}

impl BucketIndex {
    pub fn from_events(events: impl IntoIterator<Item = IndexedEvent>) -> Self {
        let mut index = BucketIndex::default();
        for ev in events {
            index.insert(ev.event_id, ev.key.fingerprint());
        }
        index
    }

    /// Adds an event at the end of its bucket. Known event ids are ignored.
    pub fn insert(&mut self, event_id: i64, fp: Fingerprint) {
        let slot = self.buckets.entry(fp.bucket()).or_default();
        if !slot.iter().any(|(id, _)| *id == event_id) {
            slot.push((event_id, fp));
        }
    }

    /// Closest event in the same bucket within `max_distance`. Equal distances
    /// resolve to the event indexed first.
    pub fn nearest(&self, fp: Fingerprint, max_distance: u32) -> Option<(i64, u32)> {
        let mut best: Option<(i64, u32)> = None;
        for (event_id, other) in self.buckets.get(&fp.bucket())? {
            let d = fp.distance(*other);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((*event_id, d));
            }
        }
        best.filter(|(_, d)| *d <= max_distance)
    }

    pub fn len(&self) -> usize { self.buckets.values().map(Vec::len).sum() }
}
