//! Coil store: the single in-memory view every surface renders.
//!
//! DESIGN
//! ======
//! Records are keyed by `coil_id` with a separate newest-first order, so a
//! re-emitted event updates the existing row instead of duplicating it.
//! Every mutation stamps the touched record with a monotonic sequence number.
//!
//! - Live events prepend and then truncate to `capacity`, evicting the oldest.
//! - A snapshot merge is unbounded. It is taken against the watermark that
//!   was current when the fetch started: records touched after the watermark
//!   (an event or dispatch that raced the fetch) win over snapshot rows;
//!   everything else is replaced by the snapshot.
//! - Dispatch marks a record `Dispatched` at the drop point.
//!
//! `SharedStore` wraps the store for async consumers and publishes a revision
//! on a `watch` channel after each mutation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, watch};

use crate::coil::{Coil, CoilStatus};
use crate::location::DropLocation;

/// Bound applied when live events are pushed.
pub const DEFAULT_CAPACITY: usize = 20;

// =============================================================================
// COIL STORE
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    coil: Coil,
    seq: u64,
}

/// Counts reported by [`CoilStore::merge_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Snapshot rows written into the store.
    pub applied: usize,
    /// Local records newer than the watermark that were kept over the snapshot.
    pub kept_local: usize,
    /// Snapshot rows skipped because a newer local record or an earlier
    /// snapshot row with the same id already won.
    pub skipped: usize,
    /// Stale local records the snapshot no longer contains.
    pub dropped: usize,
}

#[derive(Debug)]
pub struct CoilStore {
    entries: HashMap<String, Entry>,
    /// Newest first.
    order: VecDeque<String>,
    capacity: usize,
    seq: u64,
}

impl CoilStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new(), capacity: capacity.max(1), seq: 0 }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sequence number of the most recent mutation.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn get(&self, coil_id: &str) -> Option<&Coil> {
        self.entries.get(coil_id).map(|entry| &entry.coil)
    }

    #[must_use]
    pub fn location_of(&self, coil_id: &str) -> Option<&str> {
        self.get(coil_id).map(|coil| coil.location.as_str())
    }

    /// Records newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Coil> {
        self.order.iter().filter_map(|id| self.entries.get(id)).map(|entry| &entry.coil)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Coil> {
        self.iter().cloned().collect()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Insert `coil` as the newest record, replacing any record with the same
    /// id, then evict from the back down to capacity. Returns evicted records.
    pub fn push_front(&mut self, coil: Coil) -> Vec<Coil> {
        let id = coil.coil_id.clone();
        if self.entries.contains_key(&id) {
            self.order.retain(|existing| existing != &id);
        }
        let seq = self.next_seq();
        self.entries.insert(id.clone(), Entry { coil, seq });
        self.order.push_front(id);

        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.pop_back() else { break };
            if let Some(entry) = self.entries.remove(&oldest) {
                evicted.push(entry.coil);
            }
        }
        evicted
    }

    /// Merge a snapshot fetched after `watermark` was observed. `coils` is in
    /// backend order, newest first.
    pub fn merge_snapshot(&mut self, coils: Vec<Coil>, watermark: u64) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut next_entries = HashMap::with_capacity(coils.len() + self.entries.len());
        let mut next_order = VecDeque::with_capacity(coils.len() + self.order.len());

        let fresh: Vec<String> = self
            .order
            .iter()
            .filter(|id| self.entries.get(*id).is_some_and(|entry| entry.seq > watermark))
            .cloned()
            .collect();
        for id in fresh {
            if let Some(entry) = self.entries.remove(&id) {
                next_entries.insert(id.clone(), entry);
                next_order.push_back(id);
                summary.kept_local += 1;
            }
        }

        for coil in coils {
            if next_entries.contains_key(&coil.coil_id) {
                summary.skipped += 1;
                continue;
            }
            self.entries.remove(&coil.coil_id);
            let seq = self.next_seq();
            next_order.push_back(coil.coil_id.clone());
            next_entries.insert(coil.coil_id.clone(), Entry { coil, seq });
            summary.applied += 1;
        }

        summary.dropped = self.entries.len();
        self.entries = next_entries;
        self.order = next_order;
        summary
    }

    /// Apply a confirmed crane assignment. Returns `false` when the coil is
    /// not in view.
    pub fn mark_dispatched(&mut self, coil_id: &str, drop: DropLocation) -> bool {
        let seq = self.seq + 1;
        let Some(entry) = self.entries.get_mut(coil_id) else {
            return false;
        };
        entry.coil.status = CoilStatus::Dispatched;
        entry.coil.location = drop.as_str().to_owned();
        entry.seq = seq;
        self.seq = seq;
        true
    }
}

impl Default for CoilStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// =============================================================================
// SHARED STORE
// =============================================================================

/// Cloneable async handle to one `CoilStore`.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<CoilStore>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SharedStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self { inner: Arc::new(RwLock::new(CoilStore::new(capacity))), revision: Arc::new(revision) }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CoilStore> {
        self.inner.read().await
    }

    pub async fn coils(&self) -> Vec<Coil> {
        self.inner.read().await.to_vec()
    }

    pub async fn watermark(&self) -> u64 {
        self.inner.read().await.watermark()
    }

    pub async fn location_of(&self, coil_id: &str) -> Option<String> {
        self.inner.read().await.location_of(coil_id).map(ToOwned::to_owned)
    }

    pub async fn push_front(&self, coil: Coil) -> Vec<Coil> {
        let mut store = self.inner.write().await;
        let evicted = store.push_front(coil);
        self.revision.send_replace(store.watermark());
        evicted
    }

    pub async fn merge_snapshot(&self, coils: Vec<Coil>, watermark: u64) -> MergeSummary {
        let mut store = self.inner.write().await;
        let summary = store.merge_snapshot(coils, watermark);
        self.revision.send_replace(store.watermark());
        summary
    }

    pub async fn mark_dispatched(&self, coil_id: &str, drop: DropLocation) -> bool {
        let mut store = self.inner.write().await;
        let changed = store.mark_dispatched(coil_id, drop);
        if changed {
            self.revision.send_replace(store.watermark());
        }
        changed
    }

    /// Receiver that observes the watermark after every mutation.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
