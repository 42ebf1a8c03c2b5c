use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::entities::image_record::ImageRecord;

/// Immutable snapshot handed to subscribers, newest first.
pub type ImageSnapshot = Arc<Vec<ImageRecord>>;

/// Single source of truth for a project's image records.
///
/// Every write (optimistic local transition, mutation result, push frame)
/// funnels through `upsert`/`remove`/`replace_all`. Mutation happens under
/// one non-async lock, so each call applies atomically with no interleaving
/// across suspension points. Subscribers observe immutable snapshots
/// through a watch channel; a notification fires if and only if the record
/// set actually changed.
pub struct ImageRegistry {
    records: RwLock<HashMap<String, ImageRecord>>,
    snapshot_tx: watch::Sender<ImageSnapshot>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        ImageRegistry {
            records: RwLock::new(HashMap::new()),
            snapshot_tx: watch::channel(Arc::new(Vec::new())).0,
        }
    }

    /// Reactive view of the image set. Receivers stay valid for the life
    /// of the registry; `borrow()` is always the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ImageSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn get(&self, id: &str) -> Option<ImageRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<ImageRecord> {
        sorted(&self.records.read())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Inserts or replaces by id. Returns whether anything changed.
    ///
    /// Two rules keep concurrent writers from fighting:
    /// - structural equality suppression: an update identical to the stored
    ///   record fires no notification (push channels redeliver frames);
    /// - timestamp authority: an update whose `last_processed_at` is
    ///   strictly older than the stored one is ignored, so out-of-order
    ///   delivery never regresses state.
    pub fn upsert(&self, record: ImageRecord) -> bool {
        let mut records = self.records.write();
        match records.get(&record.id) {
            Some(stored) if *stored == record => false,
            Some(stored) if record.authority() < stored.authority() => {
                debug!(
                    image_id = %record.id,
                    "Ignoring stale update ({} < {})",
                    record.authority(),
                    stored.authority()
                );
                false
            }
            _ => {
                records.insert(record.id.clone(), record);
                self.publish(&records);
                true
            }
        }
    }

    /// Deletes a record; no-op if absent.
    pub fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write();
        if records.remove(id).is_some() {
            self.publish(&records);
            true
        } else {
            false
        }
    }

    /// Bulk reconciliation after a full refetch. Applies the same per-record
    /// authority rule as `upsert` and drops records the server no longer
    /// knows, but notifies at most once for the whole batch.
    pub fn replace_all(&self, incoming: Vec<ImageRecord>) -> bool {
        let mut records = self.records.write();
        let mut next: HashMap<String, ImageRecord> = HashMap::with_capacity(incoming.len());
        for record in incoming {
            match records.get(&record.id) {
                Some(stored) if record.authority() < stored.authority() => {
                    next.insert(stored.id.clone(), stored.clone());
                }
                _ => {
                    next.insert(record.id.clone(), record);
                }
            }
        }
        if *records == next {
            false
        } else {
            *records = next;
            self.publish(&records);
            true
        }
    }

    // Called with the write lock held so publishes cannot reorder.
    fn publish(&self, records: &HashMap<String, ImageRecord>) {
        self.snapshot_tx.send_replace(Arc::new(sorted(records)));
    }
}

fn sorted(records: &HashMap<String, ImageRecord>) -> Vec<ImageRecord> {
    let mut list: Vec<ImageRecord> = records.values().cloned().collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    list
}

impl Default for ImageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
