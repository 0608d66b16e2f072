//! Ordered correspondence (GCP) storage with change notifications.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::crs::CrsId;

/// A digitized origin → destination pair.
///
/// Both coordinates are expressed in `crs`. `residual` is derived from the
/// most recent fit and is only written by residual evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondencePoint {
    pub origin: [f64; 2],
    pub destination: [f64; 2],
    pub crs: CrsId,
    residual: Option<f64>,
}

impl CorrespondencePoint {
    pub fn new(origin: [f64; 2], destination: [f64; 2], crs: CrsId) -> Self {
        Self {
            origin,
            destination,
            crs,
            residual: None,
        }
    }

    /// Distance between the destination and the fitted prediction for the
    /// origin, if the last evaluation produced one.
    pub fn residual(&self) -> Option<f64> {
        self.residual
    }
}

/// Store mutation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A point was appended at `index`.
    Added { index: usize },
    /// Rows were deleted, listed in the (descending) order they were removed.
    Removed { indices: Vec<usize> },
    /// Every point was removed.
    Cleared,
    /// Residuals were recomputed.
    ResidualsUpdated,
}

/// Handle returned by [`CorrespondenceStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// Ordered correspondence list. Index `i` is displayed as row `i + 1`.
///
/// Indices always stay contiguous in `0..len()`.
#[derive(Default)]
pub struct CorrespondenceStore {
    points: Vec<CorrespondencePoint>,
    revision: u64,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl std::fmt::Debug for CorrespondenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrespondenceStore")
            .field("points", &self.points)
            .field("revision", &self.revision)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[CorrespondencePoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&CorrespondencePoint> {
        self.points.get(index)
    }

    /// Counter bumped on every structural mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Hash of the ordered `(origin, destination, crs)` triples.
    pub fn snapshot_hash(&self) -> u64 {
        snapshot_hash(&self.points)
    }

    /// Append a correspondence and return its index.
    pub fn add(&mut self, origin: [f64; 2], destination: [f64; 2], crs: CrsId) -> usize {
        self.points
            .push(CorrespondencePoint::new(origin, destination, crs));
        let index = self.points.len() - 1;
        self.revision += 1;
        self.notify(&StoreEvent::Added { index });
        index
    }

    /// Delete the given rows.
    ///
    /// Rows are removed highest index first so earlier removals in the batch
    /// never shift later ones. Duplicate and out-of-range indices are
    /// ignored. Returns the removed indices in removal order.
    pub fn remove<I>(&mut self, indices: I) -> Vec<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut rows: Vec<usize> = indices
            .into_iter()
            .filter(|&i| i < self.points.len())
            .collect();
        rows.sort_unstable_by(|a, b| b.cmp(a));
        rows.dedup();
        if rows.is_empty() {
            return rows;
        }

        for &row in &rows {
            self.points.remove(row);
        }
        self.revision += 1;
        self.notify(&StoreEvent::Removed {
            indices: rows.clone(),
        });
        rows
    }

    /// Remove every point. Does nothing on an empty store.
    pub fn clear(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.points.clear();
        self.revision += 1;
        self.notify(&StoreEvent::Cleared);
    }

    /// Register a change callback.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Drop a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub(crate) fn set_residual(&mut self, index: usize, residual: Option<f64>) {
        if let Some(p) = self.points.get_mut(index) {
            p.residual = residual;
        }
    }

    pub(crate) fn clear_residuals(&mut self) {
        for p in &mut self.points {
            p.residual = None;
        }
    }

    pub(crate) fn notify(&mut self, event: &StoreEvent) {
        for (_, observer) in &mut self.observers {
            observer(event);
        }
    }
}

/// Order-sensitive hash over correspondence coordinates and CRS ids.
///
/// Residuals are excluded: they are derived from the snapshot.
pub fn snapshot_hash(points: &[CorrespondencePoint]) -> u64 {
    let mut hasher = DefaultHasher::new();
    points.len().hash(&mut hasher);
    for p in points {
        for v in p.origin.iter().chain(p.destination.iter()) {
            v.to_bits().hash(&mut hasher);
        }
        p.crs.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn wgs84() -> CrsId {
        CrsId::new("EPSG:4326")
    }

    fn recording_store() -> (CorrespondenceStore, Rc<RefCell<Vec<StoreEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut store = CorrespondenceStore::new();
        let sink = Rc::clone(&events);
        store.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        (store, events)
    }

    #[test]
    fn add_appends_with_contiguous_indices() {
        let (mut store, events) = recording_store();
        assert!(store.is_empty());

        assert_eq!(store.add([10.0, 11.0], [20.0, 22.0], wgs84()), 0);
        assert_eq!(store.add([100.0, 101.0], [200.0, 202.0], CrsId::new("EPSG:3111")), 1);

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.points()[0],
            CorrespondencePoint::new([10.0, 11.0], [20.0, 22.0], wgs84())
        );
        assert_eq!(store.get(1).unwrap().crs.as_str(), "EPSG:3111");
        assert_eq!(store.get(1).unwrap().residual(), None);
        assert_eq!(
            *events.borrow(),
            vec![StoreEvent::Added { index: 0 }, StoreEvent::Added { index: 1 }]
        );
    }

    #[test]
    fn remove_processes_rows_in_descending_order() {
        let (mut store, events) = recording_store();
        store.add([0.0, 0.0], [1.0, 1.0], wgs84());
        store.add([1.0, 0.0], [2.0, 1.0], wgs84());
        store.add([2.0, 0.0], [3.0, 1.0], wgs84());

        let removed = store.remove([1, 0]);
        assert_eq!(removed, vec![1, 0]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.points()[0].origin, [2.0, 0.0]);
        assert_eq!(
            events.borrow().last(),
            Some(&StoreEvent::Removed {
                indices: vec![1, 0]
            })
        );
    }

    #[test]
    fn remove_ignores_duplicates_and_out_of_range() {
        let mut store = CorrespondenceStore::new();
        store.add([0.0, 0.0], [1.0, 1.0], wgs84());
        store.add([1.0, 0.0], [2.0, 1.0], wgs84());
        let rev = store.revision();

        assert!(store.remove([7]).is_empty());
        assert_eq!(store.revision(), rev);

        assert_eq!(store.remove([0, 0, 5]), vec![0]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.points()[0].origin, [1.0, 0.0]);
    }

    #[test]
    fn clear_is_silent_when_already_empty() {
        let (mut store, events) = recording_store();
        store.clear();
        assert!(events.borrow().is_empty());

        store.add([0.0, 0.0], [1.0, 1.0], wgs84());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(events.borrow().last(), Some(&StoreEvent::Cleared));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let (mut store, events) = recording_store();
        let extra = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&extra);
        let id = store.subscribe(move |_| *counter.borrow_mut() += 1);

        store.add([0.0, 0.0], [1.0, 1.0], wgs84());
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.add([1.0, 0.0], [1.0, 1.0], wgs84());

        assert_eq!(*extra.borrow(), 1);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn snapshot_hash_tracks_order_and_content_but_not_residuals() {
        let mut a = CorrespondenceStore::new();
        a.add([0.0, 0.0], [1.0, 1.0], wgs84());
        a.add([2.0, 0.0], [3.0, 1.0], wgs84());

        let mut b = CorrespondenceStore::new();
        b.add([2.0, 0.0], [3.0, 1.0], wgs84());
        b.add([0.0, 0.0], [1.0, 1.0], wgs84());
        assert_ne!(a.snapshot_hash(), b.snapshot_hash());

        let before = a.snapshot_hash();
        a.set_residual(0, Some(0.5));
        assert_eq!(a.snapshot_hash(), before);
        assert_eq!(a.points()[0].residual(), Some(0.5));
        a.clear_residuals();
        assert_eq!(a.points()[0].residual(), None);
    }
}
