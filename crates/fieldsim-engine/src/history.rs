//! Snapshot history
//!
//! Snapshots are full deep copies of the world keyed by simulation time, so
//! restoring one is exact: the restored world compares equal to the world at
//! the moment it was saved.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use fieldsim_world::World;

/// Simulation time usable as an ordered map key
///
/// Ordered with `f64::total_cmp`, so every value (NaN included) has a place.
/// Negative zero compares equal to zero.
#[derive(Debug, Clone, Copy)]
pub struct SimTime(pub f64);

impl SimTime {
    /// Key for `time`, with `-0.0` stored as `0.0`
    pub fn new(time: f64) -> Self {
        SimTime(time + 0.0)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0 + 0.0).total_cmp(&(other.0 + 0.0))
    }
}

/// Storage and lookup of historical world states
pub trait StateHistory {
    /// Save a snapshot at `time`, replacing any snapshot already there
    fn save_state(&mut self, time: f64, world: &World);

    /// Snapshot at exactly `time`
    fn get_state(&self, time: f64) -> Option<&World>;

    /// Latest snapshot at or before `time`
    fn get_nearest_before(&self, time: f64) -> Option<(f64, &World)>;

    /// Drop every snapshot strictly after `time`
    fn clear_after(&mut self, time: f64);

    /// Drop every snapshot
    fn clear(&mut self);

    /// Number of snapshots stored
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot times, ascending
    fn times(&self) -> Vec<f64>;
}

/// Unbounded time-ordered snapshot store
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshots: BTreeMap<SimTime, World>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest and latest snapshot times
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let first = self.snapshots.keys().next()?;
        let last = self.snapshots.keys().next_back()?;
        Some((first.0, last.0))
    }
}

impl StateHistory for SnapshotStore {
    fn save_state(&mut self, time: f64, world: &World) {
        self.snapshots.insert(SimTime::new(time), world.clone());
    }

    fn get_state(&self, time: f64) -> Option<&World> {
        self.snapshots.get(&SimTime(time))
    }

    fn get_nearest_before(&self, time: f64) -> Option<(f64, &World)> {
        self.snapshots
            .range(..=SimTime(time))
            .next_back()
            .map(|(t, w)| (t.0, w))
    }

    fn clear_after(&mut self, time: f64) {
        let mut later = self.snapshots.split_off(&SimTime(time));
        if let Some((key, at)) = later.remove_entry(&SimTime(time)) {
            self.snapshots.insert(key, at);
        }
    }

    fn clear(&mut self) {
        self.snapshots.clear();
    }

    fn len(&self) -> usize {
        self.snapshots.len()
    }

    fn times(&self) -> Vec<f64> {
        self.snapshots.keys().map(|t| t.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_get() {
        let mut store = SnapshotStore::new();
        let world = World::new();
        store.save_state(0.0, &world);
        store.save_state(0.5, &world);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_state(0.5), Some(&world));
        assert!(store.get_state(0.25).is_none());
        assert_eq!(store.time_range(), Some((0.0, 0.5)));
    }

    #[test]
    fn test_nearest_before() {
        let mut store = SnapshotStore::new();
        let world = World::new();
        for t in [0.0, 1.0, 2.0] {
            store.save_state(t, &world);
        }

        assert_eq!(store.get_nearest_before(1.5).map(|(t, _)| t), Some(1.0));
        assert_eq!(store.get_nearest_before(2.0).map(|(t, _)| t), Some(2.0));
        assert_eq!(store.get_nearest_before(9.0).map(|(t, _)| t), Some(2.0));
        assert!(store.get_nearest_before(-0.1).is_none());
    }

    #[test]
    fn test_clear_after_keeps_boundary() {
        let mut store = SnapshotStore::new();
        let world = World::new();
        for t in [0.0, 1.0, 2.0, 3.0] {
            store.save_state(t, &world);
        }
        store.clear_after(1.0);
        assert_eq!(store.times(), vec![0.0, 1.0]);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut store = SnapshotStore::new();
        let mut world = World::new();
        store.save_state(0.0, &world);
        world.reset(World::with_seed(5));
        assert_ne!(store.get_state(0.0), Some(&world));
    }

    #[test]
    fn test_sim_time_order() {
        assert!(SimTime(-1.0) < SimTime(0.0));
        assert_eq!(SimTime(0.25), SimTime(0.25));
        assert_eq!(SimTime(-0.0), SimTime(0.0));
        assert!(SimTime::new(-0.0).0.is_sign_positive());
    }

    #[test]
    fn test_negative_zero_finds_baseline() {
        let mut store = SnapshotStore::new();
        let world = World::new();
        store.save_state(-0.0, &world);
        assert_eq!(store.times(), vec![0.0]);
        assert!(store.times()[0].is_sign_positive());

        store.save_state(0.0, &world);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_state(-0.0), Some(&world));
        assert_eq!(store.get_nearest_before(-0.0).map(|(t, _)| t), Some(0.0));
    }
}
