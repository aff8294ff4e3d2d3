//! # Capability Index
//!
//! Turns a sparse capability bitmap into a dense array of records.
//!
//! Dense indices are handed out in ascending id order, so index 0 is always the
//! lowest supported id. The reverse table covers the whole id domain of the
//! capability class, which keeps [`CapabilityIndex::lookup`] O(1).
//!
//! ```
//! use joycal::capability::{AxisKind, BitSet, CapabilityIndex};
//!
//! let mut axes = CapabilityIndex::<AxisKind>::new();
//! axes.discover(&BitSet::from_ids(64, [2, 5, 9]));
//!
//! assert_eq!(axes.len(), 3);
//! assert_eq!(axes.lookup(5), Some(1));
//! assert_eq!(axes.lookup(7), None);
//! assert_eq!(axes.id(2), Some(9));
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::{BitSet, CapabilityKind};

/// One discovered capability: its kernel id and its dense index in this session.
pub struct CapabilityRecord<K> {
    /// Kernel id, stable across sessions.
    pub id: u16,
    /// Position in the dense array, stable only within one session.
    pub index: usize,
    kind: PhantomData<K>,
}

impl<K> CapabilityRecord<K> {
    fn new(id: u16, index: usize) -> Self {
        Self {
            id,
            index,
            kind: PhantomData,
        }
    }
}

// Manual impls so the marker type does not need to implement these traits.
impl<K> Clone for CapabilityRecord<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for CapabilityRecord<K> {}

impl<K> PartialEq for CapabilityRecord<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.index == other.index
    }
}

impl<K> Eq for CapabilityRecord<K> {}

impl<K> fmt::Debug for CapabilityRecord<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRecord")
            .field("id", &self.id)
            .field("index", &self.index)
            .finish()
    }
}

/// Dense, ordered view over the capabilities of one class.
pub struct CapabilityIndex<K> {
    records: Vec<CapabilityRecord<K>>,
    by_id: Vec<Option<usize>>,
}

impl<K: CapabilityKind> CapabilityIndex<K> {
    /// Creates an empty index for the id domain of `K`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_id: vec![None; K::CLASS.domain()],
        }
    }

    /// Convenience constructor: new index populated from `bitmap`.
    #[must_use]
    pub fn from_bitmap(bitmap: &BitSet) -> Self {
        let mut index = Self::new();
        index.discover(bitmap);
        index
    }

    /// Populates the index from a capability bitmap.
    ///
    /// Returns `false` without touching anything when the index already holds
    /// records; the first successful discovery of a session wins.
    pub fn discover(&mut self, bitmap: &BitSet) -> bool {
        if !self.records.is_empty() {
            return false;
        }

        self.records.reserve_exact(bitmap.count_set());

        for id in bitmap.iter() {
            let Some(slot) = self.by_id.get_mut(id) else {
                // id beyond this class's domain
                continue;
            };
            let Ok(raw_id) = u16::try_from(id) else {
                continue;
            };

            let index = self.records.len();
            *slot = Some(index);
            self.records.push(CapabilityRecord::new(raw_id, index));
        }

        true
    }
}

impl<K> CapabilityIndex<K> {
    /// Dense index for `id`, or `None` when the device lacks it.
    #[must_use]
    pub fn lookup(&self, id: u16) -> Option<usize> {
        self.by_id.get(usize::from(id)).copied().flatten()
    }

    /// Returns whether the device exposes `id`.
    #[must_use]
    pub fn contains(&self, id: u16) -> bool {
        self.lookup(id).is_some()
    }

    /// Kernel id stored at dense `index`.
    #[must_use]
    pub fn id(&self, index: usize) -> Option<u16> {
        self.records.get(index).map(|r| r.id)
    }

    /// Record at dense `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CapabilityRecord<K>> {
        self.records.get(index)
    }

    /// All records in dense-index order.
    #[must_use]
    pub fn records(&self) -> &[CapabilityRecord<K>] {
        &self.records
    }

    /// Iterates records in dense-index (ascending id) order.
    pub fn iter(&self) -> std::slice::Iter<'_, CapabilityRecord<K>> {
        self.records.iter()
    }

    /// Number of discovered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<K: CapabilityKind> Default for CapabilityIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for CapabilityIndex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.records.iter().map(|r| (r.index, r.id)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AxisKind, ButtonKind, EffectKind, ABS_CNT, KEY_CNT};

    #[test]
    fn test_discover_assigns_dense_indices_in_id_order() {
        let mut axes = CapabilityIndex::<AxisKind>::new();
        assert!(axes.discover(&BitSet::from_ids(ABS_CNT, [9, 2, 5])));

        let pairs: Vec<_> = axes.iter().map(|r| (r.index, r.id)).collect();
        assert_eq!(pairs, vec![(0, 2), (1, 5), (2, 9)]);
    }

    #[test]
    fn test_lookup_distinguishes_absent_from_index_zero() {
        let axes = CapabilityIndex::<AxisKind>::from_bitmap(&BitSet::from_ids(ABS_CNT, [2, 5, 9]));

        assert_eq!(axes.lookup(2), Some(0));
        assert_eq!(axes.lookup(5), Some(1));
        assert_eq!(axes.lookup(9), Some(2));
        assert_eq!(axes.lookup(0), None);
        assert_eq!(axes.lookup(7), None);
    }

    #[test]
    fn test_lookup_outside_domain() {
        let axes = CapabilityIndex::<AxisKind>::from_bitmap(&BitSet::from_ids(ABS_CNT, [0]));
        assert_eq!(axes.lookup(64), None);
        assert_eq!(axes.lookup(u16::MAX), None);
    }

    #[test]
    fn test_second_discover_is_ignored() {
        let mut axes = CapabilityIndex::<AxisKind>::new();
        axes.discover(&BitSet::from_ids(ABS_CNT, [0, 1]));

        assert!(!axes.discover(&BitSet::from_ids(ABS_CNT, [3, 4, 5])));
        assert_eq!(axes.len(), 2);
        assert_eq!(axes.lookup(3), None);
        assert_eq!(axes.lookup(1), Some(1));
    }

    #[test]
    fn test_discover_empty_bitmap() {
        let mut effects = CapabilityIndex::<EffectKind>::new();
        effects.discover(&BitSet::new(128));

        assert!(effects.is_empty());
        assert_eq!(effects.id(0), None);
        assert!(effects.get(0).is_none());
    }

    #[test]
    fn test_bitmap_wider_than_domain_is_clamped() {
        // Stray bits past ABS_CNT must not panic or create records
        let mut axes = CapabilityIndex::<AxisKind>::new();
        axes.discover(&BitSet::from_ids(KEY_CNT, [1, 63, 64, 700]));

        assert_eq!(axes.len(), 2);
        assert_eq!(axes.id(1), Some(63));
    }

    #[test]
    fn test_button_domain() {
        // BTN_SOUTH, BTN_EAST, BTN_TRIGGER_HAPPY1
        let buttons =
            CapabilityIndex::<ButtonKind>::from_bitmap(&BitSet::from_ids(KEY_CNT, [0x2c0, 0x130, 0x131]));

        assert_eq!(buttons.records().len(), 3);
        assert_eq!(buttons.lookup(0x130), Some(0));
        assert_eq!(buttons.lookup(0x2c0), Some(2));
        assert!(buttons.contains(0x131));
        assert!(!buttons.contains(0x132));
    }

    #[test]
    fn test_records_are_consistent_with_lookup() {
        let ids = [0usize, 1, 2, 16, 17, 40, 63];
        let axes = CapabilityIndex::<AxisKind>::from_bitmap(&BitSet::from_ids(ABS_CNT, ids));

        for record in axes.records() {
            assert_eq!(axes.lookup(record.id), Some(record.index));
            assert_eq!(axes.id(record.index), Some(record.id));
        }
    }
}
