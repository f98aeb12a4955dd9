//! Node location indexes
//!
//! A [`LocationIndex`] maps node ids to [`Location`]s. Indexes are picked by
//! strategy name through [`create_map`], mirroring how storage is chosen on
//! the command line, or constructed directly and wrapped in a
//! [`LocationCache`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use butterfly_common::{Error, Location, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Strategy used when none is given explicitly
pub const DEFAULT_INDEX: &str = "flex_mem";

/// Storage for node locations
pub trait LocationIndex: Send + Sync {
    fn set(&mut self, id: i64, location: Location);

    fn get(&self, id: i64) -> Option<Location>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Registry name of the strategy
    fn name(&self) -> &'static str;
}

/// Hash map for arbitrary id distributions
#[derive(Default)]
pub struct FlexMemIndex {
    map: FxHashMap<i64, Location>,
}

impl LocationIndex for FlexMemIndex {
    fn set(&mut self, id: i64, location: Location) {
        self.map.insert(id, location);
    }

    fn get(&self, id: i64) -> Option<Location> {
        self.map.get(&id).copied()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn name(&self) -> &'static str {
        "flex_mem"
    }
}

/// Vector kept sorted by id.
///
/// Appending is O(1) when ids arrive in ascending order, which is the case
/// for sorted files where all nodes precede all ways.
#[derive(Default)]
pub struct SparseMemArray {
    entries: Vec<(i64, Location)>,
}

impl LocationIndex for SparseMemArray {
    fn set(&mut self, id: i64, location: Location) {
        let append = self.entries.last().map_or(true, |(last, _)| *last < id);
        if append {
            self.entries.push((id, location));
            return;
        }
        match self.entries.binary_search_by_key(&id, |(k, _)| *k) {
            Ok(pos) => self.entries[pos].1 = location,
            Err(pos) => self.entries.insert(pos, (id, location)),
        }
    }

    fn get(&self, id: i64) -> Option<Location> {
        self.entries
            .binary_search_by_key(&id, |(k, _)| *k)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn name(&self) -> &'static str {
        "sparse_mem_array"
    }
}

/// Largest id stored in the dense part of [`DenseMemArray`]
pub const DENSE_ID_LIMIT: i64 = 1 << 28;

/// Vector indexed directly by node id.
///
/// Negative ids and ids at or above [`DENSE_ID_LIMIT`] are kept in a side
/// map so a single outlier cannot force a huge allocation.
#[derive(Default)]
pub struct DenseMemArray {
    slots: Vec<Location>,
    overflow: FxHashMap<i64, Location>,
    count: usize,
}

impl DenseMemArray {
    fn slot(id: i64) -> Option<usize> {
        if (0..DENSE_ID_LIMIT).contains(&id) {
            usize::try_from(id).ok()
        } else {
            None
        }
    }
}

impl LocationIndex for DenseMemArray {
    fn set(&mut self, id: i64, location: Location) {
        let Some(slot) = Self::slot(id) else {
            if self.overflow.insert(id, location).is_none() {
                self.count += 1;
            }
            return;
        };
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, Location::UNDEFINED);
        }
        if !self.slots[slot].is_defined() {
            self.count += 1;
        }
        self.slots[slot] = location;
    }

    fn get(&self, id: i64) -> Option<Location> {
        match Self::slot(id) {
            Some(slot) => self.slots.get(slot).copied().filter(Location::is_defined),
            None => self.overflow.get(&id).copied(),
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.overflow.clear();
        self.count = 0;
    }

    fn name(&self) -> &'static str {
        "dense_mem_array"
    }
}

/// Ordered map, useful when lookups need deterministic iteration
#[derive(Default)]
pub struct SparseMemMap {
    map: BTreeMap<i64, Location>,
}

impl LocationIndex for SparseMemMap {
    fn set(&mut self, id: i64, location: Location) {
        self.map.insert(id, location);
    }

    fn get(&self, id: i64) -> Option<Location> {
        self.map.get(&id).copied()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn name(&self) -> &'static str {
        "sparse_mem_map"
    }
}

type IndexConstructor = fn() -> Box<dyn LocationIndex>;

const REGISTRY: &[(&str, IndexConstructor)] = &[
    ("flex_mem", || Box::new(FlexMemIndex::default()) as Box<dyn LocationIndex>),
    ("sparse_mem_array", || Box::new(SparseMemArray::default()) as Box<dyn LocationIndex>),
    ("dense_mem_array", || Box::new(DenseMemArray::default()) as Box<dyn LocationIndex>),
    ("sparse_mem_map", || Box::new(SparseMemMap::default()) as Box<dyn LocationIndex>),
];

/// Names accepted by [`create_map`]
pub fn available_maps() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Create an empty index by strategy name
pub fn create_map(name: &str) -> Result<Box<dyn LocationIndex>> {
    REGISTRY
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, build)| build())
        .ok_or_else(|| Error::UnknownIndex {
            name: name.to_string(),
            available: available_maps(),
        })
}

/// Shared handle on a location index.
///
/// Clones refer to the same index, so a caller can keep a handle for
/// lookups while a processor fills it.
#[derive(Clone)]
pub struct LocationCache {
    inner: Arc<RwLock<Box<dyn LocationIndex>>>,
}

impl LocationCache {
    pub fn new(index: Box<dyn LocationIndex>) -> Self {
        LocationCache {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        create_map(name).map(LocationCache::new)
    }

    pub fn set(&self, id: i64, location: Location) {
        self.inner.write().set(id, location);
    }

    pub fn get(&self, id: i64) -> Option<Location> {
        self.inner.read().get(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn name(&self) -> &'static str {
        self.inner.read().name()
    }

    /// Run `f` with the index write-locked once, for bulk updates
    pub fn with_index<T>(&self, f: impl FnOnce(&mut dyn LocationIndex) -> T) -> T {
        let mut guard = self.inner.write();
        f(guard.as_mut())
    }

    /// Whether two handles share the same index
    pub fn same_index(&self, other: &LocationCache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        LocationCache::new(Box::<FlexMemIndex>::default())
    }
}

impl fmt::Debug for LocationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.inner.read();
        f.debug_struct("LocationCache")
            .field("index", &index.name())
            .field("len", &index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(v: i32) -> Location {
        Location::from_fixed(v, -v)
    }

    #[test]
    fn test_all_strategies_behave_alike() {
        for name in available_maps() {
            let mut index = create_map(name).unwrap();
            assert_eq!(index.name(), name);
            assert!(index.is_empty());

            index.set(10, loc(1));
            index.set(3, loc(2));
            index.set(-7, loc(3));
            index.set(10, loc(4));

            assert_eq!(index.get(10), Some(loc(4)), "{name}");
            assert_eq!(index.get(3), Some(loc(2)), "{name}");
            assert_eq!(index.get(-7), Some(loc(3)), "{name}");
            assert_eq!(index.get(4), None, "{name}");
            assert_eq!(index.len(), 3, "{name}");

            index.clear();
            assert_eq!(index.get(10), None, "{name}");
            assert!(index.is_empty(), "{name}");
        }
    }

    #[test]
    fn test_sparse_array_sorted_input() {
        let mut index = SparseMemArray::default();
        for id in 1..=100 {
            index.set(id, loc(id as i32));
        }
        index.set(50, loc(-1));
        index.set(0, loc(0));
        assert_eq!(index.get(57), Some(loc(57)));
        assert_eq!(index.get(50), Some(loc(-1)));
        assert_eq!(index.get(0), Some(loc(0)));
        assert_eq!(index.len(), 101);
    }

    #[test]
    fn test_dense_array_keeps_large_ids_aside() {
        let mut index = DenseMemArray::default();
        index.set(5, loc(5));
        index.set(12_000_000_000, loc(6));
        index.set(i64::MAX, loc(7));
        index.set(DENSE_ID_LIMIT, loc(8));
        assert!(index.slots.len() <= 6);
        assert_eq!(index.get(12_000_000_000), Some(loc(6)));
        assert_eq!(index.get(i64::MAX), Some(loc(7)));
        assert_eq!(index.get(DENSE_ID_LIMIT), Some(loc(8)));
        assert_eq!(index.get(DENSE_ID_LIMIT - 1), None);
        assert_eq!(index.len(), 4);

        index.set(i64::MAX, loc(9));
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(i64::MAX), Some(loc(9)));
    }

    #[test]
    fn test_unknown_strategy() {
        match create_map("mmap_magic") {
            Err(Error::UnknownIndex { name, available }) => {
                assert_eq!(name, "mmap_magic");
                assert!(available.contains(&DEFAULT_INDEX));
            }
            _ => panic!("expected UnknownIndex"),
        }
    }

    #[test]
    fn test_cache_handles_share_state() {
        let cache = LocationCache::by_name("sparse_mem_map").unwrap();
        let other = cache.clone();
        other.set(5, loc(5));
        assert_eq!(cache.get(5), Some(loc(5)));
        assert!(cache.same_index(&other));
        assert!(!cache.same_index(&LocationCache::default()));
        assert_eq!(cache.name(), "sparse_mem_map");
    }
}
