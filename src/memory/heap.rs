//! Heap region bookkeeping
//!
//! Dynamic objects are carved downward from the end of the heap region and
//! tracked in a map keyed by address. They are created and destroyed only by
//! `new` and `delete`; nothing is reclaimed implicitly, which is what makes
//! leaks observable.

use super::object::ObjectId;
use super::value::Address;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct MemoryHeap {
    start: Address,
    end: Address,
    bottom: Address,
    objects: FxHashMap<Address, ObjectId>,
}

impl MemoryHeap {
    pub fn new(start: Address, end: Address) -> Self {
        MemoryHeap {
            start,
            end,
            bottom: end,
            objects: FxHashMap::default(),
        }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    /// Lowest address handed out so far
    pub fn bottom(&self) -> Address {
        self.bottom
    }

    /// Reserve `size` bytes below the current bottom
    pub(crate) fn reserve(&mut self, size: usize) -> Option<Address> {
        let size = size.max(1) as Address;
        if self.bottom < self.start + size {
            return None;
        }
        self.bottom -= size;
        Some(self.bottom)
    }

    pub(crate) fn insert(&mut self, address: Address, object: ObjectId) {
        self.objects.insert(address, object);
    }

    pub(crate) fn remove(&mut self, address: Address) -> Option<ObjectId> {
        self.objects.remove(&address)
    }

    pub fn object_at(&self, address: Address) -> Option<ObjectId> {
        self.objects.get(&address).copied()
    }

    /// Live heap objects, lowest address first
    pub fn objects(&self) -> Vec<ObjectId> {
        let mut entries: Vec<(Address, ObjectId)> =
            self.objects.iter().map(|(a, o)| (*a, *o)).collect();
        entries.sort();
        entries.into_iter().map(|(_, o)| o).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_downward() {
        let mut heap = MemoryHeap::new(1000, 1100);
        assert_eq!(heap.reserve(4), Some(1096));
        assert_eq!(heap.reserve(8), Some(1088));
        assert_eq!(heap.bottom(), 1088);
    }

    #[test]
    fn test_exhaustion() {
        let mut heap = MemoryHeap::new(1000, 1010);
        assert!(heap.reserve(8).is_some());
        assert!(heap.reserve(8).is_none());
    }

    #[test]
    fn test_objects_sorted_by_address() {
        let mut heap = MemoryHeap::new(0, 100);
        heap.insert(50, ObjectId(2));
        heap.insert(10, ObjectId(7));
        assert_eq!(heap.objects(), vec![ObjectId(7), ObjectId(2)]);
        assert_eq!(heap.remove(10), Some(ObjectId(7)));
        assert_eq!(heap.len(), 1);
    }
}
