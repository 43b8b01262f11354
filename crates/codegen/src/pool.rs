//! Page-backed pools for IR nodes.
//!
//! Instructions and basic blocks are allocated out of [`Pool`]s owned by the
//! builder and referenced everywhere else by their entity number. Pages are
//! never freed or moved once allocated, so a slot's address is stable for the
//! lifetime of one function, and `reset` makes the whole pool reusable for
//! the next function without returning memory to the allocator.

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use cranelift_entity::EntityRef;

/// Number of elements per page.
const PAGE_SIZE: usize = 128;

/// A growable arena of `V` elements keyed by the entity type `K`.
///
/// Elements are zero-initialized (`V::default()`) on allocation and again on
/// `reset`, so no element ever observes state from a previous function.
pub struct Pool<K, V> {
    pages: Vec<Box<[V]>>,
    len: usize,
    unused: PhantomData<K>,
}

impl<K, V> Pool<K, V>
where
    K: EntityRef,
    V: Default,
{
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            len: 0,
            unused: PhantomData,
        }
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the pool empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate the next element and return its key.
    ///
    /// The element starts out as `V::default()`.
    pub fn allocate(&mut self) -> K {
        let index = self.len;
        if index == self.pages.len() * PAGE_SIZE {
            let page: Box<[V]> = (0..PAGE_SIZE).map(|_| V::default()).collect();
            self.pages.push(page);
        }
        self.len += 1;
        K::new(index)
    }

    /// Does `k` refer to a live allocation?
    pub fn is_valid(&self, k: K) -> bool {
        k.index() < self.len
    }

    /// Get the element for `k`, if it is live.
    pub fn get(&self, k: K) -> Option<&V> {
        if self.is_valid(k) {
            Some(&self.pages[k.index() / PAGE_SIZE][k.index() % PAGE_SIZE])
        } else {
            None
        }
    }

    /// Iterate over the keys of all live allocations, in allocation order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = K> + use<K, V> {
        (0..self.len).map(K::new)
    }

    /// Rewind the pool to empty, retaining pages for reuse.
    ///
    /// Every previously allocated slot is restored to `V::default()` so that
    /// references held by elements (entity lists, maps) are dropped now
    /// rather than surviving into the next function.
    pub fn reset(&mut self) {
        for index in 0..self.len {
            self.pages[index / PAGE_SIZE][index % PAGE_SIZE] = V::default();
        }
        self.len = 0;
    }
}

impl<K, V> Index<K> for Pool<K, V>
where
    K: EntityRef,
    V: Default,
{
    type Output = V;

    fn index(&self, k: K) -> &V {
        assert!(self.is_valid(k), "pool index out of bounds");
        &self.pages[k.index() / PAGE_SIZE][k.index() % PAGE_SIZE]
    }
}

impl<K, V> IndexMut<K> for Pool<K, V>
where
    K: EntityRef,
    V: Default,
{
    fn index_mut(&mut self, k: K) -> &mut V {
        assert!(self.is_valid(k), "pool index out of bounds");
        &mut self.pages[k.index() / PAGE_SIZE][k.index() % PAGE_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::entity_impl;

    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct Thing(u32);
    entity_impl!(Thing, "thing");

    #[test]
    fn allocation_crosses_pages() {
        let mut pool: Pool<Thing, u64> = Pool::new();
        let keys: Vec<Thing> = (0..PAGE_SIZE * 2 + 3).map(|_| pool.allocate()).collect();
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(k.index(), i);
            assert_eq!(pool[*k], 0);
        }
        pool[keys[PAGE_SIZE]] = 7;
        assert_eq!(pool[keys[PAGE_SIZE]], 7);
        assert_eq!(pool.len(), PAGE_SIZE * 2 + 3);
    }

    #[test]
    fn reset_reissues_same_keys_zeroed() {
        let mut pool: Pool<Thing, u64> = Pool::new();
        let before: Vec<Thing> = (0..200).map(|_| pool.allocate()).collect();
        for &k in &before {
            pool[k] = k.index() as u64 + 1;
        }
        pool.reset();
        assert!(pool.is_empty());
        let after: Vec<Thing> = (0..200).map(|_| pool.allocate()).collect();
        assert_eq!(before, after);
        assert!(after.iter().all(|&k| pool[k] == 0));
    }

    #[test]
    fn get_rejects_stale_keys() {
        let mut pool: Pool<Thing, u64> = Pool::new();
        let k = pool.allocate();
        assert!(pool.get(k).is_some());
        pool.reset();
        assert!(pool.get(k).is_none());
    }
}
