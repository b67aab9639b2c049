//! Capacity-bounded recency cache.
//!
//! Entries live in an arena of slots; the recency list links slots by index
//! (`prev` points towards the most recently used end, `next` towards the least
//! recently used end). A hash index maps keys to slots, so `get`, `put` and
//! `remove` are O(1). The cache knows nothing about what it stores: deciding
//! which entries may be evicted is left to the caller.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct LruCache<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    /// Most recently used.
    head: usize,
    /// Least recently used.
    tail: usize,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// Insert or replace `key`, making it most recently used. Returns the
    /// previous value. Never evicts: the cache may grow past its capacity.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.index.get(&key) {
            self.move_to_front(idx);
            return self.slots[idx]
                .as_mut()
                .map(|node| std::mem::replace(&mut node.value, value));
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slots[idx].take().map(|node| node.value)
    }

    /// Remove and return the least recently used entry whose value satisfies
    /// `evictable`. Leaves the cache untouched if no entry qualifies.
    pub fn evict_where<F>(&mut self, mut evictable: F) -> Option<(K, V)>
    where
        F: FnMut(&V) -> bool,
    {
        let mut idx = self.tail;
        while idx != NIL {
            let node = self.slots[idx].as_ref()?;
            if evictable(&node.value) {
                let key = node.key.clone();
                let value = self.remove(&key)?;
                return Some((key, value));
            }
            idx = node.prev;
        }
        None
    }

    /// Entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head != NIL {
            if let Some(head) = self.slots[old_head].as_mut() {
                head.prev = idx;
            }
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if prev != NIL {
            if let Some(node) = self.slots[prev].as_mut() {
                node.next = next;
            }
        } else {
            self.head = next;
        }

        if next != NIL {
            if let Some(node) = self.slots[next].as_mut() {
                node.prev = prev;
            }
        } else {
            self.tail = prev;
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = NIL;
            node.next = NIL;
        }
    }
}

pub struct Iter<'a, K, V> {
    cache: &'a LruCache<K, V>,
    cursor: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let node = self.cache.slots[self.cursor].as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
