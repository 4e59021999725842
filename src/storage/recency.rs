// Recency-ordered index used by the memory provider for LRU eviction
// Nodes live in a slot arena and link to each other by slot index

use std::collections::HashMap;

#[derive(Debug)]
struct Node<T> {
    key: String,
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Keyed doubly linked list, most recent at the head.
///
/// Every index entry maps to exactly one live slot and every live slot is
/// reachable from `head`, so touch, insert and removal are all O(1).
#[derive(Debug)]
pub struct RecencyList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecencyList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        let slot = *self.index.get(key)?;
        self.node(slot).map(|n| &n.value)
    }

    /// Mutable access without changing recency
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let slot = *self.index.get(key)?;
        self.node_mut(slot).map(|n| &mut n.value)
    }

    /// Move `key` to the head and hand back its value for updating
    pub fn touch(&mut self, key: &str) -> Option<&mut T> {
        let slot = *self.index.get(key)?;
        self.unlink(slot);
        self.link_front(slot);
        self.node_mut(slot).map(|n| &mut n.value)
    }

    /// Insert at the head. An existing entry under `key` is replaced.
    pub fn push_front(&mut self, key: String, value: T) {
        if self.contains(&key) {
            self.remove(&key);
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        self.index.insert(key, slot);
        self.link_front(slot);
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        let node = self.slots[slot].take()?;
        self.free.push(slot);
        Some(node.value)
    }

    /// Re-key an entry without moving it. Any entry already under
    /// `new_key` is dropped first. Returns false if `old_key` is absent.
    pub fn rename(&mut self, old_key: &str, new_key: &str) -> bool {
        if !self.contains(old_key) {
            return false;
        }
        if old_key == new_key {
            return true;
        }

        self.remove(new_key);

        let Some(slot) = self.index.remove(old_key) else {
            return false;
        };
        if let Some(node) = self.node_mut(slot) {
            node.key = new_key.to_string();
        }
        self.index.insert(new_key.to_string(), slot);
        true
    }

    /// Least recently touched entry
    pub fn back(&self) -> Option<(&str, &T)> {
        let node = self.node(self.tail?)?;
        Some((node.key.as_str(), &node.value))
    }

    pub fn pop_back(&mut self) -> Option<(String, T)> {
        let key = self.node(self.tail?)?.key.clone();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    pub fn keys(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Keys ordered from most to least recent
    pub fn keys_by_recency(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match self.node(slot) {
                Some(node) => {
                    keys.push(node.key.clone());
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    fn node(&self, slot: usize) -> Option<&Node<T>> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.node(slot) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(h) => {
                if let Some(node) = self.node_mut(h) {
                    node.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }

        self.head = Some(slot);
    }
}
