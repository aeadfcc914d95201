//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

/// Null link marker.
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K> {
    /// None while the slot sits on the free list
    key: Option<K>,
    prev: usize,
    next: usize,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys live in an arena of index-linked nodes where:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// `push_front` hands back a node handle that the owner stores next to its
/// value, so `touch` and `remove` never have to search the list.
#[derive(Debug)]
pub struct LruTracker<K> {
    nodes: Vec<Node<K>>,
    head: usize,
    tail: usize,
    free: Vec<usize>,
}

impl<K> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LruTracker<K> {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
        }
    }

    // == Push Front ==
    /// Adds a key as the most recently used and returns its node handle.
    pub fn push_front(&mut self, key: K) -> usize {
        let node = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Node {
                    key: Some(key),
                    prev: NIL,
                    next: NIL,
                };
                idx
            }
            None => {
                self.nodes.push(Node {
                    key: Some(key),
                    prev: NIL,
                    next: NIL,
                });
                self.nodes.len() - 1
            }
        };
        self.link_front(node);
        node
    }

    // == Touch ==
    /// Marks a node as recently used (moves to front).
    pub fn touch(&mut self, node: usize) {
        if !self.is_live(node) || self.head == node {
            return;
        }
        self.unlink(node);
        self.link_front(node);
    }

    // == Remove ==
    /// Removes a node from the tracker, returning its key.
    pub fn remove(&mut self, node: usize) -> Option<K> {
        if !self.is_live(node) {
            return None;
        }
        self.unlink(node);
        self.free.push(node);
        self.nodes[node].key.take()
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn pop_back(&mut self) -> Option<K> {
        if self.tail == NIL {
            return None;
        }
        self.remove(self.tail)
    }

    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            tracker: self,
            current: self.head,
        }
    }

    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn is_live(&self, node: usize) -> bool {
        self.nodes.get(node).is_some_and(|n| n.key.is_some())
    }

    fn link_front(&mut self, node: usize) {
        self.nodes[node].prev = NIL;
        self.nodes[node].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = node;
        }
        self.head = node;
        if self.tail == NIL {
            self.tail = node;
        }
    }

    fn unlink(&mut self, node: usize) {
        let (prev, next) = (self.nodes[node].prev, self.nodes[node].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.nodes[node].prev = NIL;
        self.nodes[node].next = NIL;
    }
}

/// MRU-first iterator over tracked keys.
pub struct Iter<'a, K> {
    tracker: &'a LruTracker<K>,
    current: usize,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current != NIL {
            let node = &self.tracker.nodes[self.current];
            self.current = node.next;
            if let Some(key) = node.key.as_ref() {
                return Some(key);
            }
        }
        None
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn order(lru: &LruTracker<&'static str>) -> Vec<&'static str> {
        lru.iter().copied().collect()
    }

    #[test]
    fn test_lru_new() {
        let mut lru: LruTracker<String> = LruTracker::new();
        assert_eq!(lru.iter().count(), 0);
        assert_eq!(lru.pop_back(), None);
    }

    #[test]
    fn test_lru_push_front_orders_newest_first() {
        let mut lru = LruTracker::new();

        lru.push_front("key1");
        lru.push_front("key2");
        lru.push_front("key3");

        assert_eq!(order(&lru), vec!["key3", "key2", "key1"]);
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruTracker::new();

        let key1 = lru.push_front("key1");
        lru.push_front("key2");
        lru.push_front("key3");

        lru.touch(key1);

        assert_eq!(order(&lru), vec!["key1", "key3", "key2"]);
    }

    #[test]
    fn test_lru_pop_back() {
        let mut lru = LruTracker::new();

        lru.push_front("key1");
        lru.push_front("key2");
        lru.push_front("key3");

        assert_eq!(lru.pop_back(), Some("key1"));
        assert_eq!(order(&lru), vec!["key3", "key2"]);
        assert_eq!(lru.pop_back(), Some("key2"));
        assert_eq!(lru.pop_back(), Some("key3"));
        assert_eq!(lru.pop_back(), None);
        assert_eq!(order(&lru), Vec::<&str>::new());
    }

    #[test]
    fn test_lru_remove_middle() {
        let mut lru = LruTracker::new();

        lru.push_front("key1");
        let key2 = lru.push_front("key2");
        lru.push_front("key3");

        assert_eq!(lru.remove(key2), Some("key2"));
        assert_eq!(order(&lru), vec!["key3", "key1"]);

        // Stale handle is ignored
        assert_eq!(lru.remove(key2), None);
        lru.touch(key2);
        assert_eq!(order(&lru), vec!["key3", "key1"]);
    }

    #[test]
    fn test_lru_reuses_freed_slots() {
        let mut lru = LruTracker::new();

        let a = lru.push_front("a");
        lru.push_front("b");
        lru.remove(a);
        let c = lru.push_front("c");

        assert_eq!(a, c);
        assert_eq!(order(&lru), vec!["c", "b"]);
    }

    #[test]
    fn test_lru_order_after_multiple_touches() {
        let mut lru = LruTracker::new();

        let a = lru.push_front("a");
        let b = lru.push_front("b");
        let c = lru.push_front("c");

        // [c, b, a] -> touch a -> [a, c, b] -> touch c -> [c, a, b] -> touch b -> [b, c, a]
        lru.touch(a);
        lru.touch(c);
        lru.touch(b);

        assert_eq!(lru.pop_back(), Some("a"));
        assert_eq!(lru.pop_back(), Some("c"));
        assert_eq!(lru.pop_back(), Some("b"));
    }

    #[test]
    fn test_lru_clear() {
        let mut lru = LruTracker::new();
        lru.push_front(1);
        lru.push_front(2);

        lru.clear();

        assert_eq!(lru.iter().count(), 0);
        lru.push_front(3);
        assert_eq!(lru.pop_back(), Some(3));
    }
}
