//! Probabilistic skip list ordered by internal-key comparison.
//!
//! The list is the storage structure behind the memtable: an ordered map
//! from encoded internal keys to value payloads. Nodes live in an arena
//! (`Vec` of nodes addressed by index), so the structure contains no
//! `unsafe` and no raw pointers; the head is a sentinel at index 0.
//!
//! Tower heights are drawn with branch probability 0.5 up to a maximum of
//! 12 levels.
//!
//! # Concurrency
//!
//! Single writer, many readers: all state sits behind an `RwLock`. `put`
//! takes the write lock; `get` / `find_greater_or_equal` take the read
//! lock briefly; a [`SkipListIter`] holds the read guard for its entire
//! lifetime, so an iteration observes one consistent snapshot (and blocks
//! the writer — iterations are expected to be short or to run on frozen
//! lists where no writer exists).


use std::cmp::Ordering;
use std::sync::{RwLock, RwLockReadGuard};

use rand::Rng;

use crate::key;

/// Maximum tower height.
pub const MAX_HEIGHT: usize = 12;

/// Probability that a node's tower grows one more level.
const BRANCH_PROBABILITY: f64 = 0.5;

/// Sentinel "null" node index.
const NIL: usize = usize::MAX;

struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    /// `next[h]` is the successor at level `h`; NIL terminates.
    next: Vec<usize>,
}

struct Core {
    /// Arena of nodes; index 0 is the head sentinel (empty key, full tower).
    nodes: Vec<Node>,
    /// Current tallest tower among real nodes.
    height: usize,
    len: usize,
}

impl Core {
    /// Index of the first node whose key is ≥ `target`, or NIL.
    fn find_greater_or_equal(&self, target: &[u8]) -> usize {
        let mut node = 0; // head
        let mut level = self.height;
        loop {
            let next = self.nodes[node].next[level];
            if next != NIL && key::compare(&self.nodes[next].key, target) == Ordering::Less {
                node = next;
            } else if level == 0 {
                return next;
            } else {
                level -= 1;
            }
        }
    }

    /// Like `find_greater_or_equal`, but records the rightmost node before
    /// the target at every level (the splice points for an insert).
    fn find_splice(&self, target: &[u8], splice: &mut [usize; MAX_HEIGHT]) -> usize {
        let mut node = 0;
        let mut level = self.height;
        loop {
            let next = self.nodes[node].next[level];
            if next != NIL && key::compare(&self.nodes[next].key, target) == Ordering::Less {
                node = next;
            } else {
                splice[level] = node;
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }
}

/// Concurrent ordered map keyed by encoded internal keys.
pub struct SkipList {
    inner: RwLock<Core>,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    /// Creates an empty list.
    pub fn new() -> Self {
        let head = Node {
            key: Vec::new(),
            value: Vec::new(),
            next: vec![NIL; MAX_HEIGHT],
        };
        Self {
            inner: RwLock::new(Core {
                nodes: vec![head],
                height: 0,
                len: 0,
            }),
        }
    }

    fn random_height() -> usize {
        let mut rng = rand::thread_rng();
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_bool(BRANCH_PROBABILITY) {
            height += 1;
        }
        height
    }

    /// Inserts a new entry. Existing entries are never replaced in place —
    /// the internal-key encoding makes every version a distinct key.
    pub fn put(&self, key_bytes: Vec<u8>, value: Vec<u8>) {
        let mut core = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let mut splice = [0usize; MAX_HEIGHT];
        core.find_splice(&key_bytes, &mut splice);

        // Levels above the old height keep their zero splice slot, which is
        // exactly the head sentinel.
        let height = Self::random_height();
        core.height = core.height.max(height - 1);

        let new_index = core.nodes.len();
        let mut next = Vec::with_capacity(height);
        for (level, &prev) in splice.iter().enumerate().take(height) {
            next.push(core.nodes[prev].next[level]);
        }
        core.nodes.push(Node {
            key: key_bytes,
            value,
            next,
        });
        for (level, &prev) in splice.iter().enumerate().take(height) {
            core.nodes[prev].next[level] = new_index;
        }
        core.len += 1;
    }

    /// Exact-match lookup under the internal-key comparator.
    pub fn get(&self, target: &[u8]) -> Option<Vec<u8>> {
        let core = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let idx = core.find_greater_or_equal(target);
        if idx != NIL && key::compare(&core.nodes[idx].key, target) == Ordering::Equal {
            Some(core.nodes[idx].value.clone())
        } else {
            None
        }
    }

    /// Returns the smallest entry whose key is ≥ `target`, as owned bytes.
    pub fn find_greater_or_equal(&self, target: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let core = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let idx = core.find_greater_or_equal(target);
        if idx == NIL {
            None
        } else {
            let node = &core.nodes[idx];
            Some((node.key.clone(), node.value.clone()))
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len
    }

    /// True when the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a cursor over the list. The cursor pins the read lock for its
    /// lifetime, giving the iteration a consistent snapshot.
    pub fn iter(&self) -> SkipListIter<'_> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let first = guard.nodes[0].next[0];
        SkipListIter {
            guard,
            current: first,
        }
    }
}

/// Cursor over a [`SkipList`] snapshot, in ascending internal-key order.
pub struct SkipListIter<'a> {
    guard: RwLockReadGuard<'a, Core>,
    current: usize,
}

impl SkipListIter<'_> {
    /// True while the cursor points at an entry.
    pub fn valid(&self) -> bool {
        self.current != NIL
    }

    /// Key at the cursor. Panics if not [`valid`](Self::valid).
    pub fn key(&self) -> &[u8] {
        &self.guard.nodes[self.current].key
    }

    /// Value at the cursor. Panics if not [`valid`](Self::valid).
    pub fn value(&self) -> &[u8] {
        &self.guard.nodes[self.current].value
    }

    /// Advances to the next entry.
    pub fn advance(&mut self) {
        if self.current != NIL {
            self.current = self.guard.nodes[self.current].next[0];
        }
    }

    /// Repositions at the first entry whose key is ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.current = self.guard.find_greater_or_equal(target);
    }

    /// Repositions at the first entry.
    pub fn seek_to_first(&mut self) {
        self.current = self.guard.nodes[0].next[0];
    }
}

impl Iterator for SkipListIter<'_> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }
        let node = &self.guard.nodes[self.current];
        let item = (node.key.clone(), node.value.clone());
        self.current = node.next[0];
        Some(item)
    }
}
