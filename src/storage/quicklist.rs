//! Quicklist: a doubly linked list of listpack nodes
//!
//! Balances large-list traversal cost against per-element overhead. Nodes
//! live in an arena and link through index fields rather than pointers;
//! splits and merges touch only the three indices around the mutated node.

use super::listpack::Listpack;

/// A node splits once a mutation pushes it above this many entries
const SPLIT_THRESHOLD: usize = 10;

/// A node below this many entries tries to merge with a neighbour
const MERGE_THRESHOLD: usize = 3;

#[derive(Debug, Clone)]
struct Node {
    lp: Listpack,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    fn new() -> Self {
        Node {
            lp: Listpack::new(),
            prev: None,
            next: None,
        }
    }

    fn count(&self) -> usize {
        self.lp.count()
    }
}

/// A list of byte strings stored as chained listpacks
#[derive(Debug, Clone)]
pub struct QuickList {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    size: usize,
}

impl QuickList {
    /// Create an empty quicklist with a single empty node
    pub fn new() -> Self {
        let mut ql = QuickList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: 0,
            tail: 0,
            size: 0,
        };
        let idx = ql.alloc(Node::new());
        ql.head = idx;
        ql.tail = idx;
        ql
    }

    /// Total number of elements, O(1)
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append values at the tail. Returns the new length.
    pub fn rpush(&mut self, values: &[Vec<u8>]) -> usize {
        for value in values {
            let tail = self.tail;
            self.node_mut(tail).lp.append_back(value);
            self.size += 1;
            if self.node(tail).count() > SPLIT_THRESHOLD {
                self.split_as_successor(tail);
            }
        }
        self.size
    }

    /// Prepend values at the head. Returns the new length.
    pub fn lpush(&mut self, values: &[Vec<u8>]) -> usize {
        for value in values {
            let head = self.head;
            self.node_mut(head).lp.append_front(value);
            self.size += 1;
            if self.node(head).count() > SPLIT_THRESHOLD {
                self.split_as_predecessor(head);
            }
        }
        self.size
    }

    /// Pop up to `count` values from the head
    pub fn lpop(&mut self, count: usize) -> Vec<Vec<u8>> {
        if self.size == 0 || count == 0 {
            return Vec::new();
        }
        let count = count.min(self.size);
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            let head = self.head;
            let available = self.node(head).count();
            if available == 0 {
                if !self.unlink_head() {
                    break;
                }
                continue;
            }

            let take = (count - out.len()).min(available);
            for _ in 0..take {
                if let Some(v) = self.node(head).lp.get(0).map(|v| v.to_vec()) {
                    out.push(v);
                }
                self.node_mut(head).lp.delete_at(0);
            }
            self.size -= take;

            if self.node(head).count() == 0 {
                self.unlink_head();
            } else if self.node(head).count() < MERGE_THRESHOLD {
                self.try_merge(head);
            }
        }

        out
    }

    /// Inclusive range with negative-index support: -1 is the last element
    pub fn lrange(&self, start: i64, end: i64) -> Vec<Vec<u8>> {
        if self.size == 0 {
            return Vec::new();
        }
        let len = self.size as i64;
        let mut start = if start < 0 { len + start } else { start };
        let mut end = if end < 0 { len + end } else { end };
        if start < 0 {
            start = 0;
        }
        if end >= len {
            end = len - 1;
        }
        if start > end {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((end - start + 1) as usize);
        // Seek from whichever end is closer; both scans yield the node and
        // the forward offset of the same element
        let found = if (start as usize) <= self.size / 2 {
            self.scan_forward(start as usize)
        } else {
            self.scan_backward(self.size - 1 - start as usize)
        };
        let (mut node_idx, mut offset) = match found {
            Some(found) => found,
            None => return Vec::new(),
        };
        let mut idx = start;

        loop {
            let node = self.node(node_idx);
            while offset < node.count() && idx <= end {
                if let Some(v) = node.lp.get(offset) {
                    out.push(v.to_vec());
                }
                idx += 1;
                offset += 1;
            }
            if idx > end {
                break;
            }
            match node.next {
                Some(next) => {
                    node_idx = next;
                    offset = 0;
                }
                None => break,
            }
        }
        out
    }

    /// All elements in order
    pub fn values(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size);
        let mut cursor = Some(self.head);
        while let Some(idx) = cursor {
            let node = self.node(idx);
            out.extend(node.lp.values());
            cursor = node.next;
        }
        out
    }

    /// Locate the node holding the element at `index` and the offset within
    /// that node's listpack
    fn scan_forward(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.size {
            return None;
        }
        let mut remaining = index;
        let mut cursor = Some(self.head);
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if remaining < node.count() {
                return Some((idx, remaining));
            }
            remaining -= node.count();
            cursor = node.next;
        }
        None
    }

    /// Symmetric scan from the tail: `index` counts from the last element,
    /// 0 being the tail. Returns the node and forward offset within it.
    fn scan_backward(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.size {
            return None;
        }
        let mut remaining = index;
        let mut cursor = Some(self.tail);
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if remaining < node.count() {
                return Some((idx, node.count() - 1 - remaining));
            }
            remaining -= node.count();
            cursor = node.prev;
        }
        None
    }

    /// Split an over-full node, moving the upper half into a new successor
    fn split_as_successor(&mut self, idx: usize) {
        let count = self.node(idx).count();
        if count <= SPLIT_THRESHOLD {
            return;
        }
        let mid = count / 2;
        let values = self.node(idx).lp.values();

        let new_idx = self.alloc(Node::new());
        for v in &values[mid..] {
            self.node_mut(new_idx).lp.append_back(v);
        }
        for i in (mid..count).rev() {
            self.node_mut(idx).lp.delete_at(i);
        }

        let old_next = self.node(idx).next;
        self.node_mut(new_idx).prev = Some(idx);
        self.node_mut(new_idx).next = old_next;
        self.node_mut(idx).next = Some(new_idx);
        match old_next {
            Some(next) => self.node_mut(next).prev = Some(new_idx),
            None => self.tail = new_idx,
        }
    }

    /// Split an over-full node, moving the lower half into a new predecessor
    fn split_as_predecessor(&mut self, idx: usize) {
        let count = self.node(idx).count();
        if count <= SPLIT_THRESHOLD {
            return;
        }
        let mid = count / 2;
        let values = self.node(idx).lp.values();

        let new_idx = self.alloc(Node::new());
        for v in &values[..mid] {
            self.node_mut(new_idx).lp.append_back(v);
        }
        for i in (0..mid).rev() {
            self.node_mut(idx).lp.delete_at(i);
        }

        let old_prev = self.node(idx).prev;
        self.node_mut(new_idx).next = Some(idx);
        self.node_mut(new_idx).prev = old_prev;
        self.node_mut(idx).prev = Some(new_idx);
        match old_prev {
            Some(prev) => self.node_mut(prev).next = Some(new_idx),
            None => self.head = new_idx,
        }
    }

    /// Merge a shrunken node with a neighbour when the combined count stays
    /// within the split threshold
    fn try_merge(&mut self, idx: usize) {
        let count = self.node(idx).count();

        if let Some(prev) = self.node(idx).prev {
            if count + self.node(prev).count() <= SPLIT_THRESHOLD {
                for v in self.node(idx).lp.values() {
                    self.node_mut(prev).lp.append_back(&v);
                }
                self.unlink(idx);
                return;
            }
        }
        if let Some(next) = self.node(idx).next {
            if count + self.node(next).count() <= SPLIT_THRESHOLD {
                for v in self.node(next).lp.values() {
                    self.node_mut(idx).lp.append_back(&v);
                }
                self.unlink(next);
            }
        }
    }

    /// Unlink the head node; keeps the last node alive so the list always
    /// has at least one. Returns false if there is nowhere to advance.
    fn unlink_head(&mut self) -> bool {
        let head = self.head;
        match self.node(head).next {
            Some(next) => {
                self.node_mut(next).prev = None;
                self.head = next;
                self.release(head);
                true
            }
            None => false,
        }
    }

    /// Remove a node from the chain and return it to the free list
    fn unlink(&mut self, idx: usize) {
        let prev = self.node(idx).prev;
        let next = self.node(idx).next;
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => {
                if let Some(n) = next {
                    self.head = n;
                }
            }
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => {
                if let Some(p) = prev {
                    self.tail = p;
                }
            }
        }
        self.release(idx);
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free.push(idx);
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("dangling quicklist node index")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("dangling quicklist node index")
    }

    /// Verify chain and size invariants. Used by tests.
    #[cfg(test)]
    fn check_invariants(&self) {
        let mut total = 0;
        let mut cursor = Some(self.head);
        let mut prev: Option<usize> = None;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            assert_eq!(node.prev, prev);
            assert_eq!(node.lp.total_size() as usize, node.lp.byte_len());
            total += node.count();
            prev = Some(idx);
            cursor = node.next;
        }
        assert_eq!(prev, Some(self.tail));
        assert_eq!(total, self.size);
    }

    #[cfg(test)]
    fn node_counts(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = Some(self.head);
        while let Some(idx) = cursor {
            let node = self.node(idx);
            out.push(node.count());
            cursor = node.next;
        }
        out
    }
}

impl Default for QuickList {
    fn default() -> Self {
        Self::new()
    }
}
