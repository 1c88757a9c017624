//! B+Tree secondary index.
//!
//! Ordered index supporting equality search and inclusive range scans.
//! Nodes live in an arena (`Vec<Node<K, V>>`) addressed by `NodeId`; this
//! gives leaves a `next` pointer for the linked-list range-scan walk
//! without resorting to raw pointers, while the arena itself is the single
//! owner every node lives in (mirrors the "owns its children exclusively,
//! root owned by the index wrapper" ownership story in the data model).
//!
//! Max fan-out is 32 (`MAX_KEYS = 31`); insertion performs the standard
//! top-down preemptive split: a full node is split on the way down *before*
//! descending into it, so a single pass never has to propagate a split back
//! up. Leaf splits retain the promoted key in both halves (duplicating it)
//! so equality lookups stay complete; internal splits promote the middle
//! key alone.

use std::fmt::Debug;

/// Max fan-out 32 => at most 31 keys per node, minimum `ceil(32/2) - 1 = 15`
/// for a non-root node (enforced only on the insert path; Grizzly does not
/// implement deletion, so under-full nodes from deletes never arise).
const ORDER: usize = 32;
const MAX_KEYS: usize = ORDER - 1;

type NodeId = usize;

#[derive(Debug)]
enum Node<K, V> {
    Internal {
        keys: Vec<K>,
        children: Vec<NodeId>,
    },
    Leaf {
        keys: Vec<K>,
        values: Vec<Vec<V>>,
        next: Option<NodeId>,
    },
}

impl<K, V> Node<K, V> {
    fn new_leaf() -> Self {
        Node::Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    fn key_count(&self) -> usize {
        match self {
            Node::Internal { keys, .. } => keys.len(),
            Node::Leaf { keys, .. } => keys.len(),
        }
    }

    fn is_full(&self) -> bool {
        self.key_count() >= MAX_KEYS
    }
}

/// Aggregate statistics exposed by `BPlusTree::stats`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BTreeStats {
    pub height: usize,
    pub node_count: usize,
    pub avg_fanout: f64,
}

/// Ordered secondary index over keys of type `K` (typically `Vec<Value>`,
/// which derives a lexicographic `Ord` for composite keys for free) mapping
/// to row ids of type `V`.
#[derive(Debug)]
pub struct BPlusTree<K: Ord + Clone + Debug, V: Clone> {
    nodes: Vec<Node<K, V>>,
    root: NodeId,
}

impl<K: Ord + Clone + Debug, V: Clone> BPlusTree<K, V> {
    pub fn new() -> Self {
        BPlusTree {
            nodes: vec![Node::new_leaf()],
            root: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.nodes[self.root] {
            Node::Leaf { keys, .. } => keys.is_empty(),
            Node::Internal { .. } => false,
        }
    }

    /// Insert `key -> row_id`. Duplicate keys are permitted; among
    /// duplicates in the same leaf, insertion order is preserved.
    pub fn insert(&mut self, key: K, row_id: V) {
        if self.nodes[self.root].is_full() {
            let old_root = self.root;
            let new_root = self.nodes.len();
            self.nodes.push(Node::Internal {
                keys: Vec::new(),
                children: vec![old_root],
            });
            self.root = new_root;
            self.split_child(new_root, 0);
        }
        self.insert_nonfull(self.root, key, row_id);
    }

    /// Split `parent`'s child at `child_idx`, which must currently be full.
    fn split_child(&mut self, parent: NodeId, child_idx: usize) {
        let child_id = match &self.nodes[parent] {
            Node::Internal { children, .. } => children[child_idx],
            Node::Leaf { .. } => unreachable!("split_child called on a leaf parent"),
        };

        match &self.nodes[child_id] {
            Node::Leaf { .. } => self.split_leaf_child(parent, child_idx, child_id),
            Node::Internal { .. } => self.split_internal_child(parent, child_idx, child_id),
        }
    }

    fn split_leaf_child(&mut self, parent: NodeId, child_idx: usize, child_id: NodeId) {
        let (mid_key, right_keys, right_values, old_next) = {
            let Node::Leaf { keys, values, next } = &mut self.nodes[child_id] else {
                unreachable!()
            };
            let mid = keys.len() / 2;
            let right_keys = keys.split_off(mid);
            let right_values = values.split_off(mid);
            let mid_key = right_keys[0].clone();
            (mid_key, right_keys, right_values, *next)
        };
        let right_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            keys: right_keys,
            values: right_values,
            next: old_next,
        });
        if let Node::Leaf { next, .. } = &mut self.nodes[child_id] {
            *next = Some(right_id);
        }
        self.insert_separator(parent, child_idx, mid_key, right_id);
    }

    fn split_internal_child(&mut self, parent: NodeId, child_idx: usize, child_id: NodeId) {
        let (mid_key, right_keys, right_children) = {
            let Node::Internal { keys, children } = &mut self.nodes[child_id] else {
                unreachable!()
            };
            let mid = keys.len() / 2;
            let mid_key = keys[mid].clone();
            let right_keys = keys.split_off(mid + 1);
            keys.truncate(mid);
            let right_children = children.split_off(mid + 1);
            (mid_key, right_keys, right_children)
        };
        let right_id = self.nodes.len();
        self.nodes.push(Node::Internal {
            keys: right_keys,
            children: right_children,
        });
        self.insert_separator(parent, child_idx, mid_key, right_id);
    }

    fn insert_separator(&mut self, parent: NodeId, child_idx: usize, sep_key: K, right_id: NodeId) {
        let Node::Internal { keys, children } = &mut self.nodes[parent] else {
            unreachable!("insert_separator called on a non-internal parent")
        };
        keys.insert(child_idx, sep_key);
        children.insert(child_idx + 1, right_id);
    }

    fn insert_nonfull(&mut self, node_id: NodeId, key: K, row_id: V) {
        let child_to_descend = match &mut self.nodes[node_id] {
            Node::Leaf { keys, values, .. } => {
                let pos = keys.partition_point(|k| k <= &key);
                keys.insert(pos, key);
                values.insert(pos, vec![row_id]);
                return;
            }
            Node::Internal { keys, children } => {
                let idx = find_child_index(keys, &key);
                children[idx]
            }
        };

        if self.nodes[child_to_descend].is_full() {
            let child_idx = match &self.nodes[node_id] {
                Node::Internal { children, .. } => {
                    children.iter().position(|&c| c == child_to_descend).unwrap()
                }
                Node::Leaf { .. } => unreachable!(),
            };
            self.split_child(node_id, child_idx);
            // After the split, the correct child may now be to the right.
            let Node::Internal { keys, children } = &self.nodes[node_id] else {
                unreachable!()
            };
            let idx = find_child_index(keys, &key);
            self.insert_nonfull(children[idx], key, row_id);
        } else {
            self.insert_nonfull(child_to_descend, key, row_id);
        }
    }

    /// All row ids whose key equals `key`, in insertion order.
    pub fn search(&self, key: &K) -> Vec<V> {
        self.range_scan(Some(key), Some(key))
    }

    /// Row ids in ascending key order for keys intersecting `[lo, hi]`
    /// (both bounds inclusive, either or both may be omitted).
    pub fn range_scan(&self, lo: Option<&K>, hi: Option<&K>) -> Vec<V> {
        let mut out = Vec::new();
        let mut leaf_id = self.leftmost_leaf_for(lo);

        'walk: while let Some(id) = leaf_id {
            let Node::Leaf { keys, values, next } = &self.nodes[id] else {
                unreachable!("leaf chain pointed at a non-leaf")
            };
            for (k, vs) in keys.iter().zip(values.iter()) {
                if let Some(lo) = lo {
                    if k < lo {
                        continue;
                    }
                }
                if let Some(hi) = hi {
                    if k > hi {
                        break 'walk;
                    }
                }
                out.extend(vs.iter().cloned());
            }
            leaf_id = *next;
        }
        out
    }

    fn leftmost_leaf_for(&self, lo: Option<&K>) -> Option<NodeId> {
        if self.is_empty() {
            return None;
        }
        let mut current = self.root;
        loop {
            match &self.nodes[current] {
                Node::Leaf { .. } => return Some(current),
                Node::Internal { keys, children } => {
                    current = match lo {
                        None => children[0],
                        Some(lo) => children[find_child_index(keys, lo)],
                    };
                }
            }
        }
    }

    pub fn stats(&self) -> BTreeStats {
        let mut height = 0;
        let mut current = self.root;
        loop {
            height += 1;
            match &self.nodes[current] {
                Node::Leaf { .. } => break,
                Node::Internal { children, .. } => current = children[0],
            }
        }

        let node_count = self.nodes.len();
        let internal: Vec<&Node<K, V>> = self.nodes.iter().filter(|n| !n.is_leaf()).collect();
        let avg_fanout = if internal.is_empty() {
            0.0
        } else {
            let total: usize = internal
                .iter()
                .map(|n| match n {
                    Node::Internal { children, .. } => children.len(),
                    Node::Leaf { .. } => unreachable!(),
                })
                .sum();
            total as f64 / internal.len() as f64
        };

        BTreeStats {
            height,
            node_count,
            avg_fanout,
        }
    }
}

impl<K: Ord + Clone + Debug, V: Clone> Default for BPlusTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the child to descend into for `key`: the first child whose
/// separator key is strictly greater than `key`.
fn find_child_index<K: Ord>(keys: &[K], key: &K) -> usize {
    keys.partition_point(|k| k <= key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_search_returns_empty() {
        let tree: BPlusTree<i64, usize> = BPlusTree::new();
        assert!(tree.search(&5).is_empty());
        assert!(tree.range_scan(None, None).is_empty());
    }

    #[test]
    fn range_scan_is_nondecreasing_after_many_inserts() {
        let mut tree = BPlusTree::new();
        let mut keys: Vec<i64> = (0..2000).map(|i| (i * 7919) % 4999).collect();
        for (row_id, &k) in keys.iter().enumerate() {
            tree.insert(k, row_id);
        }
        let scanned = tree.range_scan(None, None);
        let scanned_keys: Vec<i64> = scanned.iter().map(|&row_id| keys[row_id]).collect();
        let mut sorted = scanned_keys.clone();
        sorted.sort();
        assert_eq!(scanned_keys, sorted);
        assert_eq!(scanned.len(), keys.len());
        keys.sort();
    }

    #[test]
    fn equality_search_finds_all_duplicates() {
        let mut tree = BPlusTree::new();
        for i in 0..100 {
            tree.insert(42i64, i);
            tree.insert(i, i);
        }
        let mut found = tree.search(&42);
        found.sort_unstable();
        let expected: Vec<usize> = (0..100).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn inclusive_range_bounds() {
        let mut tree = BPlusTree::new();
        for i in 0..50 {
            tree.insert(i as i64, i as usize);
        }
        let result = tree.range_scan(Some(&10), Some(&20));
        assert_eq!(result.len(), 11); // 10..=20
    }

    #[test]
    fn root_split_increases_height() {
        let mut tree = BPlusTree::new();
        assert_eq!(tree.stats().height, 1);
        for i in 0..MAX_KEYS {
            tree.insert(i as i64, i);
        }
        assert_eq!(tree.stats().height, 1);
        tree.insert(MAX_KEYS as i64, MAX_KEYS);
        assert_eq!(tree.stats().height, 2);
    }

    #[test]
    fn composite_keys_via_vec_ord() {
        let mut tree: BPlusTree<Vec<i64>, usize> = BPlusTree::new();
        tree.insert(vec![1, 2], 0);
        tree.insert(vec![1, 1], 1);
        tree.insert(vec![0, 9], 2);
        let scanned = tree.range_scan(None, None);
        // row 2 (key [0,9]) must come before rows 1,0 (keys [1,1],[1,2]).
        assert_eq!(scanned[0], 2);
    }
}
