//! Secondary indexes over a [`crate::table::Table`].
//!
//! Two kinds are supported: an ordered [`btree::BPlusTree`] over one or more
//! columns (range scans, single- or composite-key equality), and a
//! [`CompositeHashIndex`] that hashes a full tuple of columns for O(1)
//! equality lookups but answers nothing unless every one of its key columns
//! is equality-bound by the predicate (see `IndexError::IndexValuesMissing`).
//! Both live behind [`TableIndex`] in a [`IndexRegistry`] keyed by name.

pub mod btree;
#[cfg(feature = "vectors")]
pub mod hnsw;

use crate::error::IndexError;
use crate::value::Value;
use btree::{BPlusTree, BTreeStats};
use std::collections::HashMap;

/// What an index is defined over: an ordered list of column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    CompositeHash,
}

/// A hash index over the full tuple of its key columns. Only ever answers
/// an equality lookup that binds all of `columns`.
#[derive(Debug, Default)]
pub struct CompositeHashIndex {
    buckets: HashMap<Vec<u64>, Vec<usize>>,
}

impl CompositeHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &[Value], row_id: usize) {
        let hash_key: Vec<u64> = key.iter().map(Value::hash_key).collect();
        self.buckets.entry(hash_key).or_default().push(row_id);
    }

    pub fn lookup(&self, key: &[Value]) -> Vec<usize> {
        let hash_key: Vec<u64> = key.iter().map(Value::hash_key).collect();
        self.buckets.get(&hash_key).cloned().unwrap_or_default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[derive(Debug)]
enum IndexStorage {
    BTree(BPlusTree<Vec<Value>, usize>),
    Hash(CompositeHashIndex),
}

/// A single named index: which columns it covers, and its storage.
#[derive(Debug)]
pub struct TableIndex {
    pub name: String,
    pub columns: Vec<String>,
    kind: IndexKind,
    storage: IndexStorage,
}

impl TableIndex {
    pub fn kind(&self) -> &IndexKind {
        &self.kind
    }

    pub fn new_btree(name: impl Into<String>, columns: Vec<String>) -> Self {
        TableIndex {
            name: name.into(),
            columns,
            kind: IndexKind::BTree,
            storage: IndexStorage::BTree(BPlusTree::new()),
        }
    }

    pub fn new_composite_hash(name: impl Into<String>, columns: Vec<String>) -> Self {
        TableIndex {
            name: name.into(),
            columns,
            kind: IndexKind::CompositeHash,
            storage: IndexStorage::Hash(CompositeHashIndex::new()),
        }
    }

    pub fn insert(&mut self, key: Vec<Value>, row_id: usize) {
        match &mut self.storage {
            IndexStorage::BTree(tree) => tree.insert(key, row_id),
            IndexStorage::Hash(hash) => hash.insert(&key, row_id),
        }
    }

    /// Equality lookup. For a composite-hash index, `key` must supply a
    /// value for every column in `self.columns`, per the index's defining
    /// invariant; callers that cannot bind every column should not reach
    /// for a composite-hash index at all (the optimizer enforces this).
    pub fn equality_lookup(&self, key: &[Value]) -> Result<Vec<usize>, IndexError> {
        match &self.storage {
            IndexStorage::BTree(tree) => Ok(tree.search(&key.to_vec())),
            IndexStorage::Hash(hash) => {
                if key.len() != self.columns.len() {
                    return Err(IndexError::IndexValuesMissing {
                        expected: self.columns.len(),
                        found: key.len(),
                    });
                }
                Ok(hash.lookup(key))
            }
        }
    }

    /// Inclusive range scan; only meaningful for B+Tree indexes. A
    /// composite-hash index has no ordering to scan, so this returns
    /// `IndexError::IndexKeyMissing`.
    pub fn range_scan(
        &self,
        lo: Option<&[Value]>,
        hi: Option<&[Value]>,
    ) -> Result<Vec<usize>, IndexError> {
        match &self.storage {
            IndexStorage::BTree(tree) => {
                let lo = lo.map(|v| v.to_vec());
                let hi = hi.map(|v| v.to_vec());
                Ok(tree.range_scan(lo.as_ref(), hi.as_ref()))
            }
            IndexStorage::Hash(_) => Err(IndexError::IndexKeyMissing(self.name.clone())),
        }
    }

    pub fn btree_stats(&self) -> Option<BTreeStats> {
        match &self.storage {
            IndexStorage::BTree(tree) => Some(tree.stats()),
            IndexStorage::Hash(_) => None,
        }
    }
}

/// Name -> index map owned by a [`crate::table::Table`].
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: HashMap<String, TableIndex>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: TableIndex) {
        self.indexes.insert(index.name.clone(), index);
    }

    pub fn remove(&mut self, name: &str) -> Option<TableIndex> {
        self.indexes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableIndex> {
        self.indexes.values()
    }

    /// Indexes (in registration order is not guaranteed) whose key columns
    /// are exactly `columns` in some order, used by the optimizer to find a
    /// usable index for a set of equality-bound columns.
    pub fn matching(&self, columns: &[String]) -> Vec<&TableIndex> {
        self.indexes
            .values()
            .filter(|idx| {
                idx.columns.len() == columns.len()
                    && idx.columns.iter().all(|c| columns.contains(c))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn clear(&mut self) {
        self.indexes.clear();
    }

    /// Feed a freshly-appended row into every index, keyed by each index's
    /// own column list (looked up in `schema`, since each index may cover a
    /// different subset of columns).
    pub fn insert_row(&mut self, schema: &crate::schema::Schema, row: &[Value], row_id: usize) {
        for index in self.indexes.values_mut() {
            let key: Vec<Value> = index
                .columns
                .iter()
                .filter_map(|name| schema.index_of(name))
                .map(|pos| row[pos].clone())
                .collect();
            if key.len() == index.columns.len() {
                index.insert(key, row_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_hash_requires_all_columns() {
        let mut idx = TableIndex::new_composite_hash("ix", vec!["a".into(), "b".into()]);
        idx.insert(vec![Value::Int32(1), Value::Int32(2)], 0);
        let err = idx.equality_lookup(&[Value::Int32(1)]).unwrap_err();
        assert!(matches!(err, IndexError::IndexValuesMissing { .. }));
        let ok = idx
            .equality_lookup(&[Value::Int32(1), Value::Int32(2)])
            .unwrap();
        assert_eq!(ok, vec![0]);
    }

    #[test]
    fn btree_index_range_scan() {
        let mut idx = TableIndex::new_btree("ix", vec!["a".into()]);
        for i in 0..10 {
            idx.insert(vec![Value::Int64(i)], i as usize);
        }
        let result = idx
            .range_scan(Some(&[Value::Int64(3)]), Some(&[Value::Int64(6)]))
            .unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn registry_matching_ignores_order() {
        let mut reg = IndexRegistry::new();
        reg.insert(TableIndex::new_composite_hash(
            "ix",
            vec!["b".into(), "a".into()],
        ));
        let found = reg.matching(&["a".to_string(), "b".to_string()]);
        assert_eq!(found.len(), 1);
    }
}
