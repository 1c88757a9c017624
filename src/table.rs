//! [`Table`]: a named, schema-bound collection of columns plus its index
//! registry.
//!
//! Invariant: every column's length equals `row_count`. Deleting a row goes
//! through every column (so the invariant holds immediately afterward) and
//! then drops every index, since an index's row ids are positional and a
//! deletion shifts everything after it; callers that need the index back
//! call [`Table::rebuild_index`] or re-issue `CREATE INDEX`.

use crate::error::{IndexError, SchemaError};
use crate::index::{IndexRegistry, TableIndex};
use crate::schema::{Column, Schema};
use crate::value::Value;

#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Schema,
    columns: Vec<Column>,
    row_count: usize,
    indexes: IndexRegistry,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column::new(f.data_type.clone()))
            .collect();
        Table {
            name: name.into(),
            schema,
            columns,
            row_count: 0,
            indexes: IndexRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.schema.index_of(name).and_then(|i| self.columns.get(i))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }

    /// A fresh, index-free copy of this table's schema and rows. Used by
    /// the executor's `Scan` node, which reads a catalog table without
    /// borrowing it for the lifetime of the query.
    pub fn clone_materialized(&self) -> Table {
        let mut copy = Table::new(self.name.clone(), self.schema.clone());
        for row in self.rows() {
            copy.insert_row(row).expect("row arity matches own schema");
        }
        copy
    }

    /// Materialize a full row by value. `O(width)`.
    pub fn row(&self, row_idx: usize) -> Option<Vec<Value>> {
        if row_idx >= self.row_count {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| c.get(row_idx).cloned().expect("row invariant"))
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count).map(move |i| self.row(i).expect("row invariant"))
    }

    /// Append a row, validating arity. Values are not type-checked against
    /// the schema's declared `DataType` here (the executor does coercion at
    /// the expression layer); `Column` just stores whatever comes in.
    pub fn insert_row(&mut self, values: Vec<Value>) -> Result<(), SchemaError> {
        if values.len() != self.columns.len() {
            return Err(SchemaError::ColumnCountMismatch {
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        let row_id = self.row_count;
        for (col, value) in self.columns.iter_mut().zip(values.iter()) {
            col.push(value.clone());
        }
        self.row_count += 1;
        self.indexes.insert_row(&self.schema, &values, row_id);
        Ok(())
    }

    /// Remove a row by position, shifting all subsequent rows down by one.
    /// Invalidates every index on this table (their row ids no longer line
    /// up); call [`Table::rebuild_index`] per index name afterward.
    pub fn delete_row(&mut self, row_idx: usize) -> Result<Vec<Value>, SchemaError> {
        if row_idx >= self.row_count {
            return Err(SchemaError::ColumnNotFound(format!(
                "row index {row_idx} out of bounds"
            )));
        }
        let removed = self
            .columns
            .iter_mut()
            .map(|c| c.remove(row_idx))
            .collect();
        self.row_count -= 1;
        self.indexes.clear();
        Ok(removed)
    }

    /// Build (or replace) a B+Tree index over `columns` (single column for
    /// a plain secondary index, multiple for a composite-key B+Tree).
    pub fn create_btree_index(
        &mut self,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<(), IndexError> {
        let positions = self.column_positions(&columns)?;
        let name = name.into();
        let mut index = TableIndex::new_btree(name.clone(), columns);
        for row_id in 0..self.row_count {
            let key: Vec<Value> = positions
                .iter()
                .map(|&p| self.columns[p].get(row_id).cloned().unwrap())
                .collect();
            index.insert(key, row_id);
        }
        self.indexes.insert(index);
        Ok(())
    }

    /// Build (or replace) a composite-hash index requiring all of
    /// `columns` bound for any future equality lookup.
    pub fn create_composite_hash_index(
        &mut self,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<(), IndexError> {
        let positions = self.column_positions(&columns)?;
        let name = name.into();
        let mut index = TableIndex::new_composite_hash(name.clone(), columns);
        for row_id in 0..self.row_count {
            let key: Vec<Value> = positions
                .iter()
                .map(|&p| self.columns[p].get(row_id).cloned().unwrap())
                .collect();
            index.insert(key, row_id);
        }
        self.indexes.insert(index);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Option<TableIndex> {
        self.indexes.remove(name)
    }

    /// Rebuild a single index in place (e.g. after a delete invalidated
    /// everything). No-op if no index with this name exists any more
    /// (deletion already cleared the whole registry).
    pub fn rebuild_index(&mut self, name: &str, columns: Vec<String>, kind: &crate::index::IndexKind) -> Result<(), IndexError> {
        match kind {
            crate::index::IndexKind::BTree => self.create_btree_index(name.to_string(), columns),
            crate::index::IndexKind::CompositeHash => {
                self.create_composite_hash_index(name.to_string(), columns)
            }
        }
    }

    fn column_positions(&self, columns: &[String]) -> Result<Vec<usize>, IndexError> {
        columns
            .iter()
            .map(|name| {
                self.schema
                    .index_of(name)
                    .ok_or_else(|| IndexError::IndexColumnMissing(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;
    use crate::value::DataType;

    fn sample_table() -> Table {
        let schema = Schema::new(vec![
            SchemaField::new("id", DataType::Int64),
            SchemaField::new("name", DataType::String),
        ]);
        let mut table = Table::new("people", schema);
        for i in 0..5 {
            table
                .insert_row(vec![Value::Int64(i), Value::String(format!("n{i}"))])
                .unwrap();
        }
        table
    }

    #[test]
    fn insert_row_rejects_wrong_arity() {
        let mut table = sample_table();
        let err = table.insert_row(vec![Value::Int64(1)]).unwrap_err();
        assert!(matches!(err, SchemaError::ColumnCountMismatch { .. }));
    }

    #[test]
    fn row_count_matches_column_lengths() {
        let table = sample_table();
        assert_eq!(table.row_count(), 5);
        for col in table.columns() {
            assert_eq!(col.len(), 5);
        }
    }

    #[test]
    fn delete_row_shifts_and_clears_indexes() {
        let mut table = sample_table();
        table
            .create_btree_index("idx_id", vec!["id".to_string()])
            .unwrap();
        assert!(!table.indexes().is_empty());
        table.delete_row(0).unwrap();
        assert_eq!(table.row_count(), 4);
        assert!(table.indexes().is_empty());
        assert_eq!(table.row(0).unwrap()[0], Value::Int64(1));
    }

    #[test]
    fn btree_index_equality_lookup() {
        let mut table = sample_table();
        table
            .create_btree_index("idx_id", vec!["id".to_string()])
            .unwrap();
        let idx = table.indexes().get("idx_id").unwrap();
        let rows = idx.equality_lookup(&[Value::Int64(2)]).unwrap();
        assert_eq!(rows, vec![2]);
    }
}
