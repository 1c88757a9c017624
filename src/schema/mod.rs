//! Schema and Column: the typed, column-major storage layer.
//!
//! A [`Schema`] is the ordered `{name, data_type, vector_dimension?}` triple
//! sequence every [`crate::table::Table`] carries; a [`Column`] is a dense
//! vector of same-typed [`Value`]s plus the cardinality estimator the
//! optimizer consults for selectivity.

pub mod cardinality;

pub use cardinality::CardinalityEstimator;

use crate::error::SchemaError;
use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};

/// A single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: DataType,
    pub vector_dimension: Option<usize>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        SchemaField {
            name: name.into(),
            data_type,
            vector_dimension: None,
        }
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.vector_dimension = Some(dim);
        self
    }
}

/// An ordered, case-sensitively-unique sequence of fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Schema { fields }
    }

    pub fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Looks up a field by name. Schemas themselves are unqualified, but
    /// callers parsing `table.column` out of a `JOIN ... ON` or `ORDER BY`
    /// clause pass the qualified form through unchanged, so a qualified
    /// name that doesn't match exactly falls back to its tail after the
    /// last `.` (the same unqualifying `rsplit('.')` the lineage tracker
    /// uses for the same reason).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(pos) = self.fields.iter().position(|f| f.name == name) {
            return Some(pos);
        }
        let tail = name.rsplit('.').next()?;
        if tail == name {
            return None;
        }
        self.fields.iter().position(|f| f.name == tail)
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn data_type_of(&self, name: &str) -> Option<&DataType> {
        self.field(name).map(|f| &f.data_type)
    }

    /// Append a field, rejecting a name collision (schemas are unique by
    /// case-sensitive name).
    pub fn push(&mut self, field: SchemaField) -> Result<(), SchemaError> {
        if self.index_of(&field.name).is_some() {
            return Err(SchemaError::DuplicateColumn(field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Build a projected schema from a subset of column names, in the order
    /// given (used by `Project` and by projection pushdown).
    pub fn project(&self, names: &[String]) -> Result<Schema, SchemaError> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let field = self
                .field(name)
                .ok_or_else(|| SchemaError::ColumnNotFound(name.clone()))?;
            fields.push(field.clone());
        }
        Ok(Schema::new(fields))
    }
}

/// A dense, single-typed column of values plus its cardinality estimator.
#[derive(Debug, Clone)]
pub struct Column {
    data_type: DataType,
    values: Vec<Value>,
    cardinality: CardinalityEstimator,
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Column {
            data_type,
            values: Vec::new(),
            cardinality: CardinalityEstimator::new(),
        }
    }

    pub fn with_values(data_type: DataType, values: Vec<Value>) -> Self {
        let mut cardinality = CardinalityEstimator::new();
        for v in &values {
            cardinality.observe(v);
        }
        Column {
            data_type,
            values,
            cardinality,
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn push(&mut self, value: Value) {
        self.cardinality.observe(&value);
        self.values.push(value);
    }

    pub fn cardinality_estimate(&self) -> u64 {
        self.cardinality.estimate()
    }

    /// Remove a row by swap-removing and rebuilding the cardinality
    /// estimator; per the table invariant, the core never mutates index
    /// row-id references in place, so callers rebuild indexes after this.
    pub fn remove(&mut self, row: usize) -> Value {
        let removed = self.values.remove(row);
        let mut cardinality = CardinalityEstimator::new();
        for v in &self.values {
            cardinality.observe(v);
        }
        self.cardinality = cardinality;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_duplicate_names() {
        let mut schema = Schema::new(vec![SchemaField::new("id", DataType::Int32)]);
        let err = schema.push(SchemaField::new("id", DataType::String));
        assert!(err.is_err());
    }

    #[test]
    fn project_preserves_requested_order() {
        let schema = Schema::new(vec![
            SchemaField::new("a", DataType::Int32),
            SchemaField::new("b", DataType::String),
            SchemaField::new("c", DataType::Boolean),
        ]);
        let projected = schema
            .project(&["c".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(projected.column_names(), vec!["c", "a"]);
    }

    #[test]
    fn column_cardinality_tracks_pushes() {
        let mut col = Column::new(DataType::Int32);
        col.push(Value::Int32(1));
        col.push(Value::Int32(1));
        col.push(Value::Int32(2));
        assert_eq!(col.cardinality_estimate(), 2);
        assert_eq!(col.len(), 3);
    }
}
