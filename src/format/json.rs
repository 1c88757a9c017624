//! JSON file source. Accepts either a top-level JSON array of objects or
//! newline-delimited JSON (one object per line). Column set and order come
//! from the first record; a field absent from the first record but present
//! later is rejected, the same way the CSV loader rejects a row with the
//! wrong field count.

use crate::error::IoError;
use crate::schema::{Schema, SchemaField};
use crate::table::Table;
use crate::value::{DataType, Value};
use std::path::Path;

pub fn load(path: &Path, table_name: &str) -> Result<Table, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::FailedToLoadFile {
        path: path.display().to_string(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let records = parse_records(&text, path)?;

    let Some(first) = records.first() else {
        return Err(IoError::InvalidFileFormat(format!(
            "{} contains no records",
            path.display()
        )));
    };
    let serde_json::Value::Object(first_obj) = first else {
        return Err(IoError::InvalidFileFormat(format!(
            "{} records must be JSON objects",
            path.display()
        )));
    };
    let columns: Vec<String> = first_obj.keys().cloned().collect();

    let column_types: Vec<DataType> = columns
        .iter()
        .map(|name| infer_column_type(&records, name))
        .collect();

    let schema = Schema::new(
        columns
            .iter()
            .zip(&column_types)
            .map(|(name, dt)| SchemaField::new(name.clone(), dt.clone()))
            .collect(),
    );
    let mut table = Table::new(table_name, schema);
    for record in &records {
        let serde_json::Value::Object(obj) = record else {
            return Err(IoError::InvalidFileFormat(format!(
                "{} mixes object and non-object records",
                path.display()
            )));
        };
        let mut values = Vec::with_capacity(columns.len());
        for (name, dt) in columns.iter().zip(&column_types) {
            let raw = obj.get(name).ok_or_else(|| {
                IoError::InvalidFileFormat(format!(
                    "{} has a record missing field {name}",
                    path.display()
                ))
            })?;
            values.push(json_to_value(raw, dt));
        }
        table
            .insert_row(values)
            .map_err(|e| IoError::InvalidFileFormat(e.to_string()))?;
    }
    Ok(table)
}

fn parse_records(text: &str, path: &Path) -> Result<Vec<serde_json::Value>, IoError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let array: Vec<serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| IoError::InvalidFileFormat(format!("{}: {e}", path.display())))?;
        return Ok(array);
    }
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| IoError::InvalidFileFormat(format!("{}: {e}", path.display())))
        })
        .collect()
}

fn infer_column_type(records: &[serde_json::Value], field: &str) -> DataType {
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    let mut saw_value = false;
    for record in records {
        let Some(raw) = record.get(field) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }
        saw_value = true;
        if !raw.is_i64() && !raw.is_u64() {
            all_int = false;
        }
        if !raw.is_number() {
            all_float = false;
        }
        if !raw.is_boolean() {
            all_bool = false;
        }
    }
    if !saw_value {
        return DataType::String;
    }
    if all_int {
        DataType::Int64
    } else if all_float {
        DataType::Float64
    } else if all_bool {
        DataType::Boolean
    } else {
        DataType::String
    }
}

fn json_to_value(raw: &serde_json::Value, data_type: &DataType) -> Value {
    if raw.is_null() {
        return Value::zero_for(data_type);
    }
    match data_type {
        DataType::Int64 => raw.as_i64().map(Value::Int64).unwrap_or_else(|| Value::zero_for(data_type)),
        DataType::Float64 => raw
            .as_f64()
            .map(Value::Float64)
            .unwrap_or_else(|| Value::zero_for(data_type)),
        DataType::Boolean => raw.as_bool().map(Value::Boolean).unwrap_or_else(|| Value::zero_for(data_type)),
        _ => Value::String(raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json_array_of_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"id": 1, "name": "alice"}, {"id": 2, "name": "bob"}]"#).unwrap();
        let table = load(&path, "rows").unwrap();
        assert_eq!(table.schema().fields()[0].data_type, DataType::Int64);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn loads_newline_delimited_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.ndjson");
        std::fs::write(&path, "{\"id\": 1}\n{\"id\": 2}\n").unwrap();
        let table = load(&path, "rows").unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn null_field_becomes_column_zero_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"score": 1}, {"score": null}]"#).unwrap();
        let table = load(&path, "rows").unwrap();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[1][0], Value::Int64(0));
    }
}
