//! CSV file source. First row is the header; a column's type is inferred
//! from its data -- `Int64` if every non-empty field parses as an integer,
//! `Float64` if every non-empty field parses as a number, `Boolean` if every
//! field is `true`/`false`, `String` otherwise. An empty field takes the
//! column's zero value rather than a NULL, consistent with the rest of the
//! engine's NULL-free design.

use crate::error::IoError;
use crate::schema::{Schema, SchemaField};
use crate::table::Table;
use crate::value::{DataType, Value};
use std::io::{BufRead, BufReader};
use std::path::Path;

const DELIMITER: char = ',';
const QUOTE: char = '"';

pub fn load(path: &Path, table_name: &str) -> Result<Table, IoError> {
    let file = std::fs::File::open(path).map_err(|source| IoError::FailedToLoadFile {
        path: path.display().to_string(),
        source,
    })?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| IoError::InvalidFileFormat(format!("{} is empty", path.display())))?
        .map_err(|source| IoError::FailedToLoadFile {
            path: path.display().to_string(),
            source,
        })?;
    let header: Vec<String> = split_line(&header_line).into_iter().map(str::to_string).collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for line_result in lines {
        let line = line_result.map_err(|source| IoError::FailedToLoadFile {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<String> = split_line(&line).into_iter().map(str::to_string).collect();
        if fields.len() != header.len() {
            return Err(IoError::InvalidFileFormat(format!(
                "{} has a row with {} fields, expected {}",
                path.display(),
                fields.len(),
                header.len()
            )));
        }
        rows.push(fields);
    }

    let column_types: Vec<DataType> = (0..header.len())
        .map(|i| infer_column_type(rows.iter().map(|row| row[i].as_str())))
        .collect();

    let schema = Schema::new(
        header
            .iter()
            .zip(&column_types)
            .map(|(name, dt)| SchemaField::new(name.clone(), dt.clone()))
            .collect(),
    );
    let mut table = Table::new(table_name, schema);
    for row in rows {
        let values: Vec<Value> = row
            .iter()
            .zip(&column_types)
            .map(|(field, dt)| parse_value(field, dt))
            .collect();
        table
            .insert_row(values)
            .map_err(|e| IoError::InvalidFileFormat(e.to_string()))?;
    }
    Ok(table)
}

fn split_line(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            QUOTE if !in_quotes => {
                in_quotes = true;
                start = i + 1;
            }
            QUOTE if in_quotes => {
                if chars.get(i + 1) == Some(&QUOTE) {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            }
            c if c == DELIMITER && !in_quotes => {
                fields.push(line[start..i].trim().trim_matches(QUOTE));
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    fields.push(line[start..].trim().trim_matches(QUOTE));
    fields
}

fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> DataType {
    let mut saw_value = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    for raw in values {
        if raw.is_empty() {
            continue;
        }
        saw_value = true;
        if raw.parse::<i64>().is_err() {
            all_int = false;
        }
        if raw.parse::<f64>().is_err() {
            all_float = false;
        }
        if !raw.eq_ignore_ascii_case("true") && !raw.eq_ignore_ascii_case("false") {
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

fn parse_value(field: &str, data_type: &DataType) -> Value {
    if field.is_empty() {
        return Value::zero_for(data_type);
    }
    match data_type {
        DataType::Int64 => field
            .parse::<i64>()
            .map(Value::Int64)
            .unwrap_or_else(|_| Value::zero_for(data_type)),
        DataType::Float64 => field
            .parse::<f64>()
            .map(Value::Float64)
            .unwrap_or_else(|_| Value::zero_for(data_type)),
        DataType::Boolean => Value::Boolean(field.eq_ignore_ascii_case("true")),
        _ => Value::String(field.to_string()),
    }
}
