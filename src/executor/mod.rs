//! Tree-walking executor. Every `PlanNode` variant materializes into an
//! owned, unnamed [`Table`] -- the child's output schema and rows, ready
//! for the parent node to consume. Nothing here mutates a catalog table;
//! `Scan` takes an immutable reference and copies out what it needs.

use crate::error::ExecutionError;
use crate::expr::Expr;
use crate::plan::{AggFunc, JoinType, PlanNode, ProjectItem, ScanSource, SortDirection};
use crate::schema::{Schema, SchemaField};
use crate::table::Table;
use crate::value::{DataType, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Cooperative cancellation/timeout flag threaded through a single
/// execution. Checked between plan nodes, not mid-expression: a query
/// stops at the next node boundary after cancellation or its deadline,
/// not instantly.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    started: std::time::Instant,
    timeout: Option<std::time::Duration>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: std::time::Instant::now(),
            timeout: None,
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        CancellationToken {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(AtomicOrdering::SeqCst) {
            return true;
        }
        matches!(self.timeout, Some(limit) if self.started.elapsed() > limit)
    }

    /// `Err` with the typed timeout/cancellation reason, for call sites
    /// that want to surface *which* of the two happened.
    pub fn check(&self) -> Result<(), ExecutionError> {
        if self.cancelled.load(AtomicOrdering::SeqCst) {
            return Err(ExecutionError::Cancelled);
        }
        if let Some(limit) = self.timeout {
            if self.started.elapsed() > limit {
                return Err(ExecutionError::Timeout(limit));
            }
        }
        Ok(())
    }
}

/// Lookup of tables and file sources available to a query. The executor
/// only ever reads through this trait; it never gets a mutable handle to
/// the catalog.
pub trait Catalog {
    fn table(&self, name: &str) -> Option<&Table>;
    fn load_file(&self, path: &str) -> Result<Table, ExecutionError>;
}

pub fn execute(
    plan: &PlanNode,
    catalog: &dyn Catalog,
    cancel: &CancellationToken,
) -> Result<Table, ExecutionError> {
    cancel.check()?;
    match plan {
        PlanNode::Scan { source, columns } => exec_scan(source, columns.as_deref(), catalog),
        PlanNode::IndexScan {
            source,
            index_name,
            key_values,
            columns,
            ..
        } => exec_index_scan(source, index_name, key_values, columns.as_deref(), catalog),
        PlanNode::Filter { input, predicate } => {
            let table = execute(input, catalog, cancel)?;
            exec_filter(&table, predicate)
        }
        PlanNode::Project { input, items } => {
            let table = execute(input, catalog, cancel)?;
            exec_project(&table, items)
        }
        PlanNode::Join {
            left,
            right,
            join_type,
            condition,
        } => {
            let left_table = execute(left, catalog, cancel)?;
            let right_table = execute(right, catalog, cancel)?;
            exec_join(&left_table, &right_table, *join_type, condition)
        }
        PlanNode::Aggregate {
            input,
            group_by,
            aggregates,
            having,
        } => {
            let table = execute(input, catalog, cancel)?;
            exec_aggregate(&table, group_by, aggregates, having.as_ref())
        }
        PlanNode::Sort { input, keys } => {
            let table = execute(input, catalog, cancel)?;
            exec_sort(&table, keys)
        }
        PlanNode::Limit {
            input,
            limit,
            offset,
        } => {
            let table = execute(input, catalog, cancel)?;
            exec_limit(&table, *limit, *offset)
        }
    }
}

fn exec_scan(
    source: &ScanSource,
    columns: Option<&[String]>,
    catalog: &dyn Catalog,
) -> Result<Table, ExecutionError> {
    let source_table = match source {
        ScanSource::Table(name) => catalog
            .table(name)
            .ok_or_else(|| ExecutionError::InvalidExpression(format!("unknown table {name}")))?
            .clone_materialized(),
        ScanSource::FilePath(path) => catalog.load_file(path)?,
    };
    match columns {
        Some(names) => project_by_name(&source_table, names),
        None => Ok(source_table),
    }
}

fn exec_index_scan(
    source: &ScanSource,
    index_name: &str,
    key_values: &[Value],
    columns: Option<&[String]>,
    catalog: &dyn Catalog,
) -> Result<Table, ExecutionError> {
    let ScanSource::Table(table_name) = source else {
        return Err(ExecutionError::InvalidExpression(
            "index scan requires a table source".to_string(),
        ));
    };
    let source_table = catalog
        .table(table_name)
        .ok_or_else(|| ExecutionError::InvalidExpression(format!("unknown table {table_name}")))?;
    let index = source_table.indexes().get(index_name).ok_or_else(|| {
        ExecutionError::InvalidExpression(format!("unknown index {index_name}"))
    })?;
    let row_ids = index
        .equality_lookup(key_values)
        .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;

    let mut result = Table::new(source_table.name().to_string(), source_table.schema().clone());
    for row_id in row_ids {
        if let Some(row) = source_table.row(row_id) {
            result
                .insert_row(row)
                .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
        }
    }
    match columns {
        Some(names) => project_by_name(&result, names),
        None => Ok(result),
    }
}

fn project_by_name(table: &Table, names: &[String]) -> Result<Table, ExecutionError> {
    let items: Vec<ProjectItem> = names.iter().cloned().map(ProjectItem::Column).collect();
    exec_project(table, &items)
}

fn exec_filter(table: &Table, predicate: &Expr) -> Result<Table, ExecutionError> {
    let mut result = Table::new(table.name().to_string(), table.schema().clone());
    for row in table.rows() {
        let keep = predicate.eval(&row, table.schema())?;
        if matches!(keep, Value::Boolean(true)) {
            result
                .insert_row(row)
                .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
        }
    }
    Ok(result)
}

fn exec_project(table: &Table, items: &[ProjectItem]) -> Result<Table, ExecutionError> {
    let names = resolve_project_columns(table.schema(), items);
    let schema = table
        .schema()
        .project(&names)
        .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    let mut result = Table::new(table.name().to_string(), schema);
    let positions: Vec<usize> = names
        .iter()
        .map(|n| table.schema().index_of(n).expect("resolved column exists"))
        .collect();
    for row in table.rows() {
        let projected = positions.iter().map(|&p| row[p].clone()).collect();
        result
            .insert_row(projected)
            .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    }
    Ok(result)
}

fn resolve_project_columns(schema: &Schema, items: &[ProjectItem]) -> Vec<String> {
    let mut names = Vec::new();
    for item in items {
        match item {
            ProjectItem::Star => names.extend(schema.column_names()),
            ProjectItem::Column(name) => names.push(name.clone()),
        }
    }
    names
}

fn exec_join(
    left: &Table,
    right: &Table,
    join_type: JoinType,
    condition: &crate::plan::JoinCondition,
) -> Result<Table, ExecutionError> {
    match join_type {
        JoinType::Inner | JoinType::Left => hash_join(left, right, condition, join_type == JoinType::Left),
        JoinType::Right => {
            // Swap sides, run left-outer, then swap the output columns back.
            let swapped_condition = crate::plan::JoinCondition {
                left_column: condition.right_column.clone(),
                right_column: condition.left_column.clone(),
            };
            let swapped = hash_join(right, left, &swapped_condition, true)?;
            reorder_columns(&swapped, left.schema().len())
        }
        JoinType::Full => full_outer_join(left, right, condition),
    }
}

fn join_schema(left: &Table, right: &Table) -> Schema {
    let mut fields: Vec<SchemaField> = left.schema().fields().to_vec();
    fields.extend(right.schema().fields().iter().cloned());
    Schema::new(fields)
}

/// Inner/left-outer hash join: builds a hash table over `right`'s join
/// column, probes with each `left` row. Unmatched left rows are dropped
/// (inner) or padded with the right side's type-zero (left-outer).
fn hash_join(
    left: &Table,
    right: &Table,
    condition: &crate::plan::JoinCondition,
    outer: bool,
) -> Result<Table, ExecutionError> {
    let right_col = right
        .schema()
        .index_of(&condition.right_column)
        .ok_or_else(|| ExecutionError::InvalidExpression(condition.right_column.clone()))?;
    let left_col = left
        .schema()
        .index_of(&condition.left_column)
        .ok_or_else(|| ExecutionError::InvalidExpression(condition.left_column.clone()))?;

    let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
    for (row_id, row) in right.rows().enumerate() {
        buckets
            .entry(row[right_col].hash_key())
            .or_default()
            .push(row_id);
    }

    let schema = join_schema(left, right);
    let mut result = Table::new("join".to_string(), schema);
    let right_zero_row: Vec<Value> = right
        .schema()
        .fields()
        .iter()
        .map(|f| Value::zero_for(&f.data_type))
        .collect();

    for left_row in left.rows() {
        let key = left_row[left_col].hash_key();
        let matches = buckets.get(&key).cloned().unwrap_or_default();
        let mut matched_any = false;
        for right_row_id in &matches {
            let right_row = right.row(*right_row_id).expect("row invariant");
            if right_row[right_col] == left_row[left_col] {
                matched_any = true;
                let mut combined = left_row.clone();
                combined.extend(right_row);
                result
                    .insert_row(combined)
                    .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
            }
        }
        if outer && !matched_any {
            let mut combined = left_row.clone();
            combined.extend(right_zero_row.clone());
            result
                .insert_row(combined)
                .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
        }
    }
    Ok(result)
}

/// Left-outer join run with sides swapped so unmatched rows belong to the
/// originally-right table, then the columns are rotated back to
/// `left-columns, right-columns` order.
fn reorder_columns(table: &Table, left_width: usize) -> Result<Table, ExecutionError> {
    let total = table.schema().len();
    let mut names = table.schema().column_names();
    let right_part = names.split_off(left_width);
    let mut reordered_names = right_part;
    reordered_names.extend(names);
    debug_assert_eq!(reordered_names.len(), total);
    project_by_name(table, &reordered_names)
}

fn full_outer_join(
    left: &Table,
    right: &Table,
    condition: &crate::plan::JoinCondition,
) -> Result<Table, ExecutionError> {
    let left_outer = hash_join(left, right, condition, true)?;
    let right_col = right
        .schema()
        .index_of(&condition.right_column)
        .ok_or_else(|| ExecutionError::InvalidExpression(condition.right_column.clone()))?;
    let left_col = left
        .schema()
        .index_of(&condition.left_column)
        .ok_or_else(|| ExecutionError::InvalidExpression(condition.left_column.clone()))?;

    let mut left_keys: std::collections::HashSet<u64> = std::collections::HashSet::new();
    for row in left.rows() {
        left_keys.insert(row[left_col].hash_key());
    }

    let schema = left_outer.schema().clone();
    let mut result = Table::new("join".to_string(), schema);
    for row in left_outer.rows() {
        result
            .insert_row(row)
            .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    }
    let left_zero_row: Vec<Value> = left
        .schema()
        .fields()
        .iter()
        .map(|f| Value::zero_for(&f.data_type))
        .collect();
    for right_row in right.rows() {
        if !left_keys.contains(&right_row[right_col].hash_key()) {
            let mut combined = left_zero_row.clone();
            combined.extend(right_row);
            result
                .insert_row(combined)
                .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
        }
    }
    Ok(result)
}

fn exec_sort(table: &Table, keys: &[crate::plan::SortKey]) -> Result<Table, ExecutionError> {
    let positions: Vec<(usize, SortDirection)> = keys
        .iter()
        .map(|k| {
            table
                .schema()
                .index_of(&k.column)
                .map(|p| (p, k.direction))
                .ok_or_else(|| ExecutionError::InvalidExpression(k.column.clone()))
        })
        .collect::<Result<_, _>>()?;

    let mut rows: Vec<Vec<Value>> = table.rows().collect();
    rows.sort_by(|a, b| {
        for (pos, dir) in &positions {
            let ord = a[*pos].partial_cmp(&b[*pos]).unwrap_or(Ordering::Equal);
            let ord = if *dir == SortDirection::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let mut result = Table::new(table.name().to_string(), table.schema().clone());
    for row in rows {
        result
            .insert_row(row)
            .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    }
    Ok(result)
}

fn exec_limit(table: &Table, limit: Option<usize>, offset: usize) -> Result<Table, ExecutionError> {
    let mut result = Table::new(table.name().to_string(), table.schema().clone());
    let rows: Vec<Vec<Value>> = table.rows().collect();
    let end = match limit {
        Some(l) => (offset + l).min(rows.len()),
        None => rows.len(),
    };
    for row in rows.into_iter().skip(offset).take(end.saturating_sub(offset)) {
        result
            .insert_row(row)
            .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    }
    Ok(result)
}

fn exec_aggregate(
    table: &Table,
    group_by: &[String],
    aggregates: &[crate::plan::AggregateExpr],
    having: Option<&Expr>,
) -> Result<Table, ExecutionError> {
    let group_positions: Vec<usize> = group_by
        .iter()
        .map(|name| {
            table
                .schema()
                .index_of(name)
                .ok_or_else(|| ExecutionError::InvalidExpression(name.clone()))
        })
        .collect::<Result<_, _>>()?;

    let mut groups: HashMap<String, (Vec<Value>, Vec<Vec<Value>>)> = HashMap::new();
    for row in table.rows() {
        let key_values: Vec<Value> = group_positions.iter().map(|&p| row[p].clone()).collect();
        let key = key_values.iter().map(Value::format_key).collect::<Vec<_>>().join("|");
        groups.entry(key).or_insert_with(|| (key_values, Vec::new())).1.push(row);
    }
    if groups.is_empty() && group_by.is_empty() {
        groups.insert(String::new(), (Vec::new(), Vec::new()));
    }

    let mut fields: Vec<SchemaField> = group_by
        .iter()
        .map(|name| {
            let dt = table.schema().data_type_of(name).cloned().unwrap_or(DataType::Int64);
            SchemaField::new(name.clone(), dt)
        })
        .collect();
    for agg in aggregates {
        fields.push(SchemaField::new(agg.alias.clone(), aggregate_output_type(agg, table.schema())));
    }
    let schema = Schema::new(fields);
    let mut result = Table::new(table.name().to_string(), schema);

    let mut sorted_keys: Vec<&String> = groups.keys().collect();
    sorted_keys.sort();
    for key in sorted_keys {
        let (group_key_values, rows) = &groups[key];
        let mut out_row = group_key_values.clone();
        for agg in aggregates {
            out_row.push(evaluate_aggregate(agg, rows, table.schema())?);
        }
        if let Some(predicate) = having {
            let having_schema = result.schema().clone();
            if !matches!(predicate.eval(&out_row, &having_schema)?, Value::Boolean(true)) {
                continue;
            }
        }
        result
            .insert_row(out_row)
            .map_err(|e| ExecutionError::InvalidExpression(e.to_string()))?;
    }
    Ok(result)
}

fn aggregate_output_type(agg: &crate::plan::AggregateExpr, schema: &Schema) -> DataType {
    match agg.func {
        AggFunc::CountStar | AggFunc::Count => DataType::Int64,
        AggFunc::Sum | AggFunc::Avg => DataType::Float64,
        AggFunc::Min | AggFunc::Max => agg
            .column
            .as_ref()
            .and_then(|c| schema.data_type_of(c))
            .cloned()
            .unwrap_or(DataType::Float64),
    }
}

fn evaluate_aggregate(
    agg: &crate::plan::AggregateExpr,
    rows: &[Vec<Value>],
    schema: &Schema,
) -> Result<Value, ExecutionError> {
    let column_pos = agg.column.as_ref().and_then(|c| schema.index_of(c));
    match agg.func {
        AggFunc::CountStar => Ok(Value::Int64(rows.len() as i64)),
        AggFunc::Count => {
            let pos = column_pos.ok_or_else(|| ExecutionError::InvalidExpression("COUNT column".to_string()))?;
            Ok(Value::Int64(rows.iter().filter(|r| r.len() > pos).count() as i64))
        }
        AggFunc::Sum => {
            let pos = column_pos.ok_or_else(|| ExecutionError::InvalidExpression("SUM column".to_string()))?;
            let sum: f64 = rows.iter().filter_map(|r| r[pos].as_f64()).sum();
            Ok(Value::Float64(sum))
        }
        AggFunc::Avg => {
            let pos = column_pos.ok_or_else(|| ExecutionError::InvalidExpression("AVG column".to_string()))?;
            let values: Vec<f64> = rows.iter().filter_map(|r| r[pos].as_f64()).collect();
            let avg = if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 };
            Ok(Value::Float64(avg))
        }
        AggFunc::Min => {
            let pos = column_pos.ok_or_else(|| ExecutionError::InvalidExpression("MIN column".to_string()))?;
            rows.iter()
                .map(|r| &r[pos])
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .cloned()
                .ok_or_else(|| ExecutionError::InvalidExpression("MIN over empty group".to_string()))
        }
        AggFunc::Max => {
            let pos = column_pos.ok_or_else(|| ExecutionError::InvalidExpression("MAX column".to_string()))?;
            rows.iter()
                .map(|r| &r[pos])
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .cloned()
                .ok_or_else(|| ExecutionError::InvalidExpression("MAX over empty group".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;

    struct TestCatalog(HashMap<String, Table>);

    impl Catalog for TestCatalog {
        fn table(&self, name: &str) -> Option<&Table> {
            self.0.get(name)
        }
        fn load_file(&self, path: &str) -> Result<Table, ExecutionError> {
            Err(ExecutionError::InvalidExpression(format!("no file source {path}")))
        }
    }

    fn people_table() -> Table {
        let schema = Schema::new(vec![
            SchemaField::new("id", DataType::Int64),
            SchemaField::new("name", DataType::String),
        ]);
        let mut table = Table::new("people", schema);
        for (id, name) in [(1, "Al"), (2, "Bob"), (3, "Ann")] {
            table.insert_row(vec![Value::Int64(id), Value::String(name.to_string())]).unwrap();
        }
        table
    }

    #[test]
    fn filter_keeps_only_matching_rows() {
        let table = people_table();
        let predicate = Expr::Like {
            expr: Box::new(Expr::Column("name".to_string())),
            pattern: "A%".to_string(),
        };
        let result = exec_filter(&table, &predicate).unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn aggregate_count_star_with_group_by() {
        let schema = Schema::new(vec![SchemaField::new("dept", DataType::String)]);
        let mut table = Table::new("t", schema);
        for d in ["eng", "eng", "sales"] {
            table.insert_row(vec![Value::String(d.to_string())]).unwrap();
        }
        let aggregates = vec![crate::plan::AggregateExpr {
            func: AggFunc::CountStar,
            column: None,
            alias: "n".to_string(),
        }];
        let result = exec_aggregate(&table, &["dept".to_string()], &aggregates, None).unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn left_join_pads_unmatched_rows_with_zero() {
        let left_schema = Schema::new(vec![SchemaField::new("id", DataType::Int64)]);
        let mut left = Table::new("l", left_schema);
        left.insert_row(vec![Value::Int64(1)]).unwrap();
        left.insert_row(vec![Value::Int64(2)]).unwrap();

        let right_schema = Schema::new(vec![
            SchemaField::new("id", DataType::Int64),
            SchemaField::new("amount", DataType::Int64),
        ]);
        let mut right = Table::new("r", right_schema);
        right.insert_row(vec![Value::Int64(1), Value::Int64(100)]).unwrap();

        let condition = crate::plan::JoinCondition {
            left_column: "id".to_string(),
            right_column: "id".to_string(),
        };
        let result = exec_join(&left, &right, JoinType::Left, &condition).unwrap();
        assert_eq!(result.row_count(), 2);
        let unmatched = result.row(1).unwrap();
        assert_eq!(unmatched[2], Value::Int64(0));
    }

    #[test]
    fn scan_reads_from_catalog() {
        let mut tables = HashMap::new();
        tables.insert("people".to_string(), people_table());
        let catalog = TestCatalog(tables);
        let table = exec_scan(&ScanSource::Table("people".to_string()), None, &catalog).unwrap();
        assert_eq!(table.row_count(), 3);
    }
}
