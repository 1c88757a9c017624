//! Cost-based plan rewriting: predicate/projection pushdown and index
//! selection over a `dashmap`-backed statistics registry, followed by a
//! cost model that annotates every node for `EXPLAIN`.
//!
//! Rewrite rules run in a fixed order -- pushdown before index selection,
//! since index selection needs the tightened column list to decide whether
//! a single-column index still covers everything a `Project` needs -- and
//! the cost model always runs last over the rewritten tree.

use crate::expr::Expr;
use crate::index::IndexKind;
use crate::plan::explain::CostNode;
use crate::plan::{IndexStrategy, PlanNode, ProjectItem, QueryPlan, ScanSource};
use crate::table::Table;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};

/// Per-table statistics the optimizer consults for row counts and index
/// availability. Populated from the live `Table` the first time a plan
/// touches it; stale between explicit refreshes (acceptable: this is a
/// cost estimate, not a correctness input).
///
/// `single_column_indexes` and `composite_hash_indexes` are `BTreeMap`s, not
/// `HashMap`s: index selection (`try_index_scan`) walks them in order and
/// returns the first full match, and per spec tie-breaking must be
/// deterministic by iteration order of the statistics map. A `BTreeMap`
/// iterates in ascending key order -- single-column indexes by column name,
/// composite-hash indexes by index name -- so the same predicate always
/// picks the same index across runs.
#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    pub row_count: usize,
    pub row_size_bytes: usize,
    /// column name -> estimated distinct values
    pub cardinality: HashMap<String, u64>,
    /// column name -> single-column B+Tree index name, ordered by column name
    pub single_column_indexes: BTreeMap<String, String>,
    /// index name -> ordered key columns, for composite-hash indexes,
    /// ordered by index name
    pub composite_hash_indexes: BTreeMap<String, Vec<String>>,
}

/// Registry of table statistics, keyed by table name. `DashMap` gives
/// lock-free concurrent reads from multiple query executions without a
/// surrounding `RwLock`.
#[derive(Debug, Default)]
pub struct StatisticsRegistry {
    tables: DashMap<String, TableStatistics>,
}

impl StatisticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_from_table(&self, table: &Table) {
        let mut stats = TableStatistics {
            row_count: table.row_count(),
            row_size_bytes: table.schema().len() * 16,
            ..Default::default()
        };
        for field in table.schema().fields() {
            if let Some(col) = table.column_by_name(&field.name) {
                stats
                    .cardinality
                    .insert(field.name.clone(), col.cardinality_estimate());
            }
        }
        for index in table.indexes().iter() {
            match index.kind() {
                IndexKind::BTree if index.columns.len() == 1 => {
                    stats
                        .single_column_indexes
                        .insert(index.columns[0].clone(), index.name.clone());
                }
                IndexKind::CompositeHash => {
                    stats
                        .composite_hash_indexes
                        .insert(index.name.clone(), index.columns.clone());
                }
                _ => {}
            }
        }
        self.tables.insert(table.name().to_string(), stats);
    }

    pub fn get(&self, table: &str) -> Option<TableStatistics> {
        self.tables.get(table).map(|entry| entry.clone())
    }
}

/// Rewrites `plan` in place for pushdown/index-selection, then builds the
/// costed `CostNode` tree `EXPLAIN` renders. Returns the optimized
/// `QueryPlan` and its `CostNode` explanation together since both are
/// produced by the same bottom-up walk.
pub fn optimize(root: PlanNode, stats: &StatisticsRegistry) -> (QueryPlan, CostNode) {
    let pushed = push_projection(root);
    let selected = select_indexes(pushed, stats);
    let cost_node = cost_plan(&selected, stats);
    let total_cost = cost_node.cost;
    (
        QueryPlan {
            root: selected,
            optimized: true,
            total_cost,
        },
        cost_node,
    )
}

/// Rule 2: projection pushdown. Tightens a `Scan`/`IndexScan` leaf's column
/// list to exactly what the nearest enclosing `Project` needs, when that
/// `Project` is the node's only consumer and requests concrete columns
/// (not `*`).
fn push_projection(node: PlanNode) -> PlanNode {
    match node {
        PlanNode::Project { input, items } => {
            let pushed_input = push_projection(*input);
            let pushed_input = if let Some(columns) = concrete_columns(&items) {
                push_columns_into_leaf(pushed_input, &columns)
            } else {
                pushed_input
            };
            PlanNode::Project {
                input: Box::new(pushed_input),
                items,
            }
        }
        PlanNode::Filter { input, predicate } => PlanNode::Filter {
            input: Box::new(push_projection(*input)),
            predicate,
        },
        PlanNode::Join {
            left,
            right,
            join_type,
            condition,
        } => PlanNode::Join {
            left: Box::new(push_projection(*left)),
            right: Box::new(push_projection(*right)),
            join_type,
            condition,
        },
        PlanNode::Aggregate {
            input,
            group_by,
            aggregates,
            having,
        } => PlanNode::Aggregate {
            input: Box::new(push_projection(*input)),
            group_by,
            aggregates,
            having,
        },
        PlanNode::Sort { input, keys } => PlanNode::Sort {
            input: Box::new(push_projection(*input)),
            keys,
        },
        PlanNode::Limit {
            input,
            limit,
            offset,
        } => PlanNode::Limit {
            input: Box::new(push_projection(*input)),
            limit,
            offset,
        },
        leaf @ (PlanNode::Scan { .. } | PlanNode::IndexScan { .. }) => leaf,
    }
}

fn concrete_columns(items: &[ProjectItem]) -> Option<Vec<String>> {
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            ProjectItem::Column(name) => columns.push(name.clone()),
            ProjectItem::Star => return None,
        }
    }
    Some(columns)
}

fn push_columns_into_leaf(node: PlanNode, columns: &[String]) -> PlanNode {
    match node {
        PlanNode::Scan { source, .. } => PlanNode::Scan {
            source,
            columns: Some(columns.to_vec()),
        },
        PlanNode::IndexScan {
            source,
            index_name,
            strategy,
            key_columns,
            key_values,
            ..
        } => PlanNode::IndexScan {
            source,
            index_name,
            strategy,
            key_columns,
            key_values,
            columns: Some(columns.to_vec()),
        },
        other => other,
    }
}

/// Rule 3: index selection. A `Filter` directly over a `Scan` whose
/// predicate binds every column of some table index with an equality gets
/// rewritten to an `IndexScan`. Composite-hash indexes are preferred over a
/// single-column B+Tree when both fully cover the predicate, since a single
/// hash lookup beats a B+Tree descent plus an extra residual filter.
fn select_indexes(node: PlanNode, stats: &StatisticsRegistry) -> PlanNode {
    match node {
        PlanNode::Filter { input, predicate } => {
            let input = select_indexes(*input, stats);
            if let PlanNode::Scan {
                source: ScanSource::Table(table_name),
                columns,
            } = &input
            {
                if let Some(table_stats) = stats.get(table_name) {
                    if let Some(bindings) = predicate.equality_bindings() {
                        if let Some(rewritten) =
                            try_index_scan(table_name, columns, &bindings, &table_stats)
                        {
                            return PlanNode::Filter {
                                input: Box::new(rewritten),
                                predicate,
                            };
                        }
                    }
                }
            }
            PlanNode::Filter {
                input: Box::new(input),
                predicate,
            }
        }
        PlanNode::Project { input, items } => PlanNode::Project {
            input: Box::new(select_indexes(*input, stats)),
            items,
        },
        PlanNode::Join {
            left,
            right,
            join_type,
            condition,
        } => PlanNode::Join {
            left: Box::new(select_indexes(*left, stats)),
            right: Box::new(select_indexes(*right, stats)),
            join_type,
            condition,
        },
        PlanNode::Aggregate {
            input,
            group_by,
            aggregates,
            having,
        } => PlanNode::Aggregate {
            input: Box::new(select_indexes(*input, stats)),
            group_by,
            aggregates,
            having,
        },
        PlanNode::Sort { input, keys } => PlanNode::Sort {
            input: Box::new(select_indexes(*input, stats)),
            keys,
        },
        PlanNode::Limit {
            input,
            limit,
            offset,
        } => PlanNode::Limit {
            input: Box::new(select_indexes(*input, stats)),
            limit,
            offset,
        },
        other => other,
    }
}

fn try_index_scan(
    table_name: &str,
    columns: &Option<Vec<String>>,
    bindings: &[(String, crate::value::Value)],
    stats: &TableStatistics,
) -> Option<PlanNode> {
    let bound: HashMap<&str, &crate::value::Value> =
        bindings.iter().map(|(c, v)| (c.as_str(), v)).collect();

    for (index_name, key_columns) in &stats.composite_hash_indexes {
        if key_columns.iter().all(|c| bound.contains_key(c.as_str())) {
            let key_values = key_columns
                .iter()
                .map(|c| (*bound[c.as_str()]).clone())
                .collect();
            return Some(PlanNode::IndexScan {
                source: ScanSource::Table(table_name.to_string()),
                index_name: index_name.clone(),
                strategy: IndexStrategy::CompositeHash,
                key_columns: key_columns.clone(),
                key_values,
                columns: columns.clone(),
            });
        }
    }

    for (column, index_name) in &stats.single_column_indexes {
        if let Some(value) = bound.get(column.as_str()) {
            return Some(PlanNode::IndexScan {
                source: ScanSource::Table(table_name.to_string()),
                index_name: index_name.clone(),
                strategy: IndexStrategy::SingleColumn,
                key_columns: vec![column.clone()],
                key_values: vec![(*value).clone()],
                columns: columns.clone(),
            });
        }
    }
    None
}

/// Exact cost-model formulas. `stats` may be empty for a table the
/// registry hasn't seen yet; in that case rows default to 1000, a
/// deliberately pessimistic placeholder that prefers an index scan over a
/// full scan once one is available.
fn cost_plan(node: &PlanNode, stats: &StatisticsRegistry) -> CostNode {
    match node {
        PlanNode::Scan { source, .. } => {
            let label = source.label();
            let (rows, row_size) = table_dims(source, stats);
            let cost = rows * row_size / 4096.0;
            CostNode::leaf("scan", cost, rows).with_table(label)
        }
        PlanNode::IndexScan {
            source,
            index_name,
            ..
        } => {
            let (rows, _) = table_dims(source, stats);
            let cost = rows.max(1.0).ln() + rows;
            CostNode::leaf("index_scan", cost, rows)
                .with_table(source.label())
                .with_index(index_name.clone())
        }
        PlanNode::Filter { input, .. } => {
            let child = cost_plan(input, stats);
            let rows = child.rows * 0.1;
            let cost = child.cost + child.rows * 0.1;
            CostNode::leaf("filter", cost, rows).with_children(vec![child])
        }
        PlanNode::Project { input, .. } => {
            let child = cost_plan(input, stats);
            let columns = project_column_count(node) as f64;
            let cost = child.cost + child.rows * columns * 0.01;
            CostNode::leaf("project", cost, child.rows).with_children(vec![child])
        }
        PlanNode::Sort { input, .. } => {
            let child = cost_plan(input, stats);
            let cost = child.cost + child.rows * child.rows.max(1.0).ln();
            CostNode::leaf("sort", cost, child.rows).with_children(vec![child])
        }
        PlanNode::Aggregate { input, group_by, .. } => {
            let child = cost_plan(input, stats);
            let cost = child.cost + child.rows * child.rows.max(1.0).ln();
            let rows = if group_by.is_empty() { 1.0 } else { child.rows };
            CostNode::leaf("aggregate", cost, rows).with_children(vec![child])
        }
        PlanNode::Limit { input, limit, .. } => {
            let child = cost_plan(input, stats);
            let rows = limit.map_or(child.rows, |l| child.rows.min(l as f64));
            CostNode::leaf("limit", child.cost, rows).with_children(vec![child])
        }
        PlanNode::Join {
            left, right, join_type, ..
        } => {
            let left_node = cost_plan(left, stats);
            let right_node = cost_plan(right, stats);
            let cost = left_node.cost
                + right_node.cost
                + (left_node.rows * right_node.rows / 10.0) * 0.05;
            let rows = left_node.rows.max(right_node.rows);
            CostNode::leaf("join", cost, rows)
                .with_join(format!("{join_type:?}").to_lowercase())
                .with_children(vec![left_node, right_node])
        }
    }
}

fn table_dims(source: &ScanSource, stats: &StatisticsRegistry) -> (f64, f64) {
    match source {
        ScanSource::Table(name) => stats
            .get(name)
            .map(|s| (s.row_count.max(1) as f64, s.row_size_bytes.max(1) as f64))
            .unwrap_or((1000.0, 64.0)),
        ScanSource::FilePath(_) => (1000.0, 64.0),
    }
}

fn project_column_count(node: &PlanNode) -> usize {
    match node {
        PlanNode::Project { items, .. } => items.len().max(1),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, SchemaField};
    use crate::value::DataType;

    fn table_with_rows(name: &str, n: usize) -> Table {
        let schema = Schema::new(vec![SchemaField::new("id", DataType::Int64)]);
        let mut table = Table::new(name.to_string(), schema);
        for i in 0..n {
            table.insert_row(vec![crate::value::Value::Int64(i as i64)]).unwrap();
        }
        table
    }

    #[test]
    fn projection_pushdown_tightens_scan_columns() {
        let plan = PlanNode::Project {
            input: Box::new(PlanNode::Scan {
                source: ScanSource::Table("t".to_string()),
                columns: None,
            }),
            items: vec![ProjectItem::Column("id".to_string())],
        };
        let pushed = push_projection(plan);
        match pushed {
            PlanNode::Project { input, .. } => match *input {
                PlanNode::Scan { columns, .. } => {
                    assert_eq!(columns, Some(vec!["id".to_string()]));
                }
                _ => panic!("expected scan"),
            },
            _ => panic!("expected project"),
        }
    }

    #[test]
    fn index_selection_rewrites_equality_filter_to_index_scan() {
        let table = table_with_rows("t", 10);
        let mut table = table;
        table.create_btree_index("t_id_idx".to_string(), vec!["id".to_string()]).unwrap();
        let registry = StatisticsRegistry::new();
        registry.refresh_from_table(&table);

        let plan = PlanNode::Filter {
            input: Box::new(PlanNode::Scan {
                source: ScanSource::Table("t".to_string()),
                columns: None,
            }),
            predicate: Expr::Compare {
                op: crate::expr::CompareOp::Eq,
                left: Box::new(Expr::Column("id".to_string())),
                right: Box::new(Expr::Literal(crate::value::Value::Int64(3))),
            },
        };
        let (optimized, explain) = optimize(plan, &registry);
        assert!(explain.contains_label("index_scan"));
        match optimized.root {
            PlanNode::Filter { input, .. } => {
                assert!(matches!(*input, PlanNode::IndexScan { .. }));
            }
            _ => panic!("expected filter wrapping index scan"),
        }
    }

    #[test]
    fn aggregate_without_group_by_produces_one_row() {
        let table = table_with_rows("t", 50);
        let registry = StatisticsRegistry::new();
        registry.refresh_from_table(&table);
        let plan = PlanNode::Aggregate {
            input: Box::new(PlanNode::Scan {
                source: ScanSource::Table("t".to_string()),
                columns: None,
            }),
            group_by: vec![],
            aggregates: vec![],
            having: None,
        };
        let cost = cost_plan(&plan, &registry);
        assert_eq!(cost.rows, 1.0);
    }
}
