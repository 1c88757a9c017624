//! Logical plan tree and `EXPLAIN` rendering.
//!
//! The parser builds this tree directly out of clause order (`Scan`/
//! `IndexScan` -> `Join?` -> `Filter?` -> `Project?`, wrapped by
//! `Aggregate?` -> `Sort?` -> `Limit?`); the optimizer rewrites it in place
//! (see `crate::optimizer`) before the executor walks it bottom-up.

pub mod explain;

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    SingleColumn,
    CompositeHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggFunc,
    /// `None` only for `COUNT(*)`.
    pub column: Option<String>,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectItem {
    Column(String),
    Star,
}

/// A source for `Scan`: either a registered table by name, or a file path
/// to be loaded through the format registry into a transient table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    Table(String),
    FilePath(String),
}

impl ScanSource {
    pub fn label(&self) -> String {
        match self {
            ScanSource::Table(name) => name.clone(),
            ScanSource::FilePath(path) => path.clone(),
        }
    }
}

/// The logical operator tree. `Box`-owned subtrees; predicate/projection
/// expressions are owned by the node that carries them (one query, one
/// owning tree -- nothing here is shared).
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan {
        source: ScanSource,
        columns: Option<Vec<String>>,
    },
    IndexScan {
        source: ScanSource,
        index_name: String,
        strategy: IndexStrategy,
        key_columns: Vec<String>,
        key_values: Vec<crate::value::Value>,
        columns: Option<Vec<String>>,
    },
    Filter {
        input: Box<PlanNode>,
        predicate: Expr,
    },
    Project {
        input: Box<PlanNode>,
        items: Vec<ProjectItem>,
    },
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        join_type: JoinType,
        condition: JoinCondition,
    },
    Aggregate {
        input: Box<PlanNode>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
        having: Option<Expr>,
    },
    Sort {
        input: Box<PlanNode>,
        keys: Vec<SortKey>,
    },
    Limit {
        input: Box<PlanNode>,
        limit: Option<usize>,
        offset: usize,
    },
}

impl PlanNode {
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::Scan { .. } | PlanNode::IndexScan { .. } => vec![],
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Aggregate { input, .. }
            | PlanNode::Sort { input, .. }
            | PlanNode::Limit { input, .. } => vec![input],
            PlanNode::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Every base table/file this plan reads from, left-to-right,
    /// duplicates included -- used by the "same table list" testable
    /// property between `explain` and `execute`.
    pub fn referenced_sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_sources(&mut out);
        out
    }

    fn collect_sources(&self, out: &mut Vec<String>) {
        match self {
            PlanNode::Scan { source, .. } | PlanNode::IndexScan { source, .. } => {
                out.push(source.label())
            }
            _ => {
                for child in self.children() {
                    child.collect_sources(out);
                }
            }
        }
    }
}

/// A plan plus the optimizer's verdict: whether rewrite rules applied and
/// the bottom-up estimated total cost.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub root: PlanNode,
    pub optimized: bool,
    pub total_cost: f64,
}
