//! The top-level handle applications embed: table/view/model/type/function
//! catalogs, optimizer statistics, the scheduler, the audit log, and
//! statement dispatch. `Database` is the single [`executor::Catalog`]
//! implementation in the crate; every other layer only ever sees it
//! through that trait.

use crate::audit::{AuditEvent, AuditLog, AuditOperation};
use crate::config::Config;
use crate::error::{ExecutionError, GrizzlyError, ModelError, Result, SchemaError};
use crate::executor::{self, CancellationToken, Catalog};
use crate::incremental;
use crate::model::{Model, ModelRegistry};
use crate::optimizer::{self, StatisticsRegistry};
use crate::parser::{
    self, CompressionKind, PlFunctionKind, RefreshTarget, SelectQuery, ShowTarget, Statement,
    TypeDef,
};
use crate::plan::explain;
use crate::plan::{PlanNode, ProjectItem, ScanSource};
use crate::scheduler::Scheduler;
use crate::schema::Schema;
use crate::table::Table;
use crate::value::{DataType, Value};
use crate::{artifact, format};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// A `CREATE [MATERIALIZED] VIEW` definition. Non-materialized views keep
/// only their source text, re-parsed and inlined wherever they are
/// referenced (the same treatment as a `WITH` CTE); materialized views also
/// own a row-backed [`Table`] under the same name in the table catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub materialized: bool,
    pub query_text: String,
}

/// A table's rows, stripped of its (non-serializable, positional) indexes.
/// `SAVE`/`LOAD` round-trips data, not derived index structures -- a host
/// application that wants indexes back after `LOAD` re-issues the same
/// `Table::create_btree_index`/`create_composite_hash_index` calls it used
/// to build them, same as it would after any fresh `CREATE TABLE`.
#[derive(Debug, Serialize, Deserialize)]
struct TableSnapshot {
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub args: Vec<(String, DataType)>,
    pub returns: DataType,
    pub kind: PlFunctionKind,
    pub body: String,
}

/// One row of an `EXPLAIN` result: the three renderings spec'd for the
/// planner's cost output, all built from the same [`CostNode`].
pub struct ExplainOutput {
    pub text: String,
    pub json: serde_json::Value,
    pub mermaid: String,
    pub optimized: bool,
    pub total_cost: f64,
}

/// What a single statement produced. `SELECT`, `CREATE TABLE AS SELECT`,
/// and materialized view refreshes all hand back rows; everything else
/// reports how many rows it touched or a short human-readable message.
#[derive(Debug)]
pub enum StatementOutcome {
    Rows(Table),
    RowsAffected(usize),
    Message(String),
}

/// The durable part of a [`Database`]: everything `SAVE`/`LOAD` round-trips.
/// Deliberately narrower than `Database` itself -- the scheduler's worker
/// thread and the audit log's in-memory ring buffer are runtime-only and
/// are rebuilt fresh on `LOAD`, not serialized.
#[derive(Debug, Serialize, Deserialize)]
struct DatabaseSnapshot {
    name: String,
    tables: HashMap<String, TableSnapshot>,
    views: HashMap<String, ViewDefinition>,
    models: Vec<Model>,
    types: HashMap<String, TypeDef>,
    functions: HashMap<String, FunctionDefinition>,
    config: Config,
}

/// An embedded analytical database: one table catalog plus everything that
/// compiles and schedules queries against it.
pub struct Database {
    name: String,
    tables: HashMap<String, Table>,
    views: HashMap<String, ViewDefinition>,
    models: ModelRegistry,
    types: HashMap<String, TypeDef>,
    functions: HashMap<String, FunctionDefinition>,
    scheduler: Scheduler,
    stats: StatisticsRegistry,
    audit: AuditLog,
    config: Config,
    /// Databases reached through `ATTACH DATABASE ... AS alias`. Attachment
    /// is a host-application concern, not a SQL-grammar one: the tokenizer
    /// never produces a qualified `alias.table` identifier (`.` always
    /// lexes as a standalone `Dot` token, and `FROM` only ever accepts a
    /// bare table name or a file-path string), so there is no reachable
    /// `FROM alias.table` syntax to wire this into. `attached()` exists for
    /// callers that want to reach into a sibling database programmatically.
    attached: HashMap<String, Database>,
}

impl Database {
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let tick_interval = Duration::from_millis(config.scheduler.tick_interval_ms);
        Database {
            name: name.into(),
            tables: HashMap::new(),
            views: HashMap::new(),
            models: ModelRegistry::new(),
            types: HashMap::new(),
            functions: HashMap::new(),
            scheduler: Scheduler::start(tick_interval),
            stats: StatisticsRegistry::new(),
            audit: AuditLog::default(),
            config,
            attached: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// A database reached through a prior `ATTACH`, by its alias.
    pub fn attached(&self, alias: &str) -> Option<&Database> {
        self.attached.get(alias)
    }

    pub fn attached_aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.attached.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    /// Parses `source` into statements and runs each one in order,
    /// returning one outcome per statement. A failing statement stops the
    /// batch; statements before it have already taken effect (each
    /// statement is its own unit of atomicity, not the whole batch).
    pub fn execute_sql(&mut self, source: &str) -> Result<Vec<StatementOutcome>> {
        let statements = parser::parse(source)?;
        let cancel = CancellationToken::new();
        statements
            .into_iter()
            .map(|stmt| self.execute_statement(stmt, &cancel))
            .collect()
    }

    pub fn execute_statement(
        &mut self,
        stmt: Statement,
        cancel: &CancellationToken,
    ) -> Result<StatementOutcome> {
        match stmt {
            Statement::Select(query) => {
                let table = self.run_select(query, cancel)?;
                Ok(StatementOutcome::Rows(table))
            }
            Statement::CreateTable { name, schema } => self.create_table(name, schema),
            Statement::CreateTableAsSelect { name, query } => {
                self.create_table_as_select(name, query, cancel)
            }
            Statement::CreateView {
                name,
                materialized,
                query_text,
            } => self.create_view(name, materialized, query_text, cancel),
            Statement::CreateModel {
                name,
                sql_text,
                incremental,
                partition_column,
            } => self.create_model(name, sql_text, incremental, partition_column),
            Statement::CreateType { name, def } => self.create_type(name, def),
            Statement::CreateFunction {
                name,
                args,
                returns,
                kind,
                body,
            } => self.create_function(name, args, returns, kind, body),
            Statement::CreateSchedule {
                id,
                model_name,
                cron_expression,
                max_retries,
            } => self.create_schedule(id, model_name, cron_expression, max_retries),
            Statement::InsertInto { table, values } => self.insert_into(table, values),
            Statement::DropSchedule { id } => self.drop_schedule(id),
            Statement::Refresh(target) => self.refresh(target, cancel),
            Statement::Show(target) => self.show(target),
            Statement::DescribeType { name } => self.describe_type(name),
            Statement::Save { path, compression } => self.save(path, compression),
            Statement::Load { path } => self.load(path),
            Statement::Attach { path, alias } => self.attach(path, alias),
            Statement::Detach { alias } => self.detach(alias),
        }
    }

    /// Runs `EXPLAIN`-worthy analysis of a query without executing it: the
    /// same resolve-then-optimize path `run_select` takes, stopping short
    /// of `executor::execute`.
    pub fn explain(&self, query: SelectQuery) -> Result<ExplainOutput> {
        let resolved = self.resolve_plan(query)?;
        self.refresh_stats_for_plan(&resolved);
        let (plan, cost) = optimizer::optimize(resolved, &self.stats);
        Ok(ExplainOutput {
            text: explain::to_text(&cost),
            json: explain::to_json(plan.optimized, plan.total_cost, &cost),
            mermaid: explain::to_mermaid(&cost),
            optimized: plan.optimized,
            total_cost: plan.total_cost,
        })
    }

    fn run_select(&mut self, query: SelectQuery, cancel: &CancellationToken) -> Result<Table> {
        let resolved = self.resolve_plan(query)?;
        self.refresh_stats_for_plan(&resolved);
        let (plan, cost) = optimizer::optimize(resolved, &self.stats);
        let result = executor::execute(&plan.root, self, cancel)?;
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Optimizer,
            subject: "query".to_string(),
            message: format!("cost={:.2} rows={}", plan.total_cost, result.row_count()),
            rows_affected: Some(result.row_count()),
            plan_excerpt: Some(explain::to_text(&cost)),
        });
        Ok(result)
    }

    fn resolve_plan(&self, query: SelectQuery) -> Result<PlanNode> {
        let ctes: HashMap<String, String> = query.ctes.into_iter().collect();
        let mut visiting = HashSet::new();
        self.resolve_virtual_relations(query.plan, &ctes, &mut visiting)
    }

    /// Inlines `FROM`/`JOIN` references to CTEs and non-materialized views
    /// by re-parsing their captured source text in place of the `Scan`
    /// that names them. References to real tables (and materialized views,
    /// which live in the table catalog like any other table) pass through
    /// untouched. `visiting` catches a CTE/view that (directly or
    /// transitively) references itself.
    fn resolve_virtual_relations(
        &self,
        node: PlanNode,
        ctes: &HashMap<String, String>,
        visiting: &mut HashSet<String>,
    ) -> Result<PlanNode> {
        match node {
            PlanNode::Scan {
                source: ScanSource::Table(name),
                columns,
            } => {
                if self.tables.contains_key(&name) {
                    return Ok(PlanNode::Scan {
                        source: ScanSource::Table(name),
                        columns,
                    });
                }
                let source_text = ctes.get(&name).cloned().or_else(|| {
                    self.views
                        .get(&name)
                        .filter(|view| !view.materialized)
                        .map(|view| view.query_text.clone())
                });
                let Some(source_text) = source_text else {
                    return Ok(PlanNode::Scan {
                        source: ScanSource::Table(name),
                        columns,
                    });
                };
                if !visiting.insert(name.clone()) {
                    return Err(GrizzlyError::Model(ModelError::CircularCTEReference(name)));
                }
                let inner_query = parse_embedded_select(&source_text, &name)?;
                let mut inner_ctes = ctes.clone();
                for (cte_name, cte_text) in inner_query.ctes {
                    inner_ctes.entry(cte_name).or_insert(cte_text);
                }
                let inner = self.resolve_virtual_relations(inner_query.plan, &inner_ctes, visiting)?;
                visiting.remove(&name);
                Ok(match columns {
                    Some(cols) => PlanNode::Project {
                        input: Box::new(inner),
                        items: cols.into_iter().map(ProjectItem::Column).collect(),
                    },
                    None => inner,
                })
            }
            PlanNode::Scan { source, columns } => Ok(PlanNode::Scan { source, columns }),
            PlanNode::IndexScan { .. } => Ok(node),
            PlanNode::Filter { input, predicate } => Ok(PlanNode::Filter {
                input: Box::new(self.resolve_virtual_relations(*input, ctes, visiting)?),
                predicate,
            }),
            PlanNode::Project { input, items } => Ok(PlanNode::Project {
                input: Box::new(self.resolve_virtual_relations(*input, ctes, visiting)?),
                items,
            }),
            PlanNode::Join {
                left,
                right,
                join_type,
                condition,
            } => Ok(PlanNode::Join {
                left: Box::new(self.resolve_virtual_relations(*left, ctes, visiting)?),
                right: Box::new(self.resolve_virtual_relations(*right, ctes, visiting)?),
                join_type,
                condition,
            }),
            PlanNode::Aggregate {
                input,
                group_by,
                aggregates,
                having,
            } => Ok(PlanNode::Aggregate {
                input: Box::new(self.resolve_virtual_relations(*input, ctes, visiting)?),
                group_by,
                aggregates,
                having,
            }),
            PlanNode::Sort { input, keys } => Ok(PlanNode::Sort {
                input: Box::new(self.resolve_virtual_relations(*input, ctes, visiting)?),
                keys,
            }),
            PlanNode::Limit {
                input,
                limit,
                offset,
            } => Ok(PlanNode::Limit {
                input: Box::new(self.resolve_virtual_relations(*input, ctes, visiting)?),
                limit,
                offset,
            }),
        }
    }

    /// Populates the statistics registry for every base table a plan
    /// touches, so the optimizer never costs a table it has not seen yet.
    fn refresh_stats_for_plan(&self, plan: &PlanNode) {
        for source in plan.referenced_sources() {
            if let Some(table) = self.tables.get(&source) {
                self.stats.refresh_from_table(table);
            }
        }
    }

    fn create_table(&mut self, name: String, schema: Schema) -> Result<StatementOutcome> {
        if self.tables.contains_key(&name) || self.views.contains_key(&name) {
            return Err(GrizzlyError::Schema(SchemaError::TableAlreadyExists(name)));
        }
        self.tables.insert(name.clone(), Table::new(name.clone(), schema));
        self.audit.record(ddl_event(&name, "created table"));
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn create_table_as_select(
        &mut self,
        name: String,
        query: SelectQuery,
        cancel: &CancellationToken,
    ) -> Result<StatementOutcome> {
        if self.tables.contains_key(&name) || self.views.contains_key(&name) {
            return Err(GrizzlyError::Schema(SchemaError::TableAlreadyExists(name)));
        }
        let result = self.run_select(query, cancel)?;
        let row_count = result.row_count();
        let mut table = Table::new(name.clone(), result.schema().clone());
        for row in result.rows() {
            table.insert_row(row)?;
        }
        self.stats.refresh_from_table(&table);
        self.tables.insert(name.clone(), table);
        self.audit.record(ddl_event(&name, "created table from query"));
        Ok(StatementOutcome::RowsAffected(row_count))
    }

    fn create_view(
        &mut self,
        name: String,
        materialized: bool,
        query_text: String,
        cancel: &CancellationToken,
    ) -> Result<StatementOutcome> {
        if self.tables.contains_key(&name) || self.views.contains_key(&name) {
            return Err(GrizzlyError::Schema(SchemaError::TableAlreadyExists(name)));
        }
        if materialized {
            let query = parse_embedded_select(&query_text, &name)?;
            let result = self.run_select(query, cancel)?;
            let mut table = Table::new(name.clone(), result.schema().clone());
            for row in result.rows() {
                table.insert_row(row)?;
            }
            self.stats.refresh_from_table(&table);
            self.tables.insert(name.clone(), table);
        }
        self.views.insert(
            name.clone(),
            ViewDefinition {
                materialized,
                query_text,
            },
        );
        self.audit.record(ddl_event(
            &name,
            if materialized {
                "created materialized view"
            } else {
                "created view"
            },
        ));
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn create_model(
        &mut self,
        name: String,
        sql_text: String,
        incremental: bool,
        partition_column: Option<String>,
    ) -> Result<StatementOutcome> {
        let now = chrono::Utc::now().timestamp();
        let mut model = Model::new(name.clone(), sql_text, incremental, now);
        model.partition_column = partition_column;
        self.models.add(model)?;
        self.audit.record(ddl_event(&name, "created model"));
        Ok(StatementOutcome::RowsAffected(0))
    }

    /// Types and functions have no dedicated "already exists" error in this
    /// engine (unlike tables and models): redefining one overwrites the
    /// prior definition, the same `CREATE OR REPLACE`-style leniency the
    /// rest of the DDL surface reserves for views.
    fn create_type(&mut self, name: String, def: TypeDef) -> Result<StatementOutcome> {
        self.types.insert(name.clone(), def);
        self.audit.record(ddl_event(&name, "created type"));
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn create_function(
        &mut self,
        name: String,
        args: Vec<(String, DataType)>,
        returns: DataType,
        kind: PlFunctionKind,
        body: String,
    ) -> Result<StatementOutcome> {
        self.functions.insert(
            name.clone(),
            FunctionDefinition {
                args,
                returns,
                kind,
                body,
            },
        );
        self.audit.record(ddl_event(&name, "created function"));
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn create_schedule(
        &mut self,
        id: String,
        model_name: String,
        cron_expression: String,
        max_retries: u32,
    ) -> Result<StatementOutcome> {
        if self.models.get(&model_name).is_none() {
            return Err(GrizzlyError::Model(ModelError::ModelNotFound(model_name)));
        }
        let now = chrono::Utc::now().naive_utc();
        let schedule = crate::scheduler::Schedule::new(
            id.clone(),
            model_name.clone(),
            cron_expression,
            max_retries,
            now,
        )
        .map_err(GrizzlyError::from)?;
        self.scheduler.add_schedule(schedule);
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Schedule,
            subject: id,
            message: format!("schedule armed for model {model_name}"),
            rows_affected: None,
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn insert_into(&mut self, name: String, values: Vec<Vec<Value>>) -> Result<StatementOutcome> {
        let table = self
            .tables
            .get(&name)
            .ok_or_else(|| SchemaError::TableNotFound(name.clone()))?;
        let schema = table.schema().clone();
        let mut coerced_rows = Vec::with_capacity(values.len());
        for row in values {
            if row.len() != schema.len() {
                return Err(GrizzlyError::Schema(SchemaError::ColumnCountMismatch {
                    expected: schema.len(),
                    found: row.len(),
                }));
            }
            let mut coerced = Vec::with_capacity(row.len());
            for (value, field) in row.into_iter().zip(schema.fields()) {
                let value = value.coerce_to(&field.data_type);
                if value.data_type() != field.data_type {
                    return Err(GrizzlyError::Schema(SchemaError::TypeMismatch {
                        expected: field.data_type.to_string(),
                        found: value.data_type().to_string(),
                    }));
                }
                coerced.push(value);
            }
            coerced_rows.push(coerced);
        }

        let row_count = coerced_rows.len();
        let table = self.tables.get_mut(&name).expect("checked above");
        for row in coerced_rows {
            table.insert_row(row)?;
        }
        self.stats.refresh_from_table(table);
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Dml,
            subject: name,
            message: format!("inserted {row_count} row(s)"),
            rows_affected: Some(row_count),
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(row_count))
    }

    fn drop_schedule(&mut self, id: String) -> Result<StatementOutcome> {
        self.scheduler.drop_schedule(&id);
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Schedule,
            subject: id,
            message: "schedule dropped".to_string(),
            rows_affected: None,
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn refresh(&mut self, target: RefreshTarget, cancel: &CancellationToken) -> Result<StatementOutcome> {
        match target {
            RefreshTarget::MaterializedView(name) => {
                let view = self
                    .views
                    .get(&name)
                    .ok_or_else(|| SchemaError::TableNotFound(name.clone()))?;
                if !view.materialized {
                    return Err(GrizzlyError::Schema(SchemaError::TableNotFound(name)));
                }
                let query = parse_embedded_select(&view.query_text, &name)?;
                let result = self.run_select(query, cancel)?;
                let row_count = result.row_count();
                let mut table = Table::new(name.clone(), result.schema().clone());
                for row in result.rows() {
                    table.insert_row(row)?;
                }
                self.stats.refresh_from_table(&table);
                self.tables.insert(name.clone(), table);
                self.audit.record(AuditEvent {
                    timestamp: chrono::Utc::now().timestamp(),
                    operation: AuditOperation::Refresh,
                    subject: name,
                    message: format!("materialized view refreshed, {row_count} row(s)"),
                    rows_affected: Some(row_count),
                    plan_excerpt: None,
                });
                Ok(StatementOutcome::RowsAffected(row_count))
            }
            RefreshTarget::Model(name) => {
                let mut model = self.models.remove(&name)?;
                let is_incremental = model.is_incremental;
                let outcome = incremental::refresh(&mut model, self, cancel);
                // Always put the model back, even on failure, so a refresh
                // error never leaves the registry (and its place in the
                // dependency graph) silently missing the model.
                let readd = self.models.add(model);
                let outcome = outcome?;
                readd?;
                // A model is a named SELECT whose result is a table: other
                // models and ad-hoc queries scan it by name like any other,
                // so a refresh materializes its delta the same way a
                // materialized view's refresh does. Incremental models grow
                // their backing table by appending the delta; a full
                // recompute replaces it outright.
                if is_incremental && self.tables.contains_key(&name) {
                    let existing = self.tables.get_mut(&name).expect("checked above");
                    for row in outcome.delta.rows() {
                        existing.insert_row(row)?;
                    }
                    self.stats.refresh_from_table(existing);
                } else {
                    let mut table = Table::new(name.clone(), outcome.delta.schema().clone());
                    for row in outcome.delta.rows() {
                        table.insert_row(row)?;
                    }
                    self.stats.refresh_from_table(&table);
                    self.tables.insert(name.clone(), table);
                }
                self.audit.record(AuditEvent {
                    timestamp: chrono::Utc::now().timestamp(),
                    operation: AuditOperation::Refresh,
                    subject: name,
                    message: format!(
                        "model refreshed in {}ms, {} row(s)",
                        outcome.execution_time_ms,
                        outcome.delta.row_count()
                    ),
                    rows_affected: Some(outcome.delta.row_count()),
                    plan_excerpt: None,
                });
                Ok(StatementOutcome::RowsAffected(outcome.delta.row_count()))
            }
        }
    }

    /// Refreshes every model, respecting the dependency DAG: each group
    /// runs only after every group before it has completed. Stops at the
    /// first model whose refresh fails, leaving later groups un-run.
    pub fn refresh_all_models(&mut self, cancel: &CancellationToken) -> Result<usize> {
        let groups = self.models.refresh_groups();
        let mut total = 0;
        for group in groups {
            for model_name in group {
                let outcome = self.refresh(RefreshTarget::Model(model_name), cancel)?;
                if let StatementOutcome::RowsAffected(n) = outcome {
                    total += n;
                }
            }
        }
        Ok(total)
    }

    fn show(&self, target: ShowTarget) -> Result<StatementOutcome> {
        match target {
            ShowTarget::LineageForModel(name) => {
                let upstream = self.transitive_dependencies(&name);
                Ok(StatementOutcome::Message(format!(
                    "{name} <- [{}]",
                    upstream.join(", ")
                )))
            }
            ShowTarget::DependenciesForModel(name) => {
                let direct = self.models.dependencies_of(&name);
                Ok(StatementOutcome::Message(format!(
                    "{name} depends directly on [{}]",
                    direct.join(", ")
                )))
            }
            ShowTarget::LineageForColumn { table, column } => {
                let model = self
                    .models
                    .get(&table)
                    .ok_or_else(|| ModelError::ModelNotFound(table.clone()))?;
                match crate::model::lineage::lineage_for_column(&model.sql_text, &column) {
                    Some(sources) => Ok(StatementOutcome::Message(format!(
                        "{table}.{column} <- [{}]",
                        sources.join(", ")
                    ))),
                    None => Ok(StatementOutcome::Message(format!(
                        "{table}.{column}: no lineage found"
                    ))),
                }
            }
            ShowTarget::Schedules => {
                let lines: Vec<String> = self
                    .scheduler
                    .list_schedules()
                    .into_iter()
                    .map(|s| {
                        format!(
                            "{} -> {} [{:?}] next_fire={}",
                            s.id, s.model_name, s.state, s.next_fire
                        )
                    })
                    .collect();
                Ok(StatementOutcome::Message(lines.join("\n")))
            }
            ShowTarget::Databases => {
                let mut names = vec![self.name.clone()];
                names.extend(self.attached.keys().cloned());
                Ok(StatementOutcome::Message(names.join(", ")))
            }
            ShowTarget::Types => {
                let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
                names.sort_unstable();
                Ok(StatementOutcome::Message(names.join(", ")))
            }
        }
    }

    /// Full upstream closure of `name`'s dependencies, in breadth-first
    /// discovery order. A model with no dependents of its own contributes
    /// nothing further; cycles cannot occur here since the registry
    /// refuses to admit one.
    fn transitive_dependencies(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue: Vec<String> = self.models.dependencies_of(name).to_vec();
        let mut order = Vec::new();
        while let Some(dep) = queue.pop() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            order.push(dep.clone());
            queue.extend(self.models.dependencies_of(&dep).to_vec());
        }
        order
    }

    fn describe_type(&self, name: String) -> Result<StatementOutcome> {
        let def = self
            .types
            .get(&name)
            .ok_or_else(|| GrizzlyError::Config(format!("no such type: {name}")))?;
        let message = match def {
            TypeDef::Enum(variants) => format!("enum {name} {{ {} }}", variants.join(", ")),
            TypeDef::Struct(fields) => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(field_name, dt)| format!("{field_name}: {dt}"))
                    .collect();
                format!("struct {name} {{ {} }}", fields.join(", "))
            }
            TypeDef::Alias(dt) => format!("type {name} = {dt}"),
        };
        Ok(StatementOutcome::Message(message))
    }

    fn save(&self, path: String, compression: CompressionKind) -> Result<StatementOutcome> {
        let tables = self
            .tables
            .iter()
            .map(|(name, table)| {
                (
                    name.clone(),
                    TableSnapshot {
                        schema: table.schema().clone(),
                        rows: table.rows().collect(),
                    },
                )
            })
            .collect();
        let models = self
            .models
            .names()
            .into_iter()
            .filter_map(|n| self.models.get(n).cloned())
            .collect();
        let snapshot = DatabaseSnapshot {
            name: self.name.clone(),
            tables,
            views: self.views.clone(),
            models,
            types: self.types.clone(),
            functions: self.functions.clone(),
            config: self.config.clone(),
        };
        let bytes = artifact::serialize(&snapshot, compression)?;
        artifact::write_new_file(Path::new(&path), &bytes)?;
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Attach,
            subject: path,
            message: "database saved".to_string(),
            rows_affected: None,
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn load(&mut self, path: String) -> Result<StatementOutcome> {
        let loaded = Database::load_snapshot(&path)?;
        *self = loaded;
        Ok(StatementOutcome::RowsAffected(0))
    }

    /// Reads a snapshot from `path` into a freshly started `Database`
    /// (its own scheduler thread, its own empty audit log).
    fn load_snapshot(path: &str) -> Result<Database> {
        let bytes = artifact::read_file(Path::new(path))?;
        let snapshot: DatabaseSnapshot = artifact::deserialize(&bytes)?;
        let mut db = Database::new(snapshot.name, snapshot.config);
        for (name, table_snapshot) in snapshot.tables {
            let mut table = Table::new(name.clone(), table_snapshot.schema);
            for row in table_snapshot.rows {
                table.insert_row(row)?;
            }
            db.tables.insert(name, table);
        }
        db.views = snapshot.views;
        db.types = snapshot.types;
        db.functions = snapshot.functions;
        for table in db.tables.values() {
            db.stats.refresh_from_table(table);
        }
        for model in snapshot.models {
            db.models.add(model)?;
        }
        Ok(db)
    }

    fn attach(&mut self, path: String, alias: String) -> Result<StatementOutcome> {
        let attached = Database::load_snapshot(&path)?;
        self.attached.insert(alias.clone(), attached);
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Attach,
            subject: alias,
            message: format!("attached from {path}"),
            rows_affected: None,
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(0))
    }

    fn detach(&mut self, alias: String) -> Result<StatementOutcome> {
        if self.attached.remove(&alias).is_none() {
            return Err(GrizzlyError::Config(format!("no attached database named {alias}")));
        }
        self.audit.record(AuditEvent {
            timestamp: chrono::Utc::now().timestamp(),
            operation: AuditOperation::Attach,
            subject: alias,
            message: "detached".to_string(),
            rows_affected: None,
            plan_excerpt: None,
        });
        Ok(StatementOutcome::RowsAffected(0))
    }
}

impl Catalog for Database {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn load_file(&self, path: &str) -> std::result::Result<Table, ExecutionError> {
        format::load_file(Path::new(path)).map_err(|e| ExecutionError::InvalidExpression(e.to_string()))
    }
}

fn ddl_event(subject: &str, message: &str) -> AuditEvent {
    AuditEvent {
        timestamp: chrono::Utc::now().timestamp(),
        operation: AuditOperation::Ddl,
        subject: subject.to_string(),
        message: message.to_string(),
        rows_affected: None,
        plan_excerpt: None,
    }
}

/// Re-parses `source_text` (a CTE body, a view body, or anything else kept
/// as re-parseable text) and returns its single `SELECT`.
fn parse_embedded_select(source_text: &str, label: &str) -> Result<SelectQuery> {
    let statements = parser::parse(source_text)?;
    statements
        .into_iter()
        .find_map(|stmt| match stmt {
            Statement::Select(query) => Some(query),
            _ => None,
        })
        .ok_or_else(|| GrizzlyError::Model(ModelError::ModelNotFound(format!("{label} has no SELECT body"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::new("test", Config::default())
    }

    #[test]
    fn create_table_then_insert_then_select_round_trips_rows() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64, b string)").unwrap();
        db.execute_sql("INSERT INTO t VALUES (1, 'x'), (2, 'y')").unwrap();
        let outcomes = db.execute_sql("SELECT a, b FROM t").unwrap();
        match &outcomes[0] {
            StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 2),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn creating_the_same_table_twice_is_rejected() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64)").unwrap();
        let err = db.execute_sql("CREATE TABLE t (a int64)").unwrap_err();
        assert!(matches!(err, GrizzlyError::Schema(SchemaError::TableAlreadyExists(_))));
    }

    #[test]
    fn insert_rejects_column_count_mismatch_without_touching_the_table() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64, b int64)").unwrap();
        let err = db.execute_sql("INSERT INTO t VALUES (1)").unwrap_err();
        assert!(matches!(err, GrizzlyError::Schema(SchemaError::ColumnCountMismatch { .. })));
        let outcomes = db.execute_sql("SELECT a FROM t").unwrap();
        match &outcomes[0] {
            StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 0),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn non_materialized_view_is_inlined_at_query_time() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64)").unwrap();
        db.execute_sql("INSERT INTO t VALUES (1), (2), (3)").unwrap();
        db.execute_sql("CREATE VIEW v AS SELECT a FROM t WHERE a > 1").unwrap();
        let outcomes = db.execute_sql("SELECT a FROM v").unwrap();
        match &outcomes[0] {
            StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 2),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn self_referencing_view_is_rejected_as_a_cycle() {
        let mut db = test_db();
        let err = db
            .execute_sql("CREATE VIEW v AS SELECT a FROM v")
            .and_then(|_| db.execute_sql("SELECT a FROM v"))
            .unwrap_err();
        assert!(matches!(err, GrizzlyError::Model(ModelError::CircularCTEReference(_))));
    }

    #[test]
    fn model_refresh_survives_in_the_registry_on_success() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64)").unwrap();
        db.execute_sql("INSERT INTO t VALUES (1), (2)").unwrap();
        db.execute_sql("CREATE MODEL m AS SELECT a FROM t").unwrap();
        db.execute_sql("REFRESH MODEL m").unwrap();
        assert_eq!(db.model("m").unwrap().row_count, 2);
    }

    #[test]
    fn save_then_load_preserves_table_contents() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64)").unwrap();
        db.execute_sql("INSERT INTO t VALUES (1), (2), (3)").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.grizzly");
        db.save(path.to_str().unwrap().to_string(), CompressionKind::Zstd)
            .unwrap();

        let mut fresh = test_db();
        fresh.load(path.to_str().unwrap().to_string()).unwrap();
        let outcomes = fresh.execute_sql("SELECT a FROM t").unwrap();
        match &outcomes[0] {
            StatementOutcome::Rows(table) => assert_eq!(table.row_count(), 3),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn attach_exposes_the_other_database_programmatically() {
        let mut producer = test_db();
        producer.execute_sql("CREATE TABLE t (a int64)").unwrap();
        producer.execute_sql("INSERT INTO t VALUES (7)").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.grizzly");
        producer
            .save(path.to_str().unwrap().to_string(), CompressionKind::None)
            .unwrap();

        let mut db = test_db();
        db.execute_sql(&format!("ATTACH DATABASE '{}' AS other", path.display()))
            .unwrap();
        let other = db.attached("other").unwrap();
        assert_eq!(other.table("t").unwrap().row_count(), 1);

        db.execute_sql("DETACH DATABASE other").unwrap();
        assert!(db.attached("other").is_none());
    }

    #[test]
    fn explain_reports_the_scanned_table_in_its_text_rendering() {
        let mut db = test_db();
        db.execute_sql("CREATE TABLE t (a int64)").unwrap();
        let statements = parser::parse("SELECT a FROM t").unwrap();
        let query = match statements.into_iter().next().unwrap() {
            Statement::Select(q) => q,
            _ => unreachable!(),
        };
        let explained = db.explain(query).unwrap();
        assert!(explained.text.contains('t'));
    }
}
