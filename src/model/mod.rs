//! Materialized model catalog: named, versioned `SELECT` definitions with
//! dependency tracking, incremental-refresh bookkeeping, and lineage.

pub mod dag;
pub mod lineage;

use crate::error::ModelError;
use dag::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single `CREATE [INCREMENTAL] MODEL` definition plus its run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub sql_text: String,
    pub dependencies: Vec<String>,
    pub last_run_timestamp: Option<i64>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub is_incremental: bool,
    pub partition_column: Option<String>,
    pub last_partition_value: Option<crate::value::Value>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub category: Option<String>,
    pub freshness_threshold_hours: Option<u32>,
    pub data_quality_score: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Model {
    pub fn new(name: String, sql_text: String, is_incremental: bool, created_at: i64) -> Self {
        let dependencies = dag::extract_dependencies(&sql_text);
        Model {
            name,
            sql_text,
            dependencies,
            last_run_timestamp: None,
            row_count: 0,
            execution_time_ms: 0,
            is_incremental,
            partition_column: None,
            last_partition_value: None,
            description: None,
            tags: Vec::new(),
            owner: None,
            category: None,
            freshness_threshold_hours: None,
            data_quality_score: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn is_stale(&self, now: i64) -> bool {
        let Some(threshold_hours) = self.freshness_threshold_hours else {
            return false;
        };
        let Some(last_run) = self.last_run_timestamp else {
            return true;
        };
        let threshold_secs = threshold_hours as i64 * 3600;
        now - last_run > threshold_secs
    }
}

/// Catalog of models plus the dependency DAG derived from their `FROM`/`JOIN`
/// references. Adding a model that would close a cycle is rejected and the
/// registry is left exactly as it was before the attempt.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Model>,
    graph: DependencyGraph,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, model: Model) -> Result<(), ModelError> {
        if self.models.contains_key(&model.name) {
            return Err(ModelError::ModelAlreadyExists(model.name));
        }
        self.graph.insert(model.name.clone(), model.dependencies.clone())?;
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Model, ModelError> {
        let model = self
            .models
            .remove(name)
            .ok_or_else(|| ModelError::ModelNotFound(name.to_string()))?;
        self.graph.remove(name);
        Ok(model)
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Model> {
        self.models.get_mut(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.graph.dependencies_of(name)
    }

    /// Linear refresh order (dependencies always precede their dependents).
    pub fn refresh_order(&self) -> Vec<String> {
        self.graph.topological_order()
    }

    /// Refresh groups: every model in group `k` may run concurrently once
    /// every model in groups `0..k` has finished.
    pub fn refresh_groups(&self) -> Vec<Vec<String>> {
        self.graph.topological_groups()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_a_model_extracts_its_dependencies() {
        let mut registry = ModelRegistry::new();
        registry
            .add(Model::new(
                "orders_summary".to_string(),
                "SELECT * FROM orders".to_string(),
                false,
                0,
            ))
            .unwrap();
        assert_eq!(
            registry.dependencies_of("orders_summary"),
            &["orders".to_string()]
        );
    }

    #[test]
    fn cyclic_model_dependency_is_rejected_and_registry_unchanged() {
        let mut registry = ModelRegistry::new();
        registry
            .add(Model::new("d".to_string(), "SELECT * FROM e".to_string(), false, 0))
            .unwrap();
        let err = registry
            .add(Model::new("e".to_string(), "SELECT * FROM d".to_string(), false, 0))
            .unwrap_err();
        assert!(matches!(err, ModelError::CircularModelDependency(_)));
        assert!(registry.get("d").is_some());
        assert!(registry.get("e").is_none());
    }

    #[test]
    fn refresh_groups_place_dependents_after_dependencies() {
        let mut registry = ModelRegistry::new();
        registry
            .add(Model::new("a".to_string(), "SELECT * FROM raw".to_string(), false, 0))
            .unwrap();
        registry
            .add(Model::new("b".to_string(), "SELECT * FROM a".to_string(), false, 0))
            .unwrap();
        let groups = registry.refresh_groups();
        let a_group = groups.iter().position(|g| g.contains(&"a".to_string())).unwrap();
        let b_group = groups.iter().position(|g| g.contains(&"b".to_string())).unwrap();
        assert!(a_group < b_group);
    }
}
