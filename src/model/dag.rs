//! Dependency extraction and the model dependency DAG.
//!
//! Dependency extraction is a lightweight text scan, not a full parse:
//! every identifier immediately following a `FROM` or `JOIN` token is
//! treated as a table/model reference, duplicates removed, insertion order
//! preserved. This deliberately over-approximates when the identifier is
//! actually a CTE or subquery alias rather than a real dependency -- a
//! documented limitation, not a bug, since a spurious edge only ever adds a
//! harmless ordering constraint.

use crate::error::ModelError;
use crate::tokenizer::{Keyword, TokenKind, Tokenizer};
use std::collections::{HashMap, HashSet};

pub fn extract_dependencies(sql_text: &str) -> Vec<String> {
    let Ok(tokens) = Tokenizer::new(sql_text).tokenize() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    for window in tokens.windows(2) {
        let is_from_or_join = matches!(
            window[0].kind,
            TokenKind::Keyword(Keyword::From) | TokenKind::Keyword(Keyword::Join)
        );
        if !is_from_or_join {
            continue;
        }
        if let TokenKind::Identifier(name) = &window[1].kind {
            if seen.insert(name.clone()) {
                deps.push(name.clone());
            }
        }
    }
    deps
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    Visiting,
    Done,
}

/// Adjacency-list dependency graph: `name -> [names it depends on]`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Insert `name -> deps`, rejecting the insertion (graph left
    /// unchanged) if it would close a cycle. Three-color DFS: a back edge
    /// from a node still `Visiting` signals a cycle.
    pub fn insert(&mut self, name: String, deps: Vec<String>) -> Result<(), ModelError> {
        let mut trial = self.edges.clone();
        trial.insert(name.clone(), deps);
        if let Some(cyclic_name) = find_cycle(&trial) {
            return Err(ModelError::CircularModelDependency(cyclic_name));
        }
        self.edges = trial;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.edges.remove(name);
        for deps in self.edges.values_mut() {
            deps.retain(|d| d != name);
        }
    }

    /// Topological order plus a grouping where group `k` holds every model
    /// whose longest dependency-chain depth is `k`; models within a group
    /// share no edge between them and may refresh concurrently.
    pub fn topological_groups(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut names: Vec<&str> = self.edges.keys().map(String::as_str).collect();
        names.sort();
        for name in &names {
            compute_depth(name, &self.edges, &mut depth);
        }
        let max_depth = depth.values().copied().max().unwrap_or(0);
        let mut groups = vec![Vec::new(); max_depth + 1];
        for name in names {
            groups[depth[name]].push(name.to_string());
        }
        groups
    }

    pub fn topological_order(&self) -> Vec<String> {
        self.topological_groups().into_iter().flatten().collect()
    }
}

fn compute_depth<'a>(
    name: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    memo: &mut HashMap<&'a str, usize>,
) -> usize {
    if let Some(&d) = memo.get(name) {
        return d;
    }
    let deps = edges.get(name).map(Vec::as_slice).unwrap_or(&[]);
    let depth = deps
        .iter()
        .filter(|d| edges.contains_key(d.as_str()))
        .map(|d| compute_depth(d, edges, memo) + 1)
        .max()
        .unwrap_or(0);
    memo.insert(name, depth);
    depth
}

fn find_cycle(edges: &HashMap<String, Vec<String>>) -> Option<String> {
    let mut color: HashMap<&str, Color> = HashMap::new();
    for name in edges.keys() {
        color.insert(name, Color::Unvisited);
    }
    let names: Vec<&String> = {
        let mut v: Vec<&String> = edges.keys().collect();
        v.sort();
        v
    };
    for name in names {
        if color.get(name.as_str()) == Some(&Color::Unvisited) {
            if let Some(found) = visit(name, edges, &mut color) {
                return Some(found);
            }
        }
    }
    None
}

fn visit<'a>(
    name: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    color: &mut HashMap<&'a str, Color>,
) -> Option<String> {
    color.insert(name, Color::Visiting);
    if let Some(deps) = edges.get(name) {
        for dep in deps {
            let dep_key = edges.get_key_value(dep.as_str()).map(|(k, _)| k.as_str());
            let Some(dep_key) = dep_key else { continue };
            match color.get(dep_key) {
                Some(Color::Visiting) => return Some(name.to_string()),
                Some(Color::Done) => continue,
                _ => {
                    if let Some(found) = visit(dep_key, edges, color) {
                        return Some(found);
                    }
                }
            }
        }
    }
    color.insert(name, Color::Done);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_and_join_targets() {
        let deps = extract_dependencies("SELECT * FROM a JOIN b ON a.id = b.id");
        assert_eq!(deps, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn dedups_preserving_insertion_order() {
        let deps = extract_dependencies("SELECT * FROM a JOIN a ON a.id = a.id JOIN b ON 1=1");
        assert_eq!(deps, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rejects_cycle_and_leaves_graph_unchanged() {
        let mut graph = DependencyGraph::new();
        graph.insert("d".to_string(), vec!["e".to_string()]).unwrap();
        let err = graph
            .insert("e".to_string(), vec!["d".to_string()])
            .unwrap_err();
        assert!(matches!(err, ModelError::CircularModelDependency(_)));
        assert!(graph.contains("d"));
        assert!(!graph.contains("e"));
    }

    #[test]
    fn topological_groups_respect_depth() {
        let mut graph = DependencyGraph::new();
        graph.insert("a".to_string(), vec![]).unwrap();
        graph.insert("b".to_string(), vec!["a".to_string()]).unwrap();
        graph.insert("c".to_string(), vec!["b".to_string()]).unwrap();
        let groups = graph.topological_groups();
        assert_eq!(groups[0], vec!["a".to_string()]);
        assert_eq!(groups[1], vec!["b".to_string()]);
        assert_eq!(groups[2], vec!["c".to_string()]);
    }
}
