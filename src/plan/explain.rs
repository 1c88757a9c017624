//! `EXPLAIN` rendering: textual tree, structured JSON, and a Mermaid
//! diagram. All three read from a [`CostNode`] tree, which the optimizer
//! builds while costing the plan (see `crate::optimizer::cost`) so
//! `EXPLAIN` never re-walks the plan to recompute costs.

use serde::Serialize;
use serde_json::json;

/// One costed plan node, already labeled for display. Built by the
/// optimizer alongside (not instead of) the rewritten [`super::PlanNode`].
#[derive(Debug, Clone, Serialize)]
pub struct CostNode {
    #[serde(rename = "type")]
    pub label: String,
    pub cost: f64,
    pub rows: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    pub children: Vec<CostNode>,
}

impl CostNode {
    pub fn leaf(label: impl Into<String>, cost: f64, rows: f64) -> Self {
        CostNode {
            label: label.into(),
            cost,
            rows,
            table: None,
            index: None,
            join: None,
            children: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_join(mut self, join: impl Into<String>) -> Self {
        self.join = Some(join.into());
        self
    }

    pub fn with_children(mut self, children: Vec<CostNode>) -> Self {
        self.children = children;
        self
    }

    /// Whether this node (or any descendant) is an `index_scan` -- used by
    /// tests asserting the optimizer actually chose an index.
    pub fn contains_label(&self, label: &str) -> bool {
        self.label == label || self.children.iter().any(|c| c.contains_label(label))
    }
}

pub fn to_text(node: &CostNode) -> String {
    let mut out = String::new();
    write_text(node, 0, &mut out);
    out
}

fn write_text(node: &CostNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let mut line = format!(
        "{indent}{} (cost={:.2}, rows={:.0})",
        node.label, node.cost, node.rows
    );
    if let Some(t) = &node.table {
        line.push_str(&format!(" table={t}"));
    }
    if let Some(i) = &node.index {
        line.push_str(&format!(" index={i}"));
    }
    if let Some(j) = &node.join {
        line.push_str(&format!(" join={j}"));
    }
    out.push_str(&line);
    out.push('\n');
    for child in &node.children {
        write_text(child, depth + 1, out);
    }
}

pub fn to_json(optimized: bool, total_cost: f64, root: &CostNode) -> serde_json::Value {
    json!({
        "optimized": optimized,
        "total_cost": total_cost,
        "plan": root,
    })
}

/// `graph TD` Mermaid diagram. Left children get a solid edge, right
/// children (the second child of a `join` node) get a dashed one.
pub fn to_mermaid(root: &CostNode) -> String {
    let mut out = String::from("graph TD\n");
    let mut counter = 0usize;
    write_mermaid(root, &mut counter, &mut out);
    out
}

fn write_mermaid(node: &CostNode, counter: &mut usize, out: &mut String) -> usize {
    let id = *counter;
    *counter += 1;
    out.push_str(&format!("  n{id}[\"{}\"]\n", mermaid_label(node)));
    for (i, child) in node.children.iter().enumerate() {
        let child_id = write_mermaid(child, counter, out);
        let is_right_join_child = node.join.is_some() && i == 1;
        if is_right_join_child {
            out.push_str(&format!("  n{id} -.-> n{child_id}\n"));
        } else {
            out.push_str(&format!("  n{id} --> n{child_id}\n"));
        }
    }
    id
}

fn mermaid_label(node: &CostNode) -> String {
    let mut label = format!("{} cost={:.1} rows={:.0}", node.label, node.cost, node.rows);
    if let Some(t) = &node.table {
        label.push_str(&format!(" {t}"));
    }
    if let Some(i) = &node.index {
        label.push_str(&format!(" [{i}]"));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_includes_indentation() {
        let tree = CostNode::leaf("filter", 5.0, 10.0)
            .with_children(vec![CostNode::leaf("scan", 1.0, 100.0).with_table("t")]);
        let text = to_text(&tree);
        assert!(text.contains("filter"));
        assert!(text.contains("  scan"));
    }

    #[test]
    fn json_has_expected_top_level_shape() {
        let tree = CostNode::leaf("scan", 1.0, 10.0).with_table("t");
        let json = to_json(true, 1.0, &tree);
        assert_eq!(json["optimized"], true);
        assert_eq!(json["plan"]["type"], "scan");
    }

    #[test]
    fn mermaid_dashes_right_join_child() {
        let tree = CostNode::leaf("join", 3.0, 10.0)
            .with_join("inner")
            .with_children(vec![
                CostNode::leaf("scan", 1.0, 5.0).with_table("l"),
                CostNode::leaf("scan", 1.0, 5.0).with_table("r"),
            ]);
        let mermaid = to_mermaid(&tree);
        assert!(mermaid.contains("-.->"));
        assert!(mermaid.contains("-->"));
    }
}
