//! Debugging aids: counters, timings and Graphviz export.

use std::fmt::Write as _;

use serde::Serialize;

use crate::graph::{Depsgraph, DepsNode, EvalStats, NodeRef, RelationFlags};

/// Size of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub id_nodes: usize,
    pub components: usize,
    pub operations: usize,
    pub relations: usize,
    pub cyclic_relations: usize,
    pub entry_tags: usize,
    /// Operations without an evaluate callback.
    pub noop_operations: usize,
}

/// Accumulated evaluation timing of one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationTiming {
    pub identifier: String,
    pub stats: EvalStats,
}

impl Depsgraph {
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            id_nodes: self.id_nodes.len(),
            components: self.components.len(),
            operations: self.operation_count(),
            relations: self.relation_count(),
            cyclic_relations: self.relations().filter(|(_, rel)| rel.is_cyclic()).count(),
            entry_tags: self.entry_tags.len(),
            noop_operations: self.operations().filter(|(_, op)| op.is_noop()).count(),
        }
    }

    /// Operations that were evaluated at least once, slowest (by total
    /// time) first.
    pub fn operation_timings(&self) -> Vec<OperationTiming> {
        let mut timings: Vec<OperationTiming> = self
            .operations()
            .filter(|(_, op)| op.base().stats.count > 0)
            .map(|(id, op)| OperationTiming {
                identifier: self.node_identifier(id.into()),
                stats: op.base().stats,
            })
            .collect();
        timings.sort_by(|a, b| b.stats.total.cmp(&a.stats.total));
        timings
    }
}

/// Graphviz DOT rendering.
pub trait ToDot {
    fn to_dot(&self) -> String;
}

fn dot_node(node: NodeRef) -> String {
    match node {
        NodeRef::TimeSource => "time_source".to_string(),
        NodeRef::Id(id) => format!("id{}", id.index()),
        NodeRef::Component(id) => format!("comp{}", id.index()),
        NodeRef::Operation(id) => format!("op{}", id.index()),
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

impl ToDot for Depsgraph {
    /// One cluster per ID node, nested clusters per component, operations
    /// as boxes. Cyclic relations are red, `NO_FLUSH` ones dashed.
    fn to_dot(&self) -> String {
        let mut dot = String::from("digraph depsgraph {\n");
        dot.push_str("  rankdir=LR;\n");
        dot.push_str("  node [shape=box];\n\n");

        if self.find_time_source().is_some() {
            dot.push_str("  time_source [label=\"Time Source\", shape=ellipse];\n");
        }

        for (index, id_node) in self.id_nodes().enumerate() {
            let _ = writeln!(dot, "  subgraph cluster_id{index} {{");
            let _ = writeln!(dot, "    label=\"{}\";", escape(&id_node.identifier()));
            for comp_id in id_node.components() {
                let comp = self.component(comp_id);
                let _ = writeln!(dot, "    subgraph cluster_comp{} {{", comp_id.index());
                let _ = writeln!(dot, "      label=\"{}\";", escape(comp.name()));
                if !comp.affects_directly_visible() {
                    dot.push_str("      style=dashed;\n");
                }
                // Time-source relations end here.
                let _ = writeln!(
                    dot,
                    "      comp{} [label=\"\", shape=point];",
                    comp_id.index()
                );
                for op_id in comp.operations() {
                    let op = self.operation(*op_id);
                    let style = if op.needs_update() { ", style=filled" } else { "" };
                    let _ = writeln!(
                        dot,
                        "      op{} [label=\"{}\"{style}];",
                        op_id.index(),
                        escape(op.name())
                    );
                }
                dot.push_str("    }\n");
            }
            dot.push_str("  }\n");
        }
        dot.push('\n');

        for (_, rel) in self.relations() {
            let mut attrs = vec![format!("label=\"{}\"", escape(&rel.name))];
            if rel.flags.contains(RelationFlags::CYCLIC) {
                attrs.push("color=red".to_string());
            }
            if rel.flags.contains(RelationFlags::NO_FLUSH) {
                attrs.push("style=dashed".to_string());
            }
            let _ = writeln!(
                dot,
                "  {} -> {} [{}];",
                dot_node(rel.from),
                dot_node(rel.to),
                attrs.join(", ")
            );
        }

        dot.push_str("}\n");
        dot
    }
}
