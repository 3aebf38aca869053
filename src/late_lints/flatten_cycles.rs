use ariadne::{Color, Fmt, Label, Report, ReportKind};
use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::*;

use crate::ast::{FieldDef, SchemaFile};
use crate::spanned::Spanned;
use crate::Diagnostics;

use super::flattened_struct;

/// A struct can not flatten itself, directly or through other flattened structs.
///
/// Structs are nodes and every flattened field is an edge to the struct it flattens. Each
/// strongly connected component with more than one node, or with a self loop, is a cycle and is
/// reported once with every participating field labelled.
pub fn lint_flatten_cycles<'d>(file: &SchemaFile, path: &'d String, diag: &mut Diagnostics<'d>) {
    let mut graph: DiGraph<&str, &Spanned<FieldDef>> = DiGraph::new();
    let mut nodes: IndexMap<&str, NodeIndex> = IndexMap::new();
    for s in file.structs() {
        nodes
            .entry(s.name.val.as_str())
            .or_insert_with(|| graph.add_node(s.name.val.as_str()));
    }

    for s in file.structs() {
        let Some(&from) = nodes.get(s.name.val.as_str()) else {
            continue;
        };
        for field in &s.fields {
            let Some(target) = flattened_struct(file, &field.val) else {
                continue;
            };
            if let Some(&to) = nodes.get(target.name.val.as_str()) {
                graph.add_edge(from, to, field);
            }
        }
    }
    trace!(nodes = graph.node_count(), edges = graph.edge_count(), "flatten graph");

    for mut component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.find_edge(n, n).is_some());
        if !cyclic {
            continue;
        }
        component.sort_by_key(|n| nodes.get_index_of(graph[*n]));

        let names = component
            .iter()
            .map(|n| format!("\"{}\"", graph[*n].fg(Color::Blue)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut edges = graph
            .edge_references()
            .filter(|e| component.contains(&e.source()) && component.contains(&e.target()))
            .map(|e| (graph[e.source()], graph[e.target()], *e.weight()))
            .collect::<Vec<_>>();
        edges.sort_by_key(|(_, _, field)| field.span.start);

        let start = edges.first().map_or(0, |(_, _, field)| field.span.start);
        let mut report = Report::build(ReportKind::Error, path, start)
            .with_message(format!("cyclic flattening between {names}"));
        for (from, to, field) in edges {
            report.add_label(
                Label::new((path, field.span.into_range()))
                    .with_color(Color::Red)
                    .with_message(format!(
                        "\"{}\" flattens \"{}\" here",
                        from.fg(Color::Blue),
                        to.fg(Color::Blue)
                    )),
            );
        }
        report.set_help("a flattened struct must not contain the struct that flattens it");
        diag.push(report.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::late_lints::test_support::*;

    fn lint(src: &str) -> usize {
        let file = parse(src);
        let path = path();
        let mut diag = Vec::new();
        lint_flatten_cycles(&file, &path, &mut diag);
        diag.len()
    }

    #[test]
    fn direct_and_indirect_cycles() {
        assert_eq!(lint("struct A { #[flatten] a: A }"), 1);
        assert_eq!(
            lint(
                r#"
                struct A { #[flatten] b: B }
                struct B { #[flatten] c: C }
                struct C { #[flatten] a: A }
                struct D { #[flatten] d: D, #[flatten] a: A }
                "#
            ),
            2
        );
    }

    #[test]
    fn nesting_without_flattening_is_fine() {
        assert_eq!(lint("struct Node { children: [Node], next: Node? }"), 0);
        assert_eq!(
            lint("struct A { #[flatten] b: B, #[flatten] c: C } struct B { #[flatten] c: C } struct C { x: int }"),
            0
        );
    }
}
