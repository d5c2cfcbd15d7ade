//! Renders a merged runtime tree back to DTS-like source text, for the
//! `compiledDtsOutput` custom request (`spec.md` §6) — a debugging view of
//! what the evaluator actually produced, not a roundtrip-faithful printer.

use std::fmt::Write as _;

use crate::runtime::{NodeRef, QuickValue, RuntimeTree};

pub fn render_tree(tree: &RuntimeTree) -> String {
    let mut out = String::new();
    render_node(tree, tree.root, 0, &mut out);
    out
}

fn render_node(tree: &RuntimeTree, node_ref: NodeRef, depth: usize, out: &mut String) {
    let node = tree.get(node_ref);
    if node.deleted {
        return;
    }
    let indent = "\t".repeat(depth);
    let name = if depth == 0 { "/".to_string() } else { node.name().to_string() };
    let _ = writeln!(out, "{indent}{name} {{");

    let mut names: Vec<&String> = node.properties.keys().collect();
    names.sort();
    for name in names {
        let prop = &node.properties[name];
        let _ = writeln!(out, "{indent}\t{} = {};", prop.name, render_values(&prop.quick_values));
    }

    for &child in &node.children {
        render_node(tree, child, depth + 1, out);
    }

    let _ = writeln!(out, "{indent}}};");
}

fn render_values(values: &[QuickValue]) -> String {
    let rendered: Vec<String> = values
        .iter()
        .map(|v| match v {
            QuickValue::Number(n) => n.to_string(),
            QuickValue::Str(s) => format!("\"{s}\""),
            QuickValue::Bytes(b) => format!("[{}]", b.iter().map(|byte| format!("{byte:02x}")).collect::<Vec<_>>().join(" ")),
            QuickValue::PhandleRef(name) => format!("&{name}"),
            QuickValue::Macro(name) => name.clone(),
            QuickValue::Unknown => "?".to_string(),
        })
        .collect();
    rendered.join(", ")
}
