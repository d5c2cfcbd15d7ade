//! Hover (`spec.md` §4.7): shows the resolved type information for whatever
//! the cursor sits on — a node's `compatible`-resolved binding, or a
//! property's declared type/required-ness/description.

use std::fmt::Write as _;

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::context::Context;
use crate::runtime::RuntimeNode;

use super::cursor::{ancestor_chain, enclosing_property, enclosing_runtime_node, file_ast};

pub fn hover(ctx: &Context, uri: &Url, pos: Position) -> Option<Hover> {
    let ast = file_ast(&ctx.file_asts, uri)?;
    let chain = ancestor_chain(ast, pos);
    let node_ref = enclosing_runtime_node(&ctx.tree, uri, &chain)?;
    let node = ctx.tree.get(node_ref);

    let text = match enclosing_property(ast, &chain) {
        Some((prop_name, _)) => property_hover(node, prop_name)?,
        None => node_hover(node)?,
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent { kind: MarkupKind::Markdown, value: text }),
        range: None,
    })
}

fn node_hover(node: &RuntimeNode) -> Option<String> {
    let node_type = node.node_type.as_ref()?;
    let mut out = format!("**{}**", node.name());
    if !node_type.bus.is_empty() {
        let _ = write!(out, "\n\nbus: {}", node_type.bus.join(", "));
    }
    if let Some(on_bus) = &node_type.on_bus {
        let _ = write!(out, "\n\non-bus: {on_bus}");
    }
    if let Some(phandle) = node.phandle {
        let _ = write!(out, "\n\nphandle: `{phandle:#x}`");
    }
    Some(out)
}

fn property_hover(node: &RuntimeNode, prop_name: &str) -> Option<String> {
    let node_type = node.node_type.as_ref()?;
    let def = node_type.find_property(prop_name)?;
    let mut out = format!("**{prop_name}**  \n{:?}", def.required);
    if !def.allowed_types.is_empty() {
        let types: Vec<String> = def.allowed_types.iter().map(|t| format!("{t:?}")).collect();
        let _ = write!(out, "\n\ntype: {}", types.join(" | "));
    }
    if let Some(enum_values) = &def.enum_values {
        let _ = write!(out, "\n\nallowed: {}", enum_values.join(", "));
    }
    if let Some(description) = &def.description {
        let _ = write!(out, "\n\n{description}");
    }
    if def.deprecated {
        out.push_str("\n\n_deprecated_");
    }
    Some(out)
}
