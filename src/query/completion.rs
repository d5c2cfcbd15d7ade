//! Completion (`spec.md` §4.7, seed scenario S6). Pure functions over the
//! already-rebuilt `Context` state — no LSP types beyond `Position`/`Url`
//! cross the boundary so these are unit-testable without a running server.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Position, Url};

use crate::bindings::{PropertyMatcher, Requiredness, STATUS_VALUES};
use crate::context::Context;
use crate::parser::AstKind;
use crate::runtime::RuntimeNode;

use super::cursor::{ancestor_chain, enclosing_property, enclosing_runtime_node, file_ast};

/// Dispatches to value completion when the cursor sits inside a property's
/// value list, otherwise to property-name completion for the enclosing node.
pub fn complete(ctx: &Context, uri: &Url, pos: Position) -> Vec<CompletionItem> {
    let Some(ast) = file_ast(&ctx.file_asts, uri) else {
        return Vec::new();
    };
    let chain = ancestor_chain(ast, pos);

    if let Some((prop_name, _)) = enclosing_property(ast, &chain) {
        if let Some(node_ref) = enclosing_runtime_node(&ctx.tree, uri, &chain) {
            return complete_property_value(ctx.tree.get(node_ref), prop_name);
        }
        return Vec::new();
    }

    if let Some(node_ref) = enclosing_runtime_node(&ctx.tree, uri, &chain) {
        return complete_property_name(ctx.tree.get(node_ref));
    }

    Vec::new()
}

/// Completion for a property's value position. `status` falls back to
/// `STATUS_VALUES` even when no binding is resolved, since it's a standard
/// property every node type accepts (`spec.md` §4.6).
fn complete_property_value(node: &RuntimeNode, prop_name: &str) -> Vec<CompletionItem> {
    if let Some(node_type) = &node.node_type {
        if let Some(def) = node_type.find_property(prop_name) {
            if let Some(values) = &def.enum_values {
                return values
                    .iter()
                    .map(|v| CompletionItem {
                        label: v.clone(),
                        kind: Some(CompletionItemKind::ENUM_MEMBER),
                        ..Default::default()
                    })
                    .collect();
            }
        }
    }

    if prop_name == "status" {
        return STATUS_VALUES
            .iter()
            .map(|v| CompletionItem {
                label: v.to_string(),
                kind: Some(CompletionItemKind::ENUM_MEMBER),
                ..Default::default()
            })
            .collect();
    }

    Vec::new()
}

/// Completion for a property name at a node body position: binding-declared
/// properties first (required before optional), already-present ones last
/// since re-declaring them usually isn't the intent.
fn complete_property_name(node: &RuntimeNode) -> Vec<CompletionItem> {
    let Some(node_type) = &node.node_type else {
        return Vec::new();
    };

    let mut items: Vec<(u8, CompletionItem)> = node_type
        .properties
        .iter()
        .filter_map(|def| {
            let name = matcher_literal(&def.matcher)?;
            let already_present = node.properties.contains_key(name);
            let rank = match (def.required, already_present) {
                (Requiredness::Required, false) => 0,
                (Requiredness::Optional, false) => 1,
                (_, true) => 2,
                (Requiredness::Omitted, false) => 3,
            };
            Some((
                rank,
                CompletionItem {
                    label: name.to_string(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    detail: def.description.clone(),
                    deprecated: Some(def.deprecated),
                    ..Default::default()
                },
            ))
        })
        .collect();

    items.sort_by_key(|(rank, _)| *rank);
    items.into_iter().map(|(_, item)| item).collect()
}

/// Only literal matchers make sense as a completion label; glob patterns
/// (`"*-gpios"`) describe a family of names, not one to insert verbatim.
fn matcher_literal(matcher: &PropertyMatcher) -> Option<&str> {
    match matcher {
        PropertyMatcher::Literal(name) => Some(name.as_str()),
        PropertyMatcher::Pattern(_) => None,
    }
}

#[allow(dead_code)]
fn is_property_statement(kind: &AstKind) -> bool {
    matches!(kind, AstKind::Property { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{NodeType, PropertyDef, ValueTypeKind};
    use std::rc::Rc;

    fn status_property() -> PropertyDef {
        PropertyDef {
            matcher: PropertyMatcher::Literal("status".into()),
            allowed_types: vec![ValueTypeKind::String],
            required: Requiredness::Optional,
            enum_values: None,
            const_value: None,
            default: None,
            description: None,
            deprecated: false,
        }
    }

    fn node_with_type(node_type: Option<NodeType>) -> RuntimeNode {
        let mut tree = crate::runtime::RuntimeTree::default();
        tree.get_mut(0).node_type = node_type.map(Rc::new);
        tree.get(0).clone()
    }

    #[test]
    fn status_without_enum_values_falls_back_to_standard_list() {
        let node = node_with_type(Some(NodeType {
            name: "test".into(),
            properties: vec![status_property()],
            ..Default::default()
        }));
        let items = complete_property_value(&node, "status");
        let labels: Vec<_> = items.into_iter().map(|i| i.label).collect();
        assert_eq!(labels, vec!["okay", "disabled", "reserved", "fail", "fail-sss"]);
    }

    #[test]
    fn status_falls_back_even_without_any_binding() {
        let node = node_with_type(None);
        let items = complete_property_value(&node, "status");
        assert_eq!(items.len(), 5);
    }
}
