//! Document and workspace symbols (`spec.md` §4.7): the runtime tree already
//! tracks which file defined each node and property, so symbols are a
//! filtered walk rather than a separate index.

use tower_lsp::lsp_types::{DocumentSymbol, Location, SymbolInformation, SymbolKind, Url};

use crate::context::Context;
use crate::runtime::{NodeRef, RuntimeTree};

#[allow(deprecated)]
pub fn document_symbols(ctx: &Context, uri: &Url) -> Vec<DocumentSymbol> {
    collect(ctx, uri, ctx.tree.root)
}

#[allow(deprecated)]
fn collect(ctx: &Context, uri: &Url, node_ref: NodeRef) -> Vec<DocumentSymbol> {
    let node = ctx.tree.get(node_ref);
    let own_range = node
        .definitions
        .iter()
        .find(|f| &f.file == uri)
        .and_then(|f| ctx.ast_for(uri).map(|ast| ast.get(f.node).range));

    let mut children: Vec<DocumentSymbol> = node
        .children
        .iter()
        .flat_map(|&child| collect(ctx, uri, child))
        .collect();

    let Some(range) = own_range else {
        return children;
    };

    let mut properties: Vec<DocumentSymbol> = node
        .properties
        .values()
        .filter(|p| &p.declaration_site.file == uri)
        .map(|p| {
            let prop_range = crate::runtime::ast_range(&ctx.file_asts, p);
            DocumentSymbol {
                name: p.name.clone(),
                detail: None,
                kind: SymbolKind::PROPERTY,
                tags: None,
                deprecated: None,
                range: prop_range,
                selection_range: prop_range,
                children: None,
            }
        })
        .collect();
    properties.sort_by(|a, b| a.name.cmp(&b.name));
    properties.append(&mut children);

    vec![DocumentSymbol {
        name: node.name().to_string(),
        detail: node.address.clone(),
        kind: SymbolKind::NAMESPACE,
        tags: None,
        deprecated: None,
        range,
        selection_range: range,
        children: if properties.is_empty() { None } else { Some(properties) },
    }]
}

/// Flat, cross-file symbol listing for workspace/symbol (`spec.md` §4.7).
#[allow(deprecated)]
pub fn workspace_symbols(ctx: &Context, query: &str) -> Vec<SymbolInformation> {
    let mut out = Vec::new();
    collect_flat(&ctx.tree, ctx.tree.root, ctx, query, &mut out);
    out
}

#[allow(deprecated)]
fn collect_flat(
    tree: &RuntimeTree,
    node_ref: NodeRef,
    ctx: &Context,
    query: &str,
    out: &mut Vec<SymbolInformation>,
) {
    let node = tree.get(node_ref);
    if query.is_empty() || node.name().to_ascii_lowercase().contains(&query.to_ascii_lowercase()) {
        if let Some(frag) = node.definitions.first() {
            if let Some((uri, range)) = super::cursor::frag_location(&ctx.file_asts, frag) {
                out.push(SymbolInformation {
                    name: node.name().to_string(),
                    kind: SymbolKind::NAMESPACE,
                    tags: None,
                    deprecated: None,
                    location: Location::new(uri, range),
                    container_name: node.parent.map(|p| tree.get(p).name().to_string()),
                });
            }
        }
    }
    for &child in &node.children {
        collect_flat(tree, child, ctx, query, out);
    }
}
