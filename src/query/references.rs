//! Find-references (`spec.md` §4.7): every definition and reference site
//! that contributed to the node (or property) under the cursor, across all
//! files in the context — the reference closure the runtime tree already
//! tracks per `RuntimeNode`/`PropertyObject`.

use tower_lsp::lsp_types::{Location, Position, Url};

use crate::context::Context;

use super::cursor::{ancestor_chain, enclosing_property, enclosing_runtime_node, file_ast, frag_location};

pub fn references(ctx: &Context, uri: &Url, pos: Position, include_declaration: bool) -> Vec<Location> {
    let Some(ast) = file_ast(&ctx.file_asts, uri) else {
        return Vec::new();
    };
    let chain = ancestor_chain(ast, pos);
    let Some(node_ref) = enclosing_runtime_node(&ctx.tree, uri, &chain) else {
        return Vec::new();
    };
    let node = ctx.tree.get(node_ref);

    let frags: Vec<_> = if let Some((prop_name, _)) = enclosing_property(ast, &chain) {
        let Some(prop) = node.properties.get(prop_name) else {
            return Vec::new();
        };
        prop.all_sites
            .iter()
            .filter(|frag| include_declaration || **frag != prop.declaration_site)
            .cloned()
            .collect()
    } else {
        node.definitions
            .iter()
            .chain(node.referenced_by.iter())
            .filter(|frag| include_declaration || !node.definitions.contains(frag))
            .cloned()
            .collect()
    };

    frags
        .iter()
        .filter_map(|frag| frag_location(&ctx.file_asts, frag))
        .map(|(uri, range)| Location::new(uri, range))
        .collect()
}
