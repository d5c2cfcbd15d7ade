//! Goto-definition (`spec.md` §4.7): resolves label references, node-path
//! references and `#include`/`/include/` directives to the location that
//! defines them.

use tower_lsp::lsp_types::{Location, Position, Url};

use crate::context::Context;
use crate::parser::AstKind;
use crate::utils::paths::{resolve_include_path, uri_to_path};

use super::cursor::{ancestor_chain, file_ast, frag_location};

pub fn definition(ctx: &Context, uri: &Url, pos: Position) -> Vec<Location> {
    let Some(ast) = file_ast(&ctx.file_asts, uri) else {
        return Vec::new();
    };
    let chain = ancestor_chain(ast, pos);
    let Some(&innermost) = chain.last() else {
        return Vec::new();
    };

    match &ast.get(innermost).kind {
        AstKind::LabelRef { name } => label_definition(ctx, name),
        AstKind::NodePathRef { path } => path_definition(ctx, path),
        AstKind::IncludeDirective { path } => include_definition(ctx, uri, path),
        _ => Vec::new(),
    }
}

fn label_definition(ctx: &Context, name: &str) -> Vec<Location> {
    let Some(&node_ref) = ctx.tree.labels.get(name) else {
        return Vec::new();
    };
    ctx.tree
        .get(node_ref)
        .definitions
        .iter()
        .filter_map(|frag| frag_location(&ctx.file_asts, frag))
        .map(|(uri, range)| Location::new(uri, range))
        .collect()
}

fn path_definition(ctx: &Context, path: &str) -> Vec<Location> {
    let Some(node_ref) = ctx.tree.resolve_path(path) else {
        return Vec::new();
    };
    ctx.tree
        .get(node_ref)
        .definitions
        .iter()
        .filter_map(|frag| frag_location(&ctx.file_asts, frag))
        .map(|(uri, range)| Location::new(uri, range))
        .collect()
}

fn include_definition(ctx: &Context, from: &Url, include: &str) -> Vec<Location> {
    let Some(current_file) = uri_to_path(from) else {
        return Vec::new();
    };
    let Some(resolved) = resolve_include_path(
        ctx.workspace_root.as_deref(),
        &ctx.settings.default_include_paths,
        &current_file,
        include,
    ) else {
        return Vec::new();
    };
    let Ok(target) = Url::from_file_path(&resolved) else {
        return Vec::new();
    };
    vec![Location::new(target, tower_lsp::lsp_types::Range::default())]
}
