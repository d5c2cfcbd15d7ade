//! Position-to-AST-node resolution shared by every query operation
//! (`spec.md` §4.7). The lexer/parser don't index nodes by position, so
//! queries walk the tagged AST directly, same as the runtime evaluator does
//! for its own traversal.

use tower_lsp::lsp_types::{Position, Range};

use crate::parser::{Ast, AstKind, NodeId};
use crate::runtime::{FileAst, NodeRef, RuntimeTree};

fn range_contains(range: Range, pos: Position) -> bool {
    let after_start = pos.line > range.start.line
        || (pos.line == range.start.line && pos.character >= range.start.character);
    let before_end =
        pos.line < range.end.line || (pos.line == range.end.line && pos.character <= range.end.character);
    after_start && before_end
}

fn children_of(kind: &AstKind) -> Vec<NodeId> {
    match kind {
        AstKind::RootNodeDecl { body } => body.clone(),
        AstKind::ChildNode { body, .. } => body.clone(),
        AstKind::RefNode { body, .. } => body.clone(),
        AstKind::Property { values, .. } => values.iter().copied().collect(),
        AstKind::ValueList { items } => items.clone(),
        AstKind::ArrayValue { cells } => cells.clone(),
        _ => Vec::new(),
    }
}

/// Returns the chain of AST nodes containing `pos`, outermost first. The
/// last entry is the innermost (deepest) node whose range covers the
/// position.
pub fn ancestor_chain(ast: &Ast, pos: Position) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut candidates = ast.statements.clone();
    loop {
        let Some(&id) = candidates.iter().find(|&&id| range_contains(ast.get(id).range, pos)) else {
            break;
        };
        path.push(id);
        candidates = children_of(&ast.get(id).kind);
        if candidates.is_empty() {
            break;
        }
    }
    path
}

/// Finds the runtime node whose definition or reference site is the nearest
/// enclosing `ChildNode`/`RootNodeDecl`/`RefNode` in `chain`.
pub fn enclosing_runtime_node(tree: &RuntimeTree, uri: &tower_lsp::lsp_types::Url, chain: &[NodeId]) -> Option<NodeRef> {
    for &id in chain.iter().rev() {
        for (idx, node) in tree.nodes.iter().enumerate() {
            let is_site = node.definitions.iter().any(|f| &f.file == uri && f.node == id)
                || node.referenced_by.iter().any(|f| &f.file == uri && f.node == id);
            if is_site {
                return Some(idx);
            }
        }
    }
    None
}

/// Innermost node in `chain` that is a `Property`, if the cursor sits inside
/// one — used to drive value completion/hover.
pub fn enclosing_property<'a>(ast: &'a Ast, chain: &[NodeId]) -> Option<(&'a str, NodeId)> {
    chain.iter().rev().find_map(|&id| match &ast.get(id).kind {
        AstKind::Property { name, .. } => Some((name.as_str(), id)),
        _ => None,
    })
}

pub fn file_ast<'a>(files: &'a [FileAst], uri: &tower_lsp::lsp_types::Url) -> Option<&'a Ast> {
    files.iter().find(|f| &f.uri == uri).map(|f| &f.ast)
}

/// Resolves a `Frag` back to a `(file, range)` location, for goto-definition
/// and find-references results.
pub fn frag_location(
    files: &[FileAst],
    frag: &crate::runtime::Frag,
) -> Option<(tower_lsp::lsp_types::Url, Range)> {
    let ast = file_ast(files, &frag.file)?;
    Some((frag.file.clone(), ast.get(frag.node).range))
}
