//! Merges AST fragments from every file in a context into one runtime tree
//! (`spec.md` §4.5). Implemented as a single recursive walk rather than a
//! literal flatten-then-merge pass: walking each document's nesting in
//! source order already yields the same statement ordering the spec
//! describes, and avoids materializing an intermediate statement list.

use std::collections::HashMap;

use tower_lsp::lsp_types::Url;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};
use crate::parser::{Ast, AstKind, DeleteTarget, NodeId as AstNodeId, RefTarget};

use super::tree::{Frag, NodeRef, PropertyObject, QuickValue, RuntimeTree};

pub struct FileAst {
    pub uri: Url,
    pub ast: Ast,
}

pub struct EvalOutput {
    pub tree: RuntimeTree,
    pub diagnostics: Vec<DtsDiagnostic>,
}

struct EvalCtx<'a> {
    tree: RuntimeTree,
    diagnostics: Vec<DtsDiagnostic>,
    label_live: HashMap<String, (NodeRef, u32)>,
    stmt_index: u32,
    files: &'a [FileAst],
}

pub fn evaluate(files: &[FileAst]) -> EvalOutput {
    let mut ctx = EvalCtx {
        tree: RuntimeTree::default(),
        diagnostics: Vec::new(),
        label_live: HashMap::new(),
        stmt_index: 0,
        files,
    };

    for file in files {
        let root = ctx.tree.root;
        let statements = file.ast.statements.clone();
        ctx.merge_statements(&file.ast, &file.uri, &statements, root);
    }

    assign_phandles(&mut ctx);

    EvalOutput {
        tree: ctx.tree,
        diagnostics: ctx.diagnostics,
    }
}

impl<'a> EvalCtx<'a> {
    fn merge_statements(&mut self, ast: &Ast, file: &Url, statements: &[AstNodeId], current: NodeRef) {
        for &id in statements {
            self.merge_statement(ast, file, id, current);
        }
    }

    fn merge_statement(&mut self, ast: &Ast, file: &Url, id: AstNodeId, current: NodeRef) {
        self.stmt_index += 1;
        let node = ast.get(id);
        let frag = Frag { file: file.clone(), node: id };

        match &node.kind {
            AstKind::RootNodeDecl { body } => {
                let root = self.tree.root;
                self.bind_labels(&node.labels, root, frag.clone());
                self.tree.get_mut(root).definitions.push(frag);
                self.merge_statements(ast, file, body, root);
            }
            AstKind::ChildNode { name, address, address2, body } => {
                let target = match self.tree.child_named(current, name, address.as_deref()) {
                    Some(existing) => existing,
                    None => self.tree.add_child(current, name.clone(), address.clone()),
                };
                self.tree.get_mut(target).address2 = address2.clone();
                self.bind_labels(&node.labels, target, frag.clone());
                self.tree.get_mut(target).definitions.push(frag);
                self.merge_statements(ast, file, body, target);
            }
            AstKind::RefNode { target, body } => {
                let resolved = match target {
                    RefTarget::ByLabel(name) => {
                        let found = self.label_live.get(name).map(|(r, _)| *r);
                        if found.is_none() {
                            self.diagnostics.push(
                                DtsDiagnostic::new(DiagnosticKind::UnableToResolveChildNode, node.range)
                                    .with_file(file.clone())
                                    .with_args([name.clone()]),
                            );
                        }
                        found
                    }
                    RefTarget::ByPath(path) => {
                        let found = self.tree.resolve_path(path);
                        if found.is_none() {
                            self.diagnostics.push(
                                DtsDiagnostic::new(DiagnosticKind::UnableToResolveNodePath, node.range)
                                    .with_file(file.clone())
                                    .with_args([path.clone()]),
                            );
                        }
                        found
                    }
                };
                if let Some(target) = resolved {
                    self.bind_labels(&node.labels, target, frag.clone());
                    self.tree.get_mut(target).referenced_by.push(frag);
                    self.merge_statements(ast, file, body, target);
                }
            }
            AstKind::Property { name, values } => {
                let quick_values = values
                    .map(|v| quick_values_of(ast, v))
                    .unwrap_or_default();

                if let Some(v) = values {
                    self.check_value_list_refs(ast, file, *v);
                }

                let existing = self.tree.get(current).properties.get(name).cloned();
                let mut sites = existing.as_ref().map(|p| p.all_sites.clone()).unwrap_or_default();
                if let Some(prev) = &existing {
                    // spec.md S1: primary range is the first declaration, the
                    // duplicate site is only linked.
                    self.diagnostics.push(
                        DtsDiagnostic::new(DiagnosticKind::DuplicatePropertyName, ast_range(self.files, prev))
                            .with_file(prev.declaration_site.file.clone())
                            .with_args([name.clone()])
                            .with_related(file.clone(), node.range, name.clone()),
                    );
                }
                sites.push(frag.clone());

                self.tree.get_mut(current).properties.insert(
                    name.clone(),
                    PropertyObject {
                        name: name.clone(),
                        declaration_site: existing.map(|p| p.declaration_site).unwrap_or_else(|| frag.clone()),
                        all_sites: sites,
                        values: values.map(|v| vec![Frag { file: file.clone(), node: v }]).unwrap_or_default(),
                        quick_values,
                        nexus_maps_to: None,
                        property_type: None,
                    },
                );
            }
            AstKind::DeleteNode { target } => {
                let resolved = match target {
                    DeleteTarget::ByName(name) => {
                        let (base, address) = match name.split_once('@') {
                            Some((n, a)) => (n, Some(a)),
                            None => (name.as_str(), None),
                        };
                        self.tree.child_named(current, base, address)
                    }
                    DeleteTarget::ByLabel(name) => self.label_live.get(name).map(|(r, _)| *r),
                    DeleteTarget::ByPath(path) => self.tree.resolve_path(path),
                };
                match resolved {
                    Some(target) => {
                        self.tree.get_mut(target).deleted = true;
                        self.tree.get_mut(current).children.retain(|c| *c != target);
                    }
                    None => {
                        let label = match target {
                            DeleteTarget::ByName(n) => n.clone(),
                            DeleteTarget::ByLabel(n) => n.clone(),
                            DeleteTarget::ByPath(p) => p.clone(),
                        };
                        self.diagnostics.push(
                            DtsDiagnostic::new(DiagnosticKind::DeleteOfMissingTarget, node.range)
                                .with_file(file.clone())
                                .with_args([label]),
                        );
                    }
                }
            }
            AstKind::DeleteProperty { name } => {
                if self.tree.get_mut(current).properties.remove(name).is_none() {
                    self.diagnostics.push(
                        DtsDiagnostic::new(DiagnosticKind::DeleteOfMissingTarget, node.range)
                            .with_file(file.clone())
                            .with_args([name.clone()]),
                    );
                }
            }
            AstKind::IncludeDirective { .. } | AstKind::CommentLine { .. } | AstKind::CommentBlock { .. } => {}
            _ => {}
        }
    }

    /// Walks a property's value list and emits `UnableToResolveChildNode`/
    /// `UnableToResolveNodePath` for every `&label`/`&{path}` reference that
    /// doesn't resolve at this statement index — labels and phandle-array
    /// entries alike (`spec.md` §8 "Reference closure"), not just the
    /// ref-node forms the `RefNode` branch already covers.
    fn check_value_list_refs(&mut self, ast: &Ast, file: &Url, value_list: AstNodeId) {
        let AstKind::ValueList { items } = &ast.get(value_list).kind else {
            return;
        };
        for &item in items {
            self.check_value_refs(ast, file, item);
        }
    }

    fn check_value_refs(&mut self, ast: &Ast, file: &Url, id: AstNodeId) {
        match &ast.get(id).kind {
            AstKind::ArrayValue { cells } => {
                for &cell in cells {
                    self.check_value_refs(ast, file, cell);
                }
            }
            AstKind::LabelRef { name } => {
                if !self.label_live.contains_key(name) {
                    let range = ast.get(id).range;
                    self.diagnostics.push(
                        DtsDiagnostic::new(DiagnosticKind::UnableToResolveChildNode, range)
                            .with_file(file.clone())
                            .with_args([name.clone()]),
                    );
                }
            }
            AstKind::NodePathRef { path } => {
                if self.tree.resolve_path(path).is_none() {
                    let range = ast.get(id).range;
                    self.diagnostics.push(
                        DtsDiagnostic::new(DiagnosticKind::UnableToResolveNodePath, range)
                            .with_file(file.clone())
                            .with_args([path.clone()]),
                    );
                }
            }
            _ => {}
        }
    }

    fn bind_labels(&mut self, labels: &[crate::parser::Label], target: NodeRef, frag: Frag) {
        for label in labels {
            if let Some((existing, _)) = self.label_live.get(&label.name) {
                if *existing != target {
                    self.diagnostics.push(
                        DtsDiagnostic::new(DiagnosticKind::LabelAlreadyInUse, label.range)
                            .with_file(frag.file.clone())
                            .with_args([label.name.clone()])
                            .with_related(frag.file.clone(), label.range, label.name.clone()),
                    );
                }
            }
            self.label_live.insert(label.name.clone(), (target, self.stmt_index));
            if !self.tree.get(target).labels.contains(&label.name) {
                self.tree.get_mut(target).labels.push(label.name.clone());
            }
            self.tree.labels.insert(label.name.clone(), target);
        }
    }
}

pub(crate) fn ast_range(files: &[FileAst], prop: &PropertyObject) -> tower_lsp::lsp_types::Range {
    files
        .iter()
        .find(|f| f.uri == prop.declaration_site.file)
        .map(|f| f.ast.get(prop.declaration_site.node).range)
        .unwrap_or_default()
}

fn quick_values_of(ast: &Ast, value_list: AstNodeId) -> Vec<QuickValue> {
    let AstKind::ValueList { items } = &ast.get(value_list).kind else {
        return Vec::new();
    };
    items.iter().flat_map(|&item| quick_values_of_value(ast, item)).collect()
}

fn quick_values_of_value(ast: &Ast, id: AstNodeId) -> Vec<QuickValue> {
    match &ast.get(id).kind {
        AstKind::ArrayValue { cells } => cells.iter().map(|&c| quick_value_of_cell(ast, c)).collect(),
        AstKind::StringValue { value } => vec![QuickValue::Str(value.clone())],
        AstKind::BytestringValue { bytes } => vec![QuickValue::Bytes(bytes.clone())],
        AstKind::LabelRef { name } => vec![QuickValue::PhandleRef(name.clone())],
        AstKind::NodePathRef { path } => vec![QuickValue::PhandleRef(path.clone())],
        AstKind::CMacroCall { name, .. } => vec![QuickValue::Macro(name.clone())],
        _ => vec![QuickValue::Unknown],
    }
}

fn quick_value_of_cell(ast: &Ast, id: AstNodeId) -> QuickValue {
    match &ast.get(id).kind {
        AstKind::Expression { value: Some(v), .. } => QuickValue::Number(*v),
        AstKind::LabelRef { name } => QuickValue::PhandleRef(name.clone()),
        AstKind::NodePathRef { path } => QuickValue::PhandleRef(path.clone()),
        AstKind::CMacroCall { name, .. } => QuickValue::Macro(name.clone()),
        _ => QuickValue::Unknown,
    }
}

/// Phandle assignment (`spec.md` §4.5 step 4): explicit `phandle = <N>;`
/// declarations are honored and checked for uniqueness; any other node that
/// is the target of at least one reference gets the next free value.
fn assign_phandles(ctx: &mut EvalCtx) {
    let mut used: HashMap<u32, NodeRef> = HashMap::new();
    let node_count = ctx.tree.nodes.len();

    for idx in 0..node_count {
        let explicit = ctx.tree.get(idx).properties.get("phandle").and_then(|p| {
            p.quick_values.first().and_then(|v| match v {
                QuickValue::Number(n) => Some(*n as u32),
                _ => None,
            })
        });
        if let Some(value) = explicit {
            if let Some(&other) = used.get(&value) {
                if other != idx {
                    let phandle_prop = ctx.tree.get(idx).properties.get("phandle");
                    let range = phandle_prop.map(|p| ast_range(ctx.files, p)).unwrap_or_default();
                    let file = phandle_prop.map(|p| p.declaration_site.file.clone());
                    let mut diagnostic = DtsDiagnostic::new(DiagnosticKind::PhandleNotUnique, range)
                        .with_args([value.to_string()]);
                    if let Some(file) = file {
                        diagnostic = diagnostic.with_file(file);
                    }
                    ctx.diagnostics.push(diagnostic);
                }
            } else {
                used.insert(value, idx);
                ctx.tree.get_mut(idx).phandle = Some(value);
                ctx.tree.phandles.insert(value, idx);
            }
        }
    }

    let mut next = 1u32;
    for idx in 0..node_count {
        if ctx.tree.get(idx).referenced_by.is_empty() || ctx.tree.get(idx).phandle.is_some() {
            continue;
        }
        while used.contains_key(&next) {
            next += 1;
        }
        used.insert(next, idx);
        ctx.tree.get_mut(idx).phandle = Some(next);
        ctx.tree.phandles.insert(next, idx);
        next += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn eval_single(src: &str) -> EvalOutput {
        let tokens = Lexer::new(src).tokenize().tokens;
        let ast = Parser::new(&tokens).parse().ast;
        let uri = Url::parse("file:///board.dts").unwrap();
        evaluate(&[FileAst { uri, ast }])
    }

    #[test]
    fn s1_duplicate_property() {
        let out = eval_single("/{prop1;prop1;cpus{};memory{};};");
        let dups: Vec<_> = out
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::DuplicatePropertyName)
            .collect();
        assert_eq!(dups.len(), 1);
        let dup = dups[0];
        // spec.md S1: primary range covers the first declaration (cols
        // 2-7), linked range covers the duplicate (cols 8-13).
        assert_eq!(dup.range.start.character, 2);
        assert_eq!(dup.range.end.character, 7);
        assert_eq!(dup.related.len(), 1);
        assert_eq!(dup.related[0].1.start.character, 8);
        assert_eq!(dup.related[0].1.end.character, 13);
    }

    #[test]
    fn s2_dangling_label_ref() {
        let out = eval_single("/{prop1=&l1;cpus{};memory{};};");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnableToResolveChildNode));
    }

    #[test]
    fn dangling_ref_inside_array_value_is_detected() {
        let out = eval_single("/{gpios=<&ctrl 1 2>;cpus{};memory{};};");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnableToResolveChildNode));
    }

    #[test]
    fn resolves_ref_node_by_label() {
        let out = eval_single("/{foo: node1{};};&foo{status=\"okay\";};");
        assert!(out
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::UnableToResolveChildNode));
        let node1 = out.tree.resolve_path("/node1").expect("node1 exists");
        assert!(out.tree.get(node1).properties.contains_key("status"));
    }

    #[test]
    fn phandle_assigned_to_referenced_node() {
        let out = eval_single("/{foo: node1{};other{ref=<&foo>;};};");
        let node1 = out.tree.resolve_path("/node1").expect("node1 exists");
        assert!(out.tree.get(node1).phandle.is_some());
    }
}
