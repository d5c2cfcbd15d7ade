use tower_lsp::lsp_types::Range;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};
use crate::lexer::{Token, TokenKind};

use super::ast::{Ast, AstKind, DeleteTarget, Label, NodeId, RefTarget};

pub struct ParseOutput {
    pub ast: Ast,
    pub diagnostics: Vec<DtsDiagnostic>,
}

/// Recursive-descent parser over a (post-preprocessing) token stream,
/// following the grammar in `spec.md` §4.3. Builds `Ast` nodes in
/// parent-first order; performs no I/O and never mutates context state.
pub struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
    ast: Ast,
    diagnostics: Vec<DtsDiagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        let significant: Vec<&Token> = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eol))
            .collect();
        Self {
            tokens: significant,
            pos: 0,
            ast: Ast::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn parse(mut self) -> ParseOutput {
        let mut statements = Vec::new();
        while !self.at_eof() {
            if let Some(id) = self.parse_statement(None) {
                statements.push(id);
            }
        }
        self.ast.statements = statements;
        ParseOutput {
            ast: self.ast,
            diagnostics: self.diagnostics,
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), None | Some(TokenKind::Eof))
    }

    fn peek(&self) -> Option<&&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_n(&self, n: usize) -> Option<&&Token> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Option<&&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn is_punct(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.kind == TokenKind::Punctuation && t.text == text)
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.is_punct(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, text: &str) {
        if !self.eat_punct(text) {
            let range = self.current_range();
            self.diagnostics
                .push(DtsDiagnostic::new(DiagnosticKind::MissingToken, range).with_args([text]));
        }
    }

    fn current_range(&self) -> Range {
        self.peek().map(|t| t.range).unwrap_or_default()
    }

    /// Skips to the next `;` or `}` (consuming it), so one syntax error
    /// doesn't cascade into the rest of the file (`spec.md` §4.3).
    fn recover(&mut self) {
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Eof {
                return;
            }
            let is_sync = t.kind == TokenKind::Punctuation && (t.text == ";" || t.text == "}");
            self.pos += 1;
            if is_sync {
                return;
            }
        }
    }

    fn parse_labels(&mut self) -> Vec<Label> {
        let mut labels = Vec::new();
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::LabelDef {
                labels.push(Label {
                    name: t.text.clone(),
                    range: t.range,
                });
                self.pos += 1;
            } else {
                break;
            }
        }
        labels
    }

    /// One statement at top level or inside a node body. Returns `None` when
    /// a syntax error forced a recovery skip with nothing usable produced.
    fn parse_statement(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        if let Some(t) = self.peek() {
            match t.kind {
                TokenKind::LineComment => {
                    let range = t.range;
                    let text = t.text.clone();
                    self.pos += 1;
                    return Some(self.ast.alloc(parent, range, Vec::new(), AstKind::CommentLine { text }));
                }
                TokenKind::BlockComment { .. } => {
                    let range = t.range;
                    let text = t.text.clone();
                    self.pos += 1;
                    return Some(self.ast.alloc(parent, range, Vec::new(), AstKind::CommentBlock { text }));
                }
                TokenKind::IncludeKeyword => return self.parse_include(parent),
                TokenKind::DeleteNodeKeyword => return self.parse_delete_node(parent),
                TokenKind::DeletePropertyKeyword => return self.parse_delete_property(parent),
                _ => {}
            }
        }

        let start_pos = self.pos;
        let labels = self.parse_labels();
        let start = self.current_range();

        match self.peek().map(|t| (t.kind.clone(), t.text.clone())) {
            Some((TokenKind::Punctuation, ref p)) if p == "/" => self.parse_root_node(parent, labels, start),
            Some((TokenKind::Punctuation, ref p)) if p == "&" => self.parse_ref_node(parent, labels, start),
            Some((TokenKind::Identifier, _)) => self.parse_named_statement(parent, labels, start),
            _ => {
                if self.pos == start_pos {
                    let range = self.current_range();
                    let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                    self.diagnostics
                        .push(DtsDiagnostic::new(DiagnosticKind::MisplacedToken, range).with_args([text]));
                }
                self.recover();
                None
            }
        }
    }

    fn parse_root_node(&mut self, parent: Option<NodeId>, labels: Vec<Label>, start: Range) -> Option<NodeId> {
        self.pos += 1; // '/'
        self.expect_punct("{");
        let id = self.ast.alloc(parent, start, labels, AstKind::RootNodeDecl { body: Vec::new() });
        let body = self.parse_body(id);
        if let AstKind::RootNodeDecl { body: slot } = &mut self.ast.nodes[id].kind {
            *slot = body;
        }
        self.expect_punct("}");
        self.expect_punct(";");
        Some(id)
    }

    fn parse_ref_node(&mut self, parent: Option<NodeId>, labels: Vec<Label>, start: Range) -> Option<NodeId> {
        self.pos += 1; // '&'
        let target = if self.eat_punct("{") {
            let mut path = String::new();
            while let Some(t) = self.peek() {
                if t.kind == TokenKind::Punctuation && t.text == "}" {
                    break;
                }
                path.push_str(&t.text);
                self.pos += 1;
            }
            self.expect_punct("}");
            RefTarget::ByPath(path)
        } else {
            let name = self.bump().map(|t| t.text.clone()).unwrap_or_default();
            RefTarget::ByLabel(name)
        };

        self.expect_punct("{");
        let id = self.ast.alloc(
            parent,
            start,
            labels,
            AstKind::RefNode {
                target,
                body: Vec::new(),
            },
        );
        let body = self.parse_body(id);
        if let AstKind::RefNode { body: slot, .. } = &mut self.ast.nodes[id].kind {
            *slot = body;
        }
        self.expect_punct("}");
        self.expect_punct(";");
        Some(id)
    }

    fn parse_named_statement(&mut self, parent: Option<NodeId>, labels: Vec<Label>, start: Range) -> Option<NodeId> {
        let name = self.bump().map(|t| t.text.clone()).unwrap_or_default();

        let mut address = None;
        let mut address2 = None;
        if self.eat_punct("@") {
            address = self.bump().map(|t| t.text.clone());
            if self.eat_punct(",") {
                address2 = self.bump().map(|t| t.text.clone());
            }
        }

        if self.is_punct("{") {
            self.pos += 1;
            let id = self.ast.alloc(
                parent,
                start,
                labels,
                AstKind::ChildNode {
                    name,
                    address,
                    address2,
                    body: Vec::new(),
                },
            );
            let body = self.parse_body(id);
            if let AstKind::ChildNode { body: slot, .. } = &mut self.ast.nodes[id].kind {
                *slot = body;
            }
            self.expect_punct("}");
            self.expect_punct(";");
            return Some(id);
        }

        // Property: name was already consumed as `name`; `@`/`,` aren't
        // legal property-name continuations, so by this point we're parsing
        // `name ('=' values)? ';'`.
        let values = if self.eat_punct("=") {
            Some(self.parse_value_list(parent))
        } else {
            None
        };
        self.expect_punct(";");
        Some(self.ast.alloc(parent, start, labels, AstKind::Property { name, values }))
    }

    fn parse_body(&mut self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(t) if t.kind == TokenKind::Eof => break,
                Some(t) if t.kind == TokenKind::Punctuation && t.text == "}" => break,
                _ => {}
            }
            if let Some(id) = self.parse_statement(Some(parent)) {
                out.push(id);
            }
        }
        out
    }

    fn parse_include(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        let start = self.current_range();
        self.pos += 1; // `/include/`
        let path = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::String { .. }) => {
                let text = t.text.clone();
                self.pos += 1;
                text
            }
            _ => {
                self.diagnostics
                    .push(DtsDiagnostic::new(DiagnosticKind::MissingToken, start).with_args(["<path>"]));
                String::new()
            }
        };
        self.expect_punct(";");
        Some(self.ast.alloc(parent, start, Vec::new(), AstKind::IncludeDirective { path }))
    }

    fn parse_delete_node(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        let start = self.current_range();
        self.pos += 1; // `/delete-node/`
        let target = if self.eat_punct("&") {
            if self.eat_punct("{") {
                let mut path = String::new();
                while let Some(t) = self.peek() {
                    if t.kind == TokenKind::Punctuation && t.text == "}" {
                        break;
                    }
                    path.push_str(&t.text);
                    self.pos += 1;
                }
                self.expect_punct("}");
                DeleteTarget::ByPath(path)
            } else {
                DeleteTarget::ByLabel(self.bump().map(|t| t.text.clone()).unwrap_or_default())
            }
        } else {
            let mut name = self.bump().map(|t| t.text.clone()).unwrap_or_default();
            if self.eat_punct("@") {
                if let Some(addr) = self.bump() {
                    name.push('@');
                    name.push_str(&addr.text);
                }
            }
            DeleteTarget::ByName(name)
        };
        self.expect_punct(";");
        Some(self.ast.alloc(parent, start, Vec::new(), AstKind::DeleteNode { target }))
    }

    fn parse_delete_property(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        let start = self.current_range();
        self.pos += 1; // `/delete-property/`
        let name = self.bump().map(|t| t.text.clone()).unwrap_or_default();
        self.expect_punct(";");
        Some(self.ast.alloc(parent, start, Vec::new(), AstKind::DeleteProperty { name }))
    }

    fn parse_value_list(&mut self, parent: Option<NodeId>) -> NodeId {
        let start = self.current_range();
        let mut items = Vec::new();
        loop {
            if let Some(id) = self.parse_value(parent) {
                items.push(id);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.ast.alloc(parent, start, Vec::new(), AstKind::ValueList { items })
    }

    fn parse_value(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        let start = self.current_range();
        match self.peek().map(|t| (t.kind.clone(), t.text.clone())) {
            Some((TokenKind::Punctuation, ref p)) if p == "<" => {
                self.pos += 1;
                let mut cells = Vec::new();
                while !self.is_punct(">") && !self.at_eof() {
                    if let Some(id) = self.parse_cell_value(parent) {
                        cells.push(id);
                    } else {
                        break;
                    }
                }
                self.expect_punct(">");
                Some(self.ast.alloc(parent, start, Vec::new(), AstKind::ArrayValue { cells }))
            }
            Some((TokenKind::String { .. }, text)) => {
                self.pos += 1;
                Some(self.ast.alloc(parent, start, Vec::new(), AstKind::StringValue { value: text }))
            }
            Some((TokenKind::Punctuation, ref p)) if p == "[" => {
                self.pos += 1;
                let mut bytes = Vec::new();
                while !self.is_punct("]") && !self.at_eof() {
                    if let Some(t) = self.peek() {
                        if let Ok(byte) = u8::from_str_radix(&t.text, 16) {
                            bytes.push(byte);
                        }
                        self.pos += 1;
                    }
                }
                self.expect_punct("]");
                Some(self.ast.alloc(parent, start, Vec::new(), AstKind::BytestringValue { bytes }))
            }
            Some((TokenKind::Punctuation, ref p)) if p == "&" => self.parse_ref_value(parent, start),
            Some((TokenKind::Identifier, name)) => {
                self.pos += 1;
                if self.is_punct("(") {
                    let args = self.parse_macro_call_args();
                    Some(self.ast.alloc(parent, start, Vec::new(), AstKind::CMacroCall { name, args }))
                } else {
                    Some(self.ast.alloc(
                        parent,
                        start,
                        Vec::new(),
                        AstKind::Expression { text: name, value: None },
                    ))
                }
            }
            _ => {
                let range = self.current_range();
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                self.diagnostics
                    .push(DtsDiagnostic::new(DiagnosticKind::MisplacedToken, range).with_args([text]));
                self.recover();
                None
            }
        }
    }

    fn parse_ref_value(&mut self, parent: Option<NodeId>, start: Range) -> Option<NodeId> {
        self.pos += 1; // '&'
        if self.eat_punct("{") {
            let mut path = String::new();
            while let Some(t) = self.peek() {
                if t.kind == TokenKind::Punctuation && t.text == "}" {
                    break;
                }
                path.push_str(&t.text);
                self.pos += 1;
            }
            self.expect_punct("}");
            Some(self.ast.alloc(parent, start, Vec::new(), AstKind::NodePathRef { path }))
        } else {
            let name = self.bump().map(|t| t.text.clone()).unwrap_or_default();
            Some(self.ast.alloc(parent, start, Vec::new(), AstKind::LabelRef { name }))
        }
    }

    fn parse_cell_value(&mut self, parent: Option<NodeId>) -> Option<NodeId> {
        let start = self.current_range();
        match self.peek().map(|t| (t.kind.clone(), t.text.clone())) {
            Some((TokenKind::Number, text)) => {
                self.pos += 1;
                let value = crate::preprocessor::expr::parse_number_literal(&text);
                Some(self.ast.alloc(parent, start, Vec::new(), AstKind::Expression { text, value }))
            }
            Some((TokenKind::Punctuation, ref p)) if p == "&" => self.parse_ref_value(parent, start),
            Some((TokenKind::Identifier, name)) => {
                self.pos += 1;
                if self.is_punct("(") {
                    let args = self.parse_macro_call_args();
                    Some(self.ast.alloc(parent, start, Vec::new(), AstKind::CMacroCall { name, args }))
                } else {
                    Some(self.ast.alloc(
                        parent,
                        start,
                        Vec::new(),
                        AstKind::Expression { text: name, value: None },
                    ))
                }
            }
            Some((TokenKind::Punctuation, ref p)) if p == "(" => self.parse_paren_expression(parent, start),
            Some((TokenKind::LabelDef, name)) => {
                self.pos += 1;
                // A label definition inside a cell array (`<foo: 0x1000>`)
                // is recorded as a zero-width marker sharing the next cell's
                // range; the runtime attaches it to that cell's address.
                Some(self.ast.alloc(
                    parent,
                    start,
                    vec![Label { name, range: start }],
                    AstKind::Expression {
                        text: String::new(),
                        value: None,
                    },
                ))
            }
            _ => {
                let range = self.current_range();
                let text = self.peek().map(|t| t.text.clone()).unwrap_or_default();
                self.diagnostics
                    .push(DtsDiagnostic::new(DiagnosticKind::MisplacedToken, range).with_args([text]));
                self.pos += 1;
                None
            }
        }
    }

    fn parse_paren_expression(&mut self, parent: Option<NodeId>, start: Range) -> Option<NodeId> {
        let mut text = String::new();
        let mut depth = 0i32;
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Punctuation && t.text == "(" {
                depth += 1;
            }
            if t.kind == TokenKind::Punctuation && t.text == ")" {
                depth -= 1;
                if depth == 0 {
                    text.push_str(&t.text);
                    self.pos += 1;
                    break;
                }
            }
            text.push_str(&t.text);
            text.push(' ');
            self.pos += 1;
        }
        Some(self.ast.alloc(parent, start, Vec::new(), AstKind::Expression { text, value: None }))
    }

    fn parse_macro_call_args(&mut self) -> Vec<String> {
        self.pos += 1; // '('
        let mut args = Vec::new();
        let mut depth = 0i32;
        let mut current = String::new();
        while let Some(t) = self.peek() {
            if t.kind == TokenKind::Punctuation && t.text == "(" {
                depth += 1;
                current.push_str(&t.text);
                self.pos += 1;
                continue;
            }
            if t.kind == TokenKind::Punctuation && t.text == ")" {
                if depth == 0 {
                    self.pos += 1;
                    break;
                }
                depth -= 1;
                current.push_str(&t.text);
                self.pos += 1;
                continue;
            }
            if t.kind == TokenKind::Punctuation && t.text == "," && depth == 0 {
                args.push(std::mem::take(&mut current));
                self.pos += 1;
                continue;
            }
            current.push_str(&t.text);
            self.pos += 1;
        }
        if !current.is_empty() {
            args.push(current);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> ParseOutput {
        let tokens = Lexer::new(src).tokenize().tokens;
        Parser::new(&tokens).parse()
    }

    #[test]
    fn parses_minimal_root_node() {
        let out = parse("/{};");
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.ast.statements.len(), 1);
        assert!(matches!(out.ast.get(out.ast.statements[0]).kind, AstKind::RootNodeDecl { .. }));
    }

    #[test]
    fn parses_property_with_cell_array_and_label_ref() {
        let out = parse("/{prop1=&l1;cpus{};memory{};};");
        assert!(matches!(out.ast.get(out.ast.statements[0]).kind, AstKind::RootNodeDecl { .. }));
        let AstKind::RootNodeDecl { body } = &out.ast.get(out.ast.statements[0]).kind else {
            panic!()
        };
        let prop = out.ast.get(body[0]);
        assert!(matches!(prop.kind, AstKind::Property { .. }));
    }

    #[test]
    fn reports_missing_semicolon() {
        let out = parse("/{prop1}");
        assert!(!out.diagnostics.is_empty());
    }

    #[test]
    fn parses_delete_node_and_delete_property() {
        let out = parse("/{/delete-node/ &foo;/delete-property/ bar;};");
        let AstKind::RootNodeDecl { body } = &out.ast.get(out.ast.statements[0]).kind else {
            panic!()
        };
        assert!(matches!(out.ast.get(body[0]).kind, AstKind::DeleteNode { .. }));
        assert!(matches!(out.ast.get(body[1]).kind, AstKind::DeleteProperty { .. }));
    }

    #[test]
    fn parses_node_address_suffix() {
        let out = parse("/{node@200{reg=<0x200>;};};");
        let AstKind::RootNodeDecl { body } = &out.ast.get(out.ast.statements[0]).kind else {
            panic!()
        };
        let AstKind::ChildNode { name, address, .. } = &out.ast.get(body[0]).kind else {
            panic!()
        };
        assert_eq!(name, "node");
        assert_eq!(address.as_deref(), Some("200"));
    }
}
