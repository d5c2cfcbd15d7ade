//! Token-stream preprocessor (`spec.md` §4.2). Expands `#include`,
//! `#define` (object- and function-like), and `#if`/`#ifdef`/`#ifndef`/
//! `#else`/`#elif`/`#endif`, producing an expanded token stream plus the
//! macro registry snapshot later stages read.

pub mod expr;
pub mod macro_table;

pub use macro_table::{MacroDef, MacroRegistry};

use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::Range;

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};
use crate::lexer::{Lexer, Token, TokenKind};

/// Resolves `#include`/`/include/` targets and supplies their contents.
/// Implemented over the filesystem by the context manager; tests supply an
/// in-memory stand-in.
pub trait IncludeLoader {
    fn load(&self, current_file: &Path, target: &str) -> Option<(PathBuf, String)>;
}

pub struct PreprocessorOutput {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<DtsDiagnostic>,
    pub macros: MacroRegistry,
}

struct CondFrame {
    /// Whether tokens under this frame (and all ancestors) should be kept.
    taking: bool,
    /// Whether some branch in this `#if`/`#elif`/`#else` chain has already
    /// been taken, so later `#elif`/`#else` branches must stay inactive.
    taken_ever: bool,
    parent_active: bool,
}

const MAX_INCLUDE_DEPTH: usize = 64;

pub struct Preprocessor<'a> {
    loader: &'a dyn IncludeLoader,
    macros: MacroRegistry,
    diagnostics: Vec<DtsDiagnostic>,
    out: Vec<Token>,
    expanding: Vec<String>,
    including: Vec<PathBuf>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(loader: &'a dyn IncludeLoader) -> Self {
        Self {
            loader,
            macros: MacroRegistry::default(),
            diagnostics: Vec::new(),
            out: Vec::new(),
            expanding: Vec::new(),
            including: Vec::new(),
        }
    }

    pub fn run(mut self, tokens: Vec<Token>, current_file: &Path) -> PreprocessorOutput {
        self.process(tokens, current_file);
        self.out.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            range: Range::default(),
            start_byte: 0,
            end_byte: 0,
        });
        PreprocessorOutput {
            tokens: self.out,
            diagnostics: self.diagnostics,
            macros: self.macros,
        }
    }

    fn process(&mut self, tokens: Vec<Token>, current_file: &Path) {
        let mut i = 0usize;
        let mut cond_stack: Vec<CondFrame> = Vec::new();
        while i < tokens.len() {
            let tok = &tokens[i];
            let currently_active = cond_stack.iter().all(|f| f.taking);

            if let TokenKind::PreprocessorDirective = tok.kind {
                let (args, next_i) = collect_until_eol(&tokens, i + 1);
                match tok.text.as_str() {
                    "ifdef" | "ifndef" | "if" => {
                        let is_true = if currently_active {
                            self.eval_branch_condition(tok.text.as_str(), &args)
                        } else {
                            false
                        };
                        cond_stack.push(CondFrame {
                            taking: currently_active && is_true,
                            taken_ever: currently_active && is_true,
                            parent_active: currently_active,
                        });
                    }
                    "elif" => {
                        if let Some(frame) = cond_stack.last_mut() {
                            let is_true = frame.parent_active
                                && !frame.taken_ever
                                && self.eval_branch_condition("if", &args);
                            frame.taking = is_true;
                            frame.taken_ever = frame.taken_ever || is_true;
                        }
                    }
                    "else" => {
                        if let Some(frame) = cond_stack.last_mut() {
                            frame.taking = frame.parent_active && !frame.taken_ever;
                            frame.taken_ever = true;
                        }
                    }
                    "endif" => {
                        cond_stack.pop();
                    }
                    "define" if currently_active => self.handle_define(&args),
                    "include" if currently_active => self.handle_include(&args, current_file, tok.range),
                    "pragma" => {}
                    _ => {}
                }
                i = next_i;
                continue;
            }

            if !currently_active {
                i += 1;
                continue;
            }

            if tok.kind == TokenKind::Identifier {
                if let Some(expanded_i) = self.try_expand_macro(&tokens, i) {
                    i = expanded_i;
                    continue;
                }
            }

            self.out.push(tok.clone());
            i += 1;
        }

        if let Some(unclosed) = cond_stack.first() {
            let _ = unclosed;
            self.diagnostics.push(DtsDiagnostic::new(
                DiagnosticKind::MissingToken,
                Range::default(),
            ).with_args(["#endif"]));
        }
    }

    fn eval_branch_condition(&self, directive: &str, args: &[Token]) -> bool {
        match directive {
            "ifdef" => args.first().is_some_and(|t| self.macros.get(&t.text).is_some()),
            "ifndef" => args.first().is_none_or(|t| self.macros.get(&t.text).is_none()),
            _ => expr::eval_constant_expr(args, &self.macros).unwrap_or(0) != 0,
        }
    }

    fn handle_define(&mut self, args: &[Token]) {
        let Some(name_tok) = args.first() else { return };
        let name = name_tok.text.clone();

        let (params, body_start) = if args.get(1).is_some_and(|t| t.kind == TokenKind::Punctuation && t.text == "(")
        {
            let mut params = Vec::new();
            let mut j = 2;
            while let Some(t) = args.get(j) {
                if t.kind == TokenKind::Punctuation && t.text == ")" {
                    j += 1;
                    break;
                }
                if t.kind == TokenKind::Identifier {
                    params.push(t.text.clone());
                }
                j += 1;
            }
            (Some(params), j)
        } else {
            (None, 1)
        };

        let body = args.get(body_start..).unwrap_or(&[]).to_vec();
        self.macros.define(MacroDef {
            name,
            params,
            body,
            def_range: name_tok.range,
            invoked: false,
            call_sites: Vec::new(),
        });
    }

    fn handle_include(&mut self, args: &[Token], current_file: &Path, directive_range: Range) {
        let Some(target_tok) = args.first() else { return };
        let target = target_tok.text.clone();

        if self.including.len() >= MAX_INCLUDE_DEPTH {
            self.diagnostics.push(DtsDiagnostic::new(
                DiagnosticKind::MissingInclude,
                directive_range,
            ).with_args([target]));
            return;
        }

        match self.loader.load(current_file, &target) {
            Some((path, contents)) => {
                if self.including.contains(&path) {
                    return;
                }
                self.including.push(path.clone());
                let lexed = Lexer::new(&contents).tokenize();
                self.diagnostics.extend(lexed.diagnostics);
                self.process(lexed.tokens, &path);
                self.including.pop();
            }
            None => {
                self.diagnostics.push(DtsDiagnostic::new(
                    DiagnosticKind::MissingInclude,
                    directive_range,
                ).with_args([target]));
            }
        }
    }

    /// Attempts to expand the macro call starting at `tokens[i]`. Returns the
    /// next index to resume scanning from if expansion happened.
    fn try_expand_macro(&mut self, tokens: &[Token], i: usize) -> Option<usize> {
        let name = tokens[i].text.clone();
        if self.expanding.contains(&name) {
            return None;
        }
        let def = self.macros.get(&name)?.clone();

        if let Some(params) = &def.params {
            let mut j = i + 1;
            while tokens.get(j).is_some_and(|t| t.is_trivia()) {
                j += 1;
            }
            if tokens.get(j).map(|t| t.text.as_str()) != Some("(") {
                return None;
            }
            let (arg_groups, after) = collect_call_args(tokens, j + 1);
            if arg_groups.len() != params.len() && !(params.is_empty() && arg_groups.len() == 1 && arg_groups[0].is_empty()) {
                self.diagnostics.push(DtsDiagnostic::new(
                    DiagnosticKind::MisplacedToken,
                    tokens[i].range,
                ).with_args([format!("{name}(...) arity mismatch")]));
                self.out.push(tokens[i].clone());
                return Some(i + 1);
            }
            self.macros.record_call(&name, tokens[i].range);
            let substituted = substitute_params(&def.body, params, &arg_groups);
            self.expand_and_emit(&name, substituted);
            Some(after)
        } else {
            self.macros.record_call(&name, tokens[i].range);
            self.expand_and_emit(&name, def.body.clone());
            Some(i + 1)
        }
    }

    fn expand_and_emit(&mut self, name: &str, body: Vec<Token>) {
        self.expanding.push(name.to_string());
        let mut j = 0;
        while j < body.len() {
            if body[j].kind == TokenKind::Identifier {
                if let Some(next) = self.try_expand_macro(&body, j) {
                    j = next;
                    continue;
                }
            }
            self.out.push(body[j].clone());
            j += 1;
        }
        self.expanding.pop();
    }
}

fn collect_until_eol(tokens: &[Token], mut i: usize) -> (Vec<Token>, usize) {
    let mut out = Vec::new();
    while let Some(t) = tokens.get(i) {
        if t.kind == TokenKind::Eol {
            i += 1;
            break;
        }
        if t.kind == TokenKind::Eof {
            break;
        }
        if !t.is_trivia() {
            out.push(t.clone());
        }
        i += 1;
    }
    (out, i)
}

/// Splits the parenthesized argument list of a function-like macro call
/// starting just after the opening `(`. Commas inside nested parens do not
/// split arguments.
fn collect_call_args(tokens: &[Token], mut i: usize) -> (Vec<Vec<Token>>, usize) {
    let mut groups: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0i32;
    while let Some(t) = tokens.get(i) {
        if t.is_trivia() {
            i += 1;
            continue;
        }
        match (t.kind.clone(), t.text.as_str()) {
            (TokenKind::Punctuation, "(") => {
                depth += 1;
                groups.last_mut().unwrap().push(t.clone());
            }
            (TokenKind::Punctuation, ")") if depth == 0 => {
                i += 1;
                break;
            }
            (TokenKind::Punctuation, ")") => {
                depth -= 1;
                groups.last_mut().unwrap().push(t.clone());
            }
            (TokenKind::Punctuation, ",") if depth == 0 => {
                groups.push(Vec::new());
            }
            _ => groups.last_mut().unwrap().push(t.clone()),
        }
        i += 1;
    }
    if groups.len() == 1 && groups[0].is_empty() {
        return (Vec::new(), i);
    }
    (groups, i)
}

fn substitute_params(body: &[Token], params: &[String], args: &[Vec<Token>]) -> Vec<Token> {
    let mut out = Vec::new();
    let mut k = 0usize;
    while k < body.len() {
        let tok = &body[k];

        // `#x` lexes as one Identifier token (property names may legally
        // start with `#`), so the stringize operator is detected by text
        // shape rather than as a separate Punctuation token.
        if tok.kind == TokenKind::Identifier {
            if let Some(param_name) = tok.text.strip_prefix('#') {
                if let Some(pos) = params.iter().position(|p| p == param_name) {
                    out.push(stringize(args.get(pos).map(Vec::as_slice).unwrap_or(&[]), tok.range));
                    k += 1;
                    continue;
                }
            }
        }
        if tok.kind == TokenKind::Punctuation && tok.text == "#" {
            if let Some(next) = body.get(k + 1) {
                if let Some(pos) = params.iter().position(|p| p == &next.text) {
                    out.push(stringize(args.get(pos).map(Vec::as_slice).unwrap_or(&[]), tok.range));
                    k += 2;
                    continue;
                }
            }
        }

        if tok.kind == TokenKind::Identifier {
            if let Some(pos) = params.iter().position(|p| p == &tok.text) {
                out.extend(args.get(pos).cloned().unwrap_or_default());
                k += 1;
                continue;
            }
        }

        out.push(tok.clone());
        k += 1;
    }

    paste_tokens(out)
}

fn stringize(arg_tokens: &[Token], range: Range) -> Token {
    let text: String = arg_tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
    Token {
        kind: TokenKind::String { terminated: true },
        text,
        range,
        start_byte: 0,
        end_byte: 0,
    }
}

/// Resolves `##` token pasting: glues the surrounding non-trivia tokens'
/// text into one identifier/number lexeme.
fn paste_tokens(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok.text == "##" {
            if let (Some(prev), Some(next)) = (out.pop(), iter.next()) {
                let pasted_text = format!("{}{}", prev.text, next.text);
                out.push(Token {
                    kind: prev.kind,
                    text: pasted_text,
                    range: prev.range,
                    start_byte: prev.start_byte,
                    end_byte: next.end_byte,
                });
            }
            continue;
        }
        out.push(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoIncludes;
    impl IncludeLoader for NoIncludes {
        fn load(&self, _current_file: &Path, _target: &str) -> Option<(PathBuf, String)> {
            None
        }
    }

    struct MapLoader(std::collections::HashMap<&'static str, &'static str>);
    impl IncludeLoader for MapLoader {
        fn load(&self, _current_file: &Path, target: &str) -> Option<(PathBuf, String)> {
            self.0.get(target).map(|s| (PathBuf::from(target), s.to_string()))
        }
    }

    fn run(src: &str, loader: &dyn IncludeLoader) -> PreprocessorOutput {
        let lexed = Lexer::new(src).tokenize();
        Preprocessor::new(loader).run(lexed.tokens, Path::new("board.dts"))
    }

    fn significant_text(out: &PreprocessorOutput) -> Vec<String> {
        out.tokens
            .iter()
            .filter(|t| !t.is_trivia() && t.kind != TokenKind::Eof)
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn expands_object_like_macro() {
        let out = run("#define N 4\nfoo = <N>;\n", &NoIncludes);
        assert_eq!(significant_text(&out), vec!["foo", "=", "<", "4", ">", ";"]);
    }

    #[test]
    fn expands_function_like_macro_with_args() {
        let out = run("#define ADD(a, b) (a + b)\nx = <ADD(1, 2)>;\n", &NoIncludes);
        let text = significant_text(&out);
        assert_eq!(text, vec!["x", "=", "<", "(", "1", "+", "2", ")", ">", ";"]);
    }

    #[test]
    fn conditional_compilation_skips_false_branch() {
        let out = run(
            "#define FOO\n#ifdef FOO\nkept;\n#else\ndropped;\n#endif\n",
            &NoIncludes,
        );
        let text = significant_text(&out);
        assert!(text.contains(&"kept".to_string()));
        assert!(!text.contains(&"dropped".to_string()));
    }

    #[test]
    fn missing_include_reports_diagnostic() {
        let out = run("#include \"nope.dtsi\"\n", &NoIncludes);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::MissingInclude);
    }

    #[test]
    fn include_splices_resolved_file_tokens() {
        let mut map = std::collections::HashMap::new();
        map.insert("common.dtsi", "shared = <1>;\n");
        let out = run("#include \"common.dtsi\"\n", &MapLoader(map));
        assert_eq!(significant_text(&out), vec!["shared", "=", "<", "1", ">", ";"]);
    }

    #[test]
    fn self_referential_macro_left_unexpanded() {
        let out = run("#define FOO FOO + 1\nv = <FOO>;\n", &NoIncludes);
        let text = significant_text(&out);
        assert_eq!(text, vec!["v", "=", "<", "FOO", "+", "1", ">", ";"]);
    }
}
