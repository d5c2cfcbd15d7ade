use tower_lsp::lsp_types::{Position, Range};

use crate::diagnostics::{DiagnosticKind, DtsDiagnostic};

use super::token::{Token, TokenKind};

const DIRECTIVE_NAMES: &[&str] = &[
    "include", "define", "if", "ifdef", "ifndef", "else", "elif", "endif", "pragma",
];

const IDENT_EXTRA: &[u8] = b"-,._+?#";

pub struct LexerOutput {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<DtsDiagnostic>,
}

/// Byte-oriented scanner producing a finite token stream terminated by EOF.
/// Never panics: unterminated literals and unknown bytes become diagnostics
/// but the offending text is still consumed into a token (`spec.md` §4.1).
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<DtsDiagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 0,
            col: 0,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> LexerOutput {
        while self.pos < self.src.len() {
            self.scan_one();
        }
        let eof_pos = self.position();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            range: Range::new(eof_pos, eof_pos),
            start_byte: self.pos,
            end_byte: self.pos,
        });
        LexerOutput {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn push(&mut self, kind: TokenKind, start: (usize, Position), text: String) {
        let end_pos = self.position();
        self.tokens.push(Token {
            kind,
            text,
            range: Range::new(start.1, end_pos),
            start_byte: start.0,
            end_byte: self.pos,
        });
    }

    fn start(&self) -> (usize, Position) {
        (self.pos, self.position())
    }

    fn scan_one(&mut self) {
        let start = self.start();
        let Some(b) = self.peek() else { return };

        match b {
            b' ' | b'\t' | b'\r' => {
                while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r')) {
                    self.advance();
                }
                self.push(TokenKind::Whitespace, start, String::new());
            }
            b'\n' => {
                self.advance();
                self.push(TokenKind::Eol, start, String::new());
            }
            b'/' if self.peek_at(1) == Some(b'/') => self.scan_line_comment(start),
            b'/' if self.peek_at(1) == Some(b'*') => self.scan_block_comment(start),
            b'/' if self.try_scan_slash_keyword(start) => {}
            b'"' => self.scan_string(start),
            b'\'' => self.scan_char(start),
            b'0'..=b'9' => self.scan_number(start),
            b'#' if self.try_scan_directive(start) => {}
            _ if is_ident_start(b) => self.scan_identifier(start),
            _ => {
                self.advance();
                self.push(TokenKind::Punctuation, start, (b as char).to_string());
            }
        }
    }

    fn scan_line_comment(&mut self, start: (usize, Position)) {
        while !matches!(self.peek(), None | Some(b'\n')) {
            self.advance();
        }
        self.push(TokenKind::LineComment, start, String::new());
    }

    fn scan_block_comment(&mut self, start: (usize, Position)) {
        self.advance(); // '/'
        self.advance(); // '*'
        let mut terminated = false;
        while self.pos < self.src.len() {
            if self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                self.advance();
                self.advance();
                terminated = true;
                break;
            }
            self.advance();
        }
        if !terminated {
            self.diagnostics.push(DtsDiagnostic::new(
                DiagnosticKind::UnterminatedComment,
                Range::new(start.1, self.position()),
            ));
        }
        self.push(TokenKind::BlockComment { terminated }, start, String::new());
    }

    /// Recognizes `/delete-node/`, `/delete-property/`, `/include/`. Returns
    /// `false` (consuming nothing) if the slash does not start one of these.
    fn try_scan_slash_keyword(&mut self, start: (usize, Position)) -> bool {
        const KEYWORDS: &[(&str, TokenKind)] = &[
            ("delete-node", TokenKind::DeleteNodeKeyword),
            ("delete-property", TokenKind::DeletePropertyKeyword),
            ("include", TokenKind::IncludeKeyword),
        ];

        for (word, kind) in KEYWORDS {
            let probe = format!("/{word}/");
            if self.src[self.pos..].starts_with(probe.as_bytes()) {
                for _ in 0..probe.len() {
                    self.advance();
                }
                self.push(kind.clone(), start, probe);
                return true;
            }
        }
        false
    }

    fn scan_string(&mut self, start: (usize, Position)) {
        self.advance(); // opening quote
        let mut terminated = false;
        let mut text = String::new();
        while let Some(b) = self.peek() {
            if b == b'"' {
                self.advance();
                terminated = true;
                break;
            }
            if b == b'\n' {
                break;
            }
            if b == b'\\' {
                self.advance();
                match self.peek() {
                    Some(esc) if is_valid_escape(esc) => {
                        text.push(esc as char);
                        self.advance();
                    }
                    Some(bad) => {
                        self.diagnostics.push(DtsDiagnostic::new(
                            DiagnosticKind::InvalidEscape,
                            Range::new(self.position(), self.position()),
                        ).with_args([format!("\\{}", bad as char)]));
                        self.advance();
                    }
                    None => {}
                }
                continue;
            }
            text.push(b as char);
            self.advance();
        }
        if !terminated {
            self.diagnostics.push(DtsDiagnostic::new(
                DiagnosticKind::UnterminatedString,
                Range::new(start.1, self.position()),
            ));
        }
        self.push(TokenKind::String { terminated }, start, text);
    }

    fn scan_char(&mut self, start: (usize, Position)) {
        self.advance(); // opening quote
        let mut text = String::new();
        if self.peek() == Some(b'\\') {
            self.advance();
            if let Some(b) = self.advance() {
                text.push(b as char);
            }
        } else if let Some(b) = self.advance() {
            text.push(b as char);
        }
        if self.peek() == Some(b'\'') {
            self.advance();
        } else {
            self.diagnostics.push(DtsDiagnostic::new(
                DiagnosticKind::UnterminatedString,
                Range::new(start.1, self.position()),
            ));
        }
        self.push(TokenKind::Char, start, text);
    }

    fn scan_number(&mut self, start: (usize, Position)) {
        let mut text = String::new();
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            text.push(self.advance().unwrap() as char);
            text.push(self.advance().unwrap() as char);
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                text.push(self.advance().unwrap() as char);
            }
        } else {
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                text.push(self.advance().unwrap() as char);
            }
        }
        // trailing size/unsignedness suffixes (U, L, UL, ULL…) are swallowed
        // as part of the lexeme; the evaluator only needs the numeric part.
        while matches!(self.peek(), Some(b'u') | Some(b'U') | Some(b'l') | Some(b'L')) {
            text.push(self.advance().unwrap() as char);
        }
        self.push(TokenKind::Number, start, text);
    }

    fn try_scan_directive(&mut self, start: (usize, Position)) -> bool {
        let mut probe_len = 1usize;
        while matches!(self.peek_at(probe_len), Some(b) if b.is_ascii_alphabetic()) {
            probe_len += 1;
        }
        let word = std::str::from_utf8(&self.src[self.pos + 1..self.pos + probe_len]).unwrap_or("");
        if !DIRECTIVE_NAMES.contains(&word) {
            return false;
        }
        let next = self.src.get(self.pos + probe_len).copied();
        let boundary_ok = matches!(next, None | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'('));
        if !boundary_ok {
            return false;
        }
        for _ in 0..probe_len {
            self.advance();
        }
        self.push(TokenKind::PreprocessorDirective, start, word.to_string());
        true
    }

    fn scan_identifier(&mut self, start: (usize, Position)) {
        let mut text = String::new();
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || IDENT_EXTRA.contains(&b) {
                text.push(self.advance().unwrap() as char);
            } else {
                break;
            }
        }

        if self.peek() == Some(b':') && self.peek_at(1) != Some(b':') {
            self.advance();
            self.push(TokenKind::LabelDef, start, text);
            return;
        }

        self.push(TokenKind::Identifier, start, text);
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'#'
}

fn is_valid_escape(b: u8) -> bool {
    matches!(b, b'n' | b't' | b'r' | b'0' | b'\\' | b'"' | b'\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eol))
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_label_definition() {
        let out = Lexer::new("foo: node {").tokenize();
        let first = &out.tokens[0];
        assert_eq!(first.kind, TokenKind::LabelDef);
        assert_eq!(first.text, "foo");
    }

    #[test]
    fn distinguishes_directive_hash_from_property_hash() {
        let ks = kinds("#include \"x.dtsi\"\n#address-cells = <1>;");
        assert_eq!(ks[0], TokenKind::PreprocessorDirective);
        // '#address-cells' is a property name (Identifier), not a directive.
        assert!(matches!(ks[2], TokenKind::Identifier));
    }

    #[test]
    fn recognizes_delete_node_keyword() {
        let out = Lexer::new("/delete-node/ &foo;").tokenize();
        assert_eq!(out.tokens[0].kind, TokenKind::DeleteNodeKeyword);
    }

    #[test]
    fn reports_unterminated_string_but_still_emits_token() {
        let out = Lexer::new("prop = \"abc").tokenize();
        assert_eq!(out.diagnostics.len(), 1);
        let string_tok = out
            .tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::String { .. }))
            .expect("string token emitted");
        assert_eq!(string_tok.text, "abc");
    }

    #[test]
    fn scans_hex_and_decimal_numbers() {
        let ks: Vec<_> = Lexer::new("<0x1F 10>")
            .tokenize()
            .tokens
            .into_iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text)
            .collect();
        assert_eq!(ks, vec!["0x1F", "10"]);
    }

    #[test]
    fn never_panics_on_unknown_bytes() {
        let out = Lexer::new("\u{0}\u{1}@@@").tokenize();
        assert!(out.tokens.last().unwrap().kind == TokenKind::Eof);
    }
}
