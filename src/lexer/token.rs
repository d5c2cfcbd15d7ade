use tower_lsp::lsp_types::Range;

/// Closed set of lexeme kinds (`spec.md` §3 "Token", §4.1 "Lexer").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    /// `name:` — a label definition, adjacent to its identifier with no
    /// intervening whitespace.
    LabelDef,
    Number,
    Char,
    String { terminated: bool },
    BlockComment { terminated: bool },
    LineComment,
    Whitespace,
    Eol,
    /// `/delete-node/`, `/delete-property/`, `/include/`.
    DeleteNodeKeyword,
    DeletePropertyKeyword,
    IncludeKeyword,
    /// `#include`, `#define`, `#if`, `#ifdef`, `#ifndef`, `#else`, `#elif`,
    /// `#endif`, `#pragma` — only recognized when the word right after `#`
    /// is one of these names; otherwise `#` is ordinary identifier text
    /// (`#address-cells` is a property name, not a directive).
    PreprocessorDirective,
    Punctuation,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace
                | TokenKind::Eol
                | TokenKind::LineComment
                | TokenKind::BlockComment { .. }
        )
    }
}
