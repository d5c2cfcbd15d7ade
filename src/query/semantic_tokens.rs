//! Semantic tokens (`spec.md` §4.7): classifies the raw lexer token stream
//! rather than the AST, since individual identifier spans (node names,
//! property names, label references) aren't separately tracked once parsed
//! into `AstKind::ChildNode`/`Property` — the lexer's positions are exact,
//! the AST's are whole-construct.

use tower_lsp::lsp_types::{SemanticToken, SemanticTokenType, SemanticTokens, Url};

use crate::context::Context;
use crate::lexer::{Token, TokenKind};

pub const LEGEND: &[SemanticTokenType] = &[
    SemanticTokenType::NAMESPACE, // 0: node name
    SemanticTokenType::PROPERTY,  // 1: property name
    SemanticTokenType::LABEL,     // 2: label definition / reference
    SemanticTokenType::NUMBER,    // 3
    SemanticTokenType::STRING,    // 4
    SemanticTokenType::COMMENT,   // 5
    SemanticTokenType::MACRO,     // 6
    SemanticTokenType::KEYWORD,   // 7
];

const NAMESPACE: u32 = 0;
const PROPERTY: u32 = 1;
const LABEL: u32 = 2;
const NUMBER: u32 = 3;
const STRING: u32 = 4;
const COMMENT: u32 = 5;
const MACRO: u32 = 6;
const KEYWORD: u32 = 7;

pub fn semantic_tokens(ctx: &Context, uri: &Url) -> Option<SemanticTokens> {
    let tokens = ctx.tokens_for(uri)?;
    let significant: Vec<&Token> =
        tokens.iter().filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eol | TokenKind::Eof)).collect();

    let mut data = Vec::new();
    let mut prev_line = 0u32;
    let mut prev_start = 0u32;

    for (i, tok) in significant.iter().enumerate() {
        let Some(token_type) = classify(tok, significant.get(i.wrapping_sub(1)).copied(), significant.get(i + 1).copied(), ctx)
        else {
            continue;
        };

        let line = tok.range.start.line;
        let start = tok.range.start.character;
        let delta_line = line - prev_line;
        let delta_start = if delta_line == 0 { start - prev_start } else { start };
        let length = tok.range.end.character.saturating_sub(tok.range.start.character);

        data.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: 0,
        });
        prev_line = line;
        prev_start = start;
    }

    Some(SemanticTokens { result_id: None, data })
}

fn classify(tok: &Token, prev: Option<&Token>, next: Option<&Token>, ctx: &Context) -> Option<u32> {
    match &tok.kind {
        TokenKind::LabelDef => Some(LABEL),
        TokenKind::Number => Some(NUMBER),
        TokenKind::String { .. } | TokenKind::Char => Some(STRING),
        TokenKind::LineComment | TokenKind::BlockComment { .. } => Some(COMMENT),
        TokenKind::PreprocessorDirective
        | TokenKind::DeleteNodeKeyword
        | TokenKind::DeletePropertyKeyword
        | TokenKind::IncludeKeyword => Some(KEYWORD),
        TokenKind::Identifier => {
            if ctx.macros.get(&tok.text).is_some() {
                Some(MACRO)
            } else if matches!(prev.map(|t| t.text.as_str()), Some("&")) {
                Some(LABEL)
            } else if matches!(next.map(|t| t.text.as_str()), Some("=")) {
                Some(PROPERTY)
            } else if matches!(next.map(|t| t.text.as_str()), Some("{") | Some("@")) {
                Some(NAMESPACE)
            } else {
                None
            }
        }
        _ => None,
    }
}
