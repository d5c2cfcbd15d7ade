//! Formatter (`spec.md` §4.7, seed scenario S7): reindents by brace depth and
//! normalizes intra-line token spacing. Operates on raw source text (not the
//! macro-expanded token stream) so formatting never depends on which macros
//! happen to be defined elsewhere in the context.

use crate::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
    pub trim_trailing_whitespace: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { tab_size: 4, insert_spaces: true, trim_trailing_whitespace: true }
    }
}

/// No space is inserted immediately before one of these lexemes.
const NO_SPACE_BEFORE: &[&str] = &[";", ",", ")", "]", ">", "@"];
/// No space is inserted immediately after one of these lexemes.
const NO_SPACE_AFTER: &[&str] = &["(", "[", "<", "@", "&"];

/// Reformats `text`, preserving its original line breaks but reindenting each
/// line by `{`/`}` nesting depth and normalizing spacing between tokens.
/// Idempotent: formatting already-formatted text returns it unchanged.
pub fn format_document(text: &str, options: &FormatOptions) -> String {
    let tokens = Lexer::new(text).tokenize().tokens;
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Eol | TokenKind::Eof))
        .collect();

    if significant.is_empty() {
        return String::new();
    }

    let mut lines: Vec<Vec<&Token>> = Vec::new();
    let mut current_line: Option<u32> = None;
    for tok in &significant {
        let line_no = tok.range.start.line;
        if current_line != Some(line_no) {
            lines.push(Vec::new());
            current_line = Some(line_no);
        }
        lines.last_mut().unwrap().push(*tok);
    }

    let mut depth: i32 = 0;
    let mut out_lines = Vec::with_capacity(lines.len());
    for line_tokens in &lines {
        let mut leading_closers = 0i32;
        for tok in line_tokens.iter() {
            if is_punct(tok, "}") {
                leading_closers += 1;
            } else {
                break;
            }
        }
        let indent_depth = (depth - leading_closers).max(0) as u32;
        let indent = make_indent(indent_depth, options);
        let body = render_line(line_tokens, text);
        let mut rendered = format!("{indent}{body}");
        if options.trim_trailing_whitespace {
            let trimmed_len = rendered.trim_end().len();
            rendered.truncate(trimmed_len);
        }
        out_lines.push(rendered);

        for tok in line_tokens.iter() {
            if is_punct(tok, "{") {
                depth += 1;
            } else if is_punct(tok, "}") {
                depth -= 1;
            }
        }
    }

    out_lines.join("\n")
}

fn is_punct(tok: &Token, lexeme: &str) -> bool {
    tok.kind == TokenKind::Punctuation && tok.text == lexeme
}

fn make_indent(depth: u32, options: &FormatOptions) -> String {
    if options.insert_spaces {
        " ".repeat(options.tab_size as usize * depth as usize)
    } else {
        "\t".repeat(depth as usize)
    }
}

fn render_line(tokens: &[&Token], source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            let prev = tokens[i - 1];
            if !NO_SPACE_AFTER.contains(&prev.text.as_str()) && !NO_SPACE_BEFORE.contains(&tok.text.as_str()) {
                out.push(' ');
            }
        }
        out.push_str(std::str::from_utf8(&bytes[tok.start_byte..tok.end_byte]).unwrap_or(""));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FormatOptions {
        FormatOptions { tab_size: 4, insert_spaces: false, trim_trailing_whitespace: true }
    }

    #[test]
    fn empty_root_node_is_spaced() {
        assert_eq!(format_document("/{};", &opts()), "/ { };");
    }

    #[test]
    fn formatting_is_idempotent() {
        let once = format_document("/{};", &opts());
        let twice = format_document(&once, &opts());
        assert_eq!(once, twice);
    }

    #[test]
    fn reindents_nested_blocks_by_depth() {
        let src = "/ {\nnode@0 {\nreg = <0 1>;\n};\n};";
        let out = format_document(src, &opts());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "/ {");
        assert_eq!(lines[1], "\tnode@0 {");
        assert_eq!(lines[2], "\t\treg = <0 1>;");
        assert_eq!(lines[3], "\t};");
        assert_eq!(lines[4], "};");
    }

    #[test]
    fn unit_address_has_no_internal_spacing() {
        let out = format_document("/{node@20{};};", &opts());
        assert!(out.contains("node@20"));
    }

    #[test]
    fn trims_trailing_whitespace() {
        let out = format_document("/{   \n};", &opts());
        assert!(!out.lines().next().unwrap().ends_with(' '));
    }
}
