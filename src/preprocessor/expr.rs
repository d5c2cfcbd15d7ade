//! Constant-expression evaluator for `#if`/`#elif` (`spec.md` §4.2). Covers
//! the bounded subset of C this server promises: integer literals, `defined`,
//! unary `!`/`-`, and the usual comparison/logical/arithmetic operators.

use crate::lexer::{Token, TokenKind};

use super::macro_table::MacroRegistry;

pub fn eval_constant_expr(tokens: &[Token], macros: &MacroRegistry) -> Option<i64> {
    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.is_trivia()).collect();
    let mut parser = ExprParser {
        tokens: &significant,
        pos: 0,
        macros,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(value)
}

struct ExprParser<'a> {
    tokens: &'a [&'a Token],
    pos: usize,
    macros: &'a MacroRegistry,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self) -> Option<&str> {
        self.peek().map(|t| t.text.as_str())
    }

    fn bump(&mut self) -> Option<&&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Punctuation)) && self.peek_text() == Some(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Option<i64> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.matches_two_char('|', '|') {
                self.advance_two_char();
                let rhs = self.parse_and()?;
                lhs = ((lhs != 0) || (rhs != 0)) as i64;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<i64> {
        let mut lhs = self.parse_equality()?;
        loop {
            if self.matches_two_char('&', '&') {
                self.advance_two_char();
                let rhs = self.parse_equality()?;
                lhs = ((lhs != 0) && (rhs != 0)) as i64;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<i64> {
        let mut lhs = self.parse_relational()?;
        loop {
            if self.matches_two_char('=', '=') {
                self.advance_two_char();
                lhs = (lhs == self.parse_relational()?) as i64;
            } else if self.matches_two_char('!', '=') {
                self.advance_two_char();
                lhs = (lhs != self.parse_relational()?) as i64;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_relational(&mut self) -> Option<i64> {
        let mut lhs = self.parse_additive()?;
        loop {
            if self.matches_two_char('<', '=') {
                self.advance_two_char();
                lhs = (lhs <= self.parse_additive()?) as i64;
            } else if self.matches_two_char('>', '=') {
                self.advance_two_char();
                lhs = (lhs >= self.parse_additive()?) as i64;
            } else if self.eat_punct("<") {
                lhs = (lhs < self.parse_additive()?) as i64;
            } else if self.eat_punct(">") {
                lhs = (lhs > self.parse_additive()?) as i64;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<i64> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            if self.eat_punct("+") {
                lhs += self.parse_multiplicative()?;
            } else if self.eat_punct("-") {
                lhs -= self.parse_multiplicative()?;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<i64> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_punct("*") {
                lhs *= self.parse_unary()?;
            } else if self.eat_punct("/") {
                let rhs = self.parse_unary()?;
                if rhs == 0 {
                    return None;
                }
                lhs /= rhs;
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<i64> {
        if self.eat_punct("!") {
            return Some((self.parse_unary()? == 0) as i64);
        }
        if self.eat_punct("-") {
            return Some(-self.parse_unary()?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<i64> {
        if self.peek_text() == Some("defined") {
            self.bump();
            let parenthesized = self.eat_punct("(");
            let name = self.bump()?.text.clone();
            if parenthesized {
                self.eat_punct(")");
            }
            return Some(self.macros.get(&name).is_some() as i64);
        }
        if self.eat_punct("(") {
            let value = self.parse_or()?;
            self.eat_punct(")");
            return Some(value);
        }
        let tok = self.bump()?;
        match tok.kind {
            TokenKind::Number => parse_number_literal(&tok.text),
            TokenKind::Identifier => {
                if let Some(def) = self.macros.get(&tok.text) {
                    eval_constant_expr(&def.body, self.macros)
                } else {
                    Some(0)
                }
            }
            _ => None,
        }
    }

    fn matches_two_char(&self, a: char, b: char) -> bool {
        self.peek_text() == Some(a.to_string().as_str())
            && self
                .tokens
                .get(self.pos + 1)
                .map(|t| t.text.as_str())
                == Some(b.to_string().as_str())
    }

    fn advance_two_char(&mut self) {
        self.pos += 2;
    }
}

pub fn parse_number_literal(text: &str) -> Option<i64> {
    let trimmed = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        i64::from_str_radix(trimmed, 8).ok()
    } else {
        trimmed.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().tokens
    }

    #[test]
    fn evaluates_arithmetic_and_comparison() {
        let registry = MacroRegistry::default();
        assert_eq!(eval_constant_expr(&toks("1 + 2 * 3"), &registry), Some(7));
        assert_eq!(eval_constant_expr(&toks("(1 + 2) * 3"), &registry), Some(9));
        assert_eq!(eval_constant_expr(&toks("4 >= 4"), &registry), Some(1));
    }

    #[test]
    fn evaluates_defined() {
        let mut registry = MacroRegistry::default();
        registry.define(crate::preprocessor::macro_table::MacroDef {
            name: "FOO".into(),
            params: None,
            body: toks("1"),
            def_range: tower_lsp::lsp_types::Range::default(),
            invoked: false,
            call_sites: Vec::new(),
        });
        assert_eq!(eval_constant_expr(&toks("defined(FOO)"), &registry), Some(1));
        assert_eq!(eval_constant_expr(&toks("defined(BAR)"), &registry), Some(0));
        assert_eq!(eval_constant_expr(&toks("!defined(BAR)"), &registry), Some(1));
    }
}
