// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Recursive-descent parser for machine expressions.
//!
//! Accepts decimal numbers, self-defining terms (`X'..'`, `B'..'`,
//! `C'..'`), ordinary symbols, the location counter `*`, attribute
//! references (`L'SYM`), literals (`=F'1'`) and the operators
//! `+ - * /` plus the word operators `AND OR XOR SLL SRL NOT` at the
//! lowest precedence. Blanks are only possible inside parentheses;
//! the field scanner ends the operand field at a top-level blank.

use std::fmt;

use crate::core::diagnostics::Range;
use crate::core::ebcdic::to_ebcdic;
use crate::core::expr::{AttrKind, BinaryOp, MachExpr, UnaryOp};
use crate::core::ids::IdStorage;
use crate::parser::fields::is_attribute_quote;

#[derive(Debug, Clone)]
pub struct ExprError {
    pub message: String,
    pub range: Range,
}

impl ExprError {
    fn new(message: impl Into<String>, range: Range) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExprError {}

pub fn parse_expr(
    text: &str,
    line: u32,
    col: u32,
    ids: &mut IdStorage,
) -> Result<MachExpr, ExprError> {
    let mut parser = ExprParser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        line,
        col,
        ids,
    };
    parser.skip_blanks();
    let expr = parser.parse_word_ops()?;
    parser.skip_blanks();
    if parser.pos < parser.bytes.len() {
        return Err(ExprError::new(
            format!("unexpected text after expression: {}", &text[parser.pos..]),
            parser.range(parser.pos, text.len()),
        ));
    }
    Ok(expr)
}

struct ExprParser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    ids: &'a mut IdStorage,
}

fn is_symbol_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'@' | b'#' | b'$' | b'_')
}

fn is_symbol_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'@' | b'#' | b'$' | b'_')
}

impl<'a> ExprParser<'a> {
    fn range(&self, start: usize, end: usize) -> Range {
        Range::line_span(self.line, self.col + start as u32, self.col + end as u32)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b' ')) {
            self.pos += 1;
        }
    }

    fn word_at(&self, pos: usize) -> Option<&'a str> {
        let bytes = self.bytes;
        if pos >= bytes.len() || !bytes[pos].is_ascii_alphabetic() {
            return None;
        }
        let mut end = pos;
        while end < bytes.len() && is_symbol_char(bytes[end]) {
            end += 1;
        }
        Some(&self.text[pos..end])
    }

    /// Lowest precedence: AND OR XOR SLL SRL.
    fn parse_word_ops(&mut self) -> Result<MachExpr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            self.skip_blanks();
            let Some(word) = self.word_at(self.pos) else {
                break;
            };
            let op = match word.to_ascii_uppercase().as_str() {
                "AND" => BinaryOp::And,
                "OR" => BinaryOp::Or,
                "XOR" => BinaryOp::Xor,
                "SLL" => BinaryOp::Sll,
                "SRL" => BinaryOp::Srl,
                _ => break,
            };
            let start = self.pos;
            self.pos += word.len();
            self.skip_blanks();
            let rhs = self.parse_additive()?;
            let range = self.range(start, self.pos);
            lhs = MachExpr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<MachExpr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_blanks();
            let op = match self.peek() {
                Some(b'+') => BinaryOp::Add,
                Some(b'-') => BinaryOp::Sub,
                _ => break,
            };
            let start = self.pos;
            self.pos += 1;
            self.skip_blanks();
            let rhs = self.parse_multiplicative()?;
            let range = self.range(start, self.pos);
            lhs = MachExpr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<MachExpr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_blanks();
            let op = match self.peek() {
                Some(b'*') => BinaryOp::Mul,
                Some(b'/') => BinaryOp::Div,
                _ => break,
            };
            let start = self.pos;
            self.pos += 1;
            self.skip_blanks();
            let rhs = self.parse_unary()?;
            let range = self.range(start, self.pos);
            lhs = MachExpr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<MachExpr, ExprError> {
        self.skip_blanks();
        let start = self.pos;
        match self.peek() {
            Some(b'+') => {
                self.pos += 1;
                let expr = self.parse_unary()?;
                let range = self.range(start, self.pos);
                Ok(MachExpr::Unary {
                    op: UnaryOp::Plus,
                    expr: Box::new(expr),
                    range,
                })
            }
            Some(b'-') => {
                self.pos += 1;
                let expr = self.parse_unary()?;
                let range = self.range(start, self.pos);
                Ok(MachExpr::Unary {
                    op: UnaryOp::Minus,
                    expr: Box::new(expr),
                    range,
                })
            }
            _ => {
                if let Some(word) = self.word_at(self.pos) {
                    if word.eq_ignore_ascii_case("NOT")
                        && self
                            .bytes
                            .get(self.pos + word.len())
                            .is_some_and(|b| *b == b' ' || *b == b'(')
                    {
                        self.pos += word.len();
                        let expr = self.parse_unary()?;
                        let range = self.range(start, self.pos);
                        return Ok(MachExpr::Unary {
                            op: UnaryOp::Not,
                            expr: Box::new(expr),
                            range,
                        });
                    }
                }
                self.parse_primary()
            }
        }
    }

    fn parse_primary(&mut self) -> Result<MachExpr, ExprError> {
        self.skip_blanks();
        let start = self.pos;
        match self.peek() {
            None => Err(ExprError::new(
                "expression ends unexpectedly",
                self.range(start, start),
            )),
            Some(b'(') => {
                self.pos += 1;
                let expr = self.parse_word_ops()?;
                self.skip_blanks();
                if self.peek() != Some(b')') {
                    return Err(ExprError::new(
                        "missing closing parenthesis",
                        self.range(start, self.pos),
                    ));
                }
                self.pos += 1;
                Ok(expr)
            }
            Some(b'*') => {
                self.pos += 1;
                Ok(MachExpr::LocCounter(self.range(start, self.pos)))
            }
            Some(b'=') => self.parse_literal(start),
            Some(b) if b.is_ascii_digit() => self.parse_number(start),
            Some(b) if is_symbol_start(b) => self.parse_name(start),
            Some(b) => Err(ExprError::new(
                format!("unexpected character '{}'", b as char),
                self.range(start, start + 1),
            )),
        }
    }

    fn parse_number(&mut self, start: usize) -> Result<MachExpr, ExprError> {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let text = &self.text[start..self.pos];
        match text.parse::<i64>() {
            Ok(value) if i32::try_from(value).is_ok() => Ok(MachExpr::Constant(
                value as i32,
                self.range(start, self.pos),
            )),
            _ => Err(ExprError::new(
                format!("number out of range: {text}"),
                self.range(start, self.pos),
            )),
        }
    }

    fn parse_name(&mut self, start: usize) -> Result<MachExpr, ExprError> {
        // Self-defining term or attribute reference?
        let b0 = self.bytes[self.pos].to_ascii_uppercase();
        if self.bytes.get(self.pos + 1) == Some(&b'\'') {
            match b0 {
                b'X' | b'B' | b'C' => return self.parse_self_defining(b0, start),
                _ => {
                    if is_attribute_quote(self.bytes, self.pos + 1) {
                        return self.parse_attr_ref(b0, start);
                    }
                }
            }
        }
        while self.peek().is_some_and(is_symbol_char) {
            self.pos += 1;
        }
        let name = &self.text[start..self.pos];
        let id = self.ids.intern(name).map_err(|err| {
            ExprError::new(format!("invalid symbol name: {err}"), self.range(start, self.pos))
        })?;
        Ok(MachExpr::Symbol(id, self.range(start, self.pos)))
    }

    fn parse_attr_ref(&mut self, letter: u8, start: usize) -> Result<MachExpr, ExprError> {
        let Some(attr) = AttrKind::from_letter(letter as char) else {
            return Err(ExprError::new(
                format!("unsupported attribute {}'", letter as char),
                self.range(start, self.pos + 1),
            ));
        };
        self.pos += 2;
        let sym_start = self.pos;
        while self.peek().is_some_and(is_symbol_char) {
            self.pos += 1;
        }
        if sym_start == self.pos {
            return Err(ExprError::new(
                "attribute reference needs a symbol",
                self.range(start, self.pos),
            ));
        }
        let name = &self.text[sym_start..self.pos];
        let id = self.ids.intern(name).map_err(|err| {
            ExprError::new(
                format!("invalid symbol name: {err}"),
                self.range(sym_start, self.pos),
            )
        })?;
        Ok(MachExpr::AttrRef {
            attr,
            symbol: id,
            range: self.range(start, self.pos),
        })
    }

    fn parse_self_defining(&mut self, kind: u8, start: usize) -> Result<MachExpr, ExprError> {
        self.pos += 2;
        let body_start = self.pos;
        while self.peek().is_some_and(|b| b != b'\'') {
            self.pos += 1;
        }
        if self.peek() != Some(b'\'') {
            return Err(ExprError::new(
                "unterminated self-defining term",
                self.range(start, self.pos),
            ));
        }
        let body = &self.text[body_start..self.pos];
        self.pos += 1;
        let value: i64 = match kind {
            b'X' => i64::from_str_radix(body, 16).map_err(|_| {
                ExprError::new(
                    format!("invalid hexadecimal term X'{body}'"),
                    self.range(start, self.pos),
                )
            })?,
            b'B' => i64::from_str_radix(body, 2).map_err(|_| {
                ExprError::new(
                    format!("invalid binary term B'{body}'"),
                    self.range(start, self.pos),
                )
            })?,
            _ => {
                let chars: Vec<u8> = body.replace("''", "'").bytes().collect();
                if chars.is_empty() || chars.len() > 4 {
                    return Err(ExprError::new(
                        "character term must hold 1 to 4 characters",
                        self.range(start, self.pos),
                    ));
                }
                let mut value = 0i64;
                for c in chars {
                    value = (value << 8) | to_ebcdic(c) as i64;
                }
                value
            }
        };
        if i32::try_from(value).is_err() && u32::try_from(value).is_err() {
            return Err(ExprError::new(
                "self-defining term out of range",
                self.range(start, self.pos),
            ));
        }
        Ok(MachExpr::Constant(value as i32, self.range(start, self.pos)))
    }

    /// Consume a literal term: `=` followed by a data definition.
    fn parse_literal(&mut self, start: usize) -> Result<MachExpr, ExprError> {
        self.pos += 1;
        let mut depth = 0i32;
        let mut in_string = false;
        while let Some(b) = self.peek() {
            if in_string {
                if b == b'\'' {
                    if self.bytes.get(self.pos + 1) == Some(&b'\'') {
                        self.pos += 1;
                    } else {
                        in_string = false;
                    }
                }
            } else {
                match b {
                    b'\'' => in_string = true,
                    b'(' => depth += 1,
                    b')' => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    b'+' | b'-' | b'*' | b'/' | b' ' if depth == 0 => break,
                    _ => {}
                }
            }
            self.pos += 1;
        }
        if self.pos == start + 1 {
            return Err(ExprError::new(
                "empty literal",
                self.range(start, self.pos),
            ));
        }
        let text = self.text[start..self.pos].to_ascii_uppercase();
        Ok(MachExpr::Literal {
            text,
            range: self.range(start, self.pos),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol::SymbolValue;

    fn parse(text: &str) -> MachExpr {
        let mut ids = IdStorage::new();
        parse_expr(text, 0, 0, &mut ids).expect("expression should parse")
    }

    struct NoView(crate::core::address::SpaceRegistry);

    impl crate::core::expr::SolverView for NoView {
        fn lookup(&self, _id: crate::core::ids::Id) -> crate::core::expr::SymbolLookup<'_> {
            crate::core::expr::SymbolLookup::Unknown
        }

        fn loctr(&self) -> Option<&crate::core::address::Address> {
            None
        }

        fn literal_symbol(&self, _text: &str) -> Option<crate::core::ids::Id> {
            None
        }

        fn spaces(&self) -> &crate::core::address::SpaceRegistry {
            &self.0
        }
    }

    fn eval(text: &str) -> SymbolValue {
        parse(text).evaluate_silent(&NoView(crate::core::address::SpaceRegistry::new()))
    }

    #[test]
    fn precedence_mul_over_add() {
        assert_eq!(eval("2+3*4"), SymbolValue::Absolute(14));
        assert_eq!(eval("(2+3)*4"), SymbolValue::Absolute(20));
    }

    #[test]
    fn unary_minus_binds_tight() {
        assert_eq!(eval("-2+5"), SymbolValue::Absolute(3));
        assert_eq!(eval("10--2"), SymbolValue::Absolute(12));
    }

    #[test]
    fn self_defining_terms() {
        assert_eq!(eval("X'FF'"), SymbolValue::Absolute(255));
        assert_eq!(eval("B'1010'"), SymbolValue::Absolute(10));
        assert_eq!(eval("C'A'"), SymbolValue::Absolute(0xC1));
    }

    #[test]
    fn word_operators_inside_parens() {
        assert_eq!(eval("(6 AND 3)"), SymbolValue::Absolute(2));
        assert_eq!(eval("(1 SLL 4)"), SymbolValue::Absolute(16));
        assert_eq!(eval("(5 XOR 1)"), SymbolValue::Absolute(4));
    }

    #[test]
    fn loctr_term_vs_multiplication() {
        let expr = parse("*+4");
        let MachExpr::Binary { op, left, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*left, MachExpr::LocCounter(_)));
    }

    #[test]
    fn attribute_reference() {
        let expr = parse("L'FIELD+1");
        let MachExpr::Binary { left, .. } = expr else {
            panic!("expected binary expression");
        };
        assert!(matches!(
            *left,
            MachExpr::AttrRef {
                attr: AttrKind::Length,
                ..
            }
        ));
    }

    #[test]
    fn literal_term_is_kept_textually() {
        let expr = parse("=F'1'");
        assert!(matches!(expr, MachExpr::Literal { ref text, .. } if text == "=F'1'"));
        let expr = parse("=F'1'+8");
        let MachExpr::Binary { left, right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert!(matches!(*left, MachExpr::Literal { .. }));
        assert!(matches!(*right, MachExpr::Constant(8, _)));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut ids = IdStorage::new();
        assert!(parse_expr("1++", 0, 0, &mut ids).is_err());
        assert!(parse_expr("X'ZZ'", 0, 0, &mut ids).is_err());
        assert!(parse_expr("(1", 0, 0, &mut ids).is_err());
        assert!(parse_expr("", 0, 0, &mut ids).is_err());
    }
}
