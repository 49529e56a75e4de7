// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Parser for data-definition operands: `[dup]T[ext][Ln][Ss][Ee]['nominal'|(exprs)]`.

use crate::core::data_def::{known_type, DataDef, Nominal};
use crate::core::diagnostics::Range;
use crate::core::expr::MachExpr;
use crate::core::ids::IdStorage;
use crate::parser::expr_parser::{parse_expr, ExprError};

pub fn parse_data_def(
    text: &str,
    line: u32,
    col: u32,
    ids: &mut IdStorage,
) -> Result<DataDef, ExprError> {
    let bytes = text.as_bytes();
    let whole = Range::line_span(line, col, col + text.len() as u32);
    let mut pos = 0usize;

    let err = |message: &str, start: usize, end: usize| {
        ExprError {
            message: message.to_string(),
            range: Range::line_span(line, col + start as u32, col + end as u32),
        }
    };

    if bytes.is_empty() {
        return Err(err("empty data definition", 0, 0));
    }

    // Duplication factor: digits or a parenthesized expression.
    let dup = if bytes[0].is_ascii_digit() {
        let start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        let value: i64 = text[start..pos]
            .parse()
            .map_err(|_| err("duplication factor out of range", start, pos))?;
        if i32::try_from(value).is_err() {
            return Err(err("duplication factor out of range", start, pos));
        }
        Some(MachExpr::Constant(
            value as i32,
            Range::line_span(line, col + start as u32, col + pos as u32),
        ))
    } else if bytes[0] == b'(' {
        let end = matching_paren(bytes, pos)
            .ok_or_else(|| err("missing closing parenthesis", pos, bytes.len()))?;
        let inner = parse_expr(&text[pos + 1..end], line, col + pos as u32 + 1, ids)?;
        pos = end + 1;
        Some(inner)
    } else {
        None
    };

    if pos >= bytes.len() || !bytes[pos].is_ascii_alphabetic() {
        return Err(err("missing type letter", pos, pos));
    }
    let type_char = bytes[pos].to_ascii_uppercase() as char;
    pos += 1;

    // Type extension: a letter that cannot start a modifier.
    let mut type_ext = None;
    if pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        let letter = bytes[pos].to_ascii_uppercase();
        let is_modifier = matches!(letter, b'L' | b'S' | b'E')
            && bytes
                .get(pos + 1)
                .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'(' | b'+' | b'-'));
        if !is_modifier {
            type_ext = Some(letter as char);
            pos += 1;
        }
    }

    if !known_type(type_char) {
        return Err(err("unknown data type", 0, pos));
    }

    let mut length = None;
    let mut scale = None;
    let mut exponent = None;
    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        let letter = bytes[pos].to_ascii_uppercase();
        if !matches!(letter, b'L' | b'S' | b'E') {
            break;
        }
        pos += 1;
        let allow_sign = letter != b'L';
        let value = parse_modifier_value(text, bytes, &mut pos, line, col, allow_sign, ids)?;
        match letter {
            b'L' => length = Some(value),
            b'S' => scale = Some(value),
            _ => exponent = Some(value),
        }
    }

    let mut nominals = Vec::new();
    if pos < bytes.len() {
        match bytes[pos] {
            b'\'' => {
                let start = pos;
                pos += 1;
                let mut body = String::new();
                loop {
                    match bytes.get(pos) {
                        None => return Err(err("unterminated nominal value", start, pos)),
                        Some(b'\'') if bytes.get(pos + 1) == Some(&b'\'') => {
                            body.push('\'');
                            pos += 2;
                        }
                        Some(b'\'') => {
                            pos += 1;
                            break;
                        }
                        Some(b) => {
                            body.push(*b as char);
                            pos += 1;
                        }
                    }
                }
                nominals.push(Nominal::Text(body));
            }
            b'(' => {
                let end = matching_paren(bytes, pos)
                    .ok_or_else(|| err("missing closing parenthesis", pos, bytes.len()))?;
                let inner = &text[pos + 1..end];
                let mut exprs = Vec::new();
                for (part, part_col) in
                    crate::parser::fields::split_operands(inner, col + pos as u32 + 1)
                {
                    if part.is_empty() {
                        continue;
                    }
                    exprs.push(parse_expr(part, line, part_col, ids)?);
                }
                pos = end + 1;
                nominals.push(Nominal::Exprs(exprs));
            }
            _ => {}
        }
    }

    if pos < bytes.len() {
        return Err(err("unexpected text after data definition", pos, bytes.len()));
    }

    Ok(DataDef {
        type_char,
        type_ext,
        dup,
        length,
        scale,
        exponent,
        nominals,
        range: whole,
    })
}

fn parse_modifier_value(
    text: &str,
    bytes: &[u8],
    pos: &mut usize,
    line: u32,
    col: u32,
    allow_sign: bool,
    ids: &mut IdStorage,
) -> Result<MachExpr, ExprError> {
    let start = *pos;
    match bytes.get(*pos) {
        Some(b'(') => {
            let end = matching_paren(bytes, *pos).ok_or_else(|| ExprError {
                message: "missing closing parenthesis".to_string(),
                range: Range::line_span(line, col + start as u32, col + bytes.len() as u32),
            })?;
            let inner = parse_expr(&text[*pos + 1..end], line, col + *pos as u32 + 1, ids)?;
            *pos = end + 1;
            Ok(inner)
        }
        _ => {
            let mut idx = *pos;
            if allow_sign && matches!(bytes.get(idx), Some(b'+') | Some(b'-')) {
                idx += 1;
            }
            let digits_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            if idx == digits_start {
                return Err(ExprError {
                    message: "modifier needs a value".to_string(),
                    range: Range::line_span(line, col + start as u32, col + idx as u32),
                });
            }
            let value: i64 = text[*pos..idx].parse().map_err(|_| ExprError {
                message: "modifier out of range".to_string(),
                range: Range::line_span(line, col + start as u32, col + idx as u32),
            })?;
            if i32::try_from(value).is_err() {
                return Err(ExprError {
                    message: "modifier out of range".to_string(),
                    range: Range::line_span(line, col + start as u32, col + idx as u32),
                });
            }
            let range = Range::line_span(line, col + start as u32, col + idx as u32);
            *pos = idx;
            Ok(MachExpr::Constant(value as i32, range))
        }
    }
}

/// Index of the parenthesis matching the one at `open`, honoring
/// quoted strings.
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut idx = open;
    while idx < bytes.len() {
        let b = bytes[idx];
        if in_string {
            if b == b'\'' {
                if bytes.get(idx + 1) == Some(&b'\'') {
                    idx += 1;
                } else {
                    in_string = false;
                }
            }
        } else {
            match b {
                b'\'' => in_string = true,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        idx += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> DataDef {
        let mut ids = IdStorage::new();
        parse_data_def(text, 0, 0, &mut ids).expect("data definition should parse")
    }

    #[test]
    fn plain_types() {
        let d = parse("F'1'");
        assert_eq!(d.type_char, 'F');
        assert_eq!(d.nominals, vec![Nominal::Text("1".to_string())]);
        let d = parse("H");
        assert_eq!(d.type_char, 'H');
        assert!(d.nominals.is_empty());
    }

    #[test]
    fn dup_and_length_modifier() {
        let d = parse("3XL2'FF'");
        assert!(matches!(d.dup, Some(MachExpr::Constant(3, _))));
        assert!(matches!(d.length, Some(MachExpr::Constant(2, _))));
        assert_eq!(d.type_char, 'X');
    }

    #[test]
    fn zero_dup_alignment_idiom() {
        let d = parse("0F");
        assert!(matches!(d.dup, Some(MachExpr::Constant(0, _))));
        assert!(d.nominals.is_empty());
    }

    #[test]
    fn parenthesized_modifier_expression() {
        let mut ids = IdStorage::new();
        let d = parse_data_def("CL(SIZE)", 0, 0, &mut ids).unwrap();
        assert!(matches!(d.length, Some(MachExpr::Symbol(_, _))));
    }

    #[test]
    fn address_nominals() {
        let d = parse("A(X,Y)");
        let Nominal::Exprs(exprs) = &d.nominals[0] else {
            panic!("expected expression nominal");
        };
        assert_eq!(exprs.len(), 2);
    }

    #[test]
    fn doubled_apostrophes_in_text() {
        let d = parse("C'IT''S'");
        assert_eq!(d.nominals, vec![Nominal::Text("IT'S".to_string())]);
    }

    #[test]
    fn type_extension() {
        let d = parse("AD(0)");
        assert_eq!(d.type_char, 'A');
        assert_eq!(d.type_ext, Some('D'));
    }

    #[test]
    fn scale_modifier_with_sign() {
        let d = parse("FS-2'1'");
        assert!(matches!(d.scale, Some(MachExpr::Constant(-2, _))));
    }

    #[test]
    fn rejects_garbage() {
        let mut ids = IdStorage::new();
        assert!(parse_data_def("", 0, 0, &mut ids).is_err());
        assert!(parse_data_def("Q'1'", 0, 0, &mut ids).is_err());
        assert!(parse_data_def("F'1'x", 0, 0, &mut ids).is_err());
        assert!(parse_data_def("C'unterminated", 0, 0, &mut ids).is_err());
    }
}
