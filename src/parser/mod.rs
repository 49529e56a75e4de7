// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement parsing: records in, rebuilt statements out.

pub mod data_def_parser;
pub mod expr_parser;
pub mod fields;
pub mod variables;

use crate::core::diagnostics::{Diagnostic, Range};
use crate::core::ids::IdStorage;
use crate::core::statement::{ComplexArg, LabelField, Operand, OperandKind, RebuiltStatement};
use crate::parser::expr_parser::parse_expr;
use crate::parser::fields::{scan_line, split_operands, LineKind};

#[derive(Debug)]
pub enum ParsedLine {
    Blank,
    Comment,
    Statement(RebuiltStatement),
}

/// Parse one source record. Substitution has already happened; label
/// problems surface as diagnostics, operand problems as `Bad` operands
/// for the dispatcher to judge in context.
pub fn parse_line(
    line: &str,
    line_no: u32,
    ids: &mut IdStorage,
) -> (ParsedLine, Vec<Diagnostic>) {
    let mut diags = Vec::new();
    let fields = match scan_line(line) {
        LineKind::Blank => return (ParsedLine::Blank, diags),
        LineKind::Comment => return (ParsedLine::Comment, diags),
        LineKind::Statement(fields) => fields,
    };

    let label = match fields.label {
        None => LabelField::Empty,
        Some((text, col)) => {
            let range = Range::line_span(line_no, col, col + text.len() as u32);
            if let Some(rest) = text.strip_prefix('.') {
                if rest.is_empty() {
                    diags.push(Diagnostic::error("E065", "invalid sequence symbol", range));
                    LabelField::Empty
                } else {
                    LabelField::Sequence {
                        id: ids.add(text),
                        range,
                    }
                }
            } else if text.starts_with('&') {
                LabelField::Variable {
                    text: text.to_string(),
                    range,
                }
            } else {
                match ids.intern(text) {
                    Ok(id) => LabelField::Ordinary { id, range },
                    Err(err) => {
                        diags.push(Diagnostic::error(
                            "E065",
                            format!("invalid symbol name: {err}"),
                            range,
                        ));
                        LabelField::Empty
                    }
                }
            }
        }
    };

    let Some((opcode_text, opcode_col)) = fields.opcode else {
        // A label alone is not a statement; report nothing here and
        // let the dispatcher never see it.
        return (ParsedLine::Blank, diags);
    };
    let opcode_range =
        Range::line_span(line_no, opcode_col, opcode_col + opcode_text.len() as u32);

    let mut operands = Vec::new();
    let mut operands_range = Range::line_span(
        line_no,
        opcode_col + opcode_text.len() as u32,
        opcode_col + opcode_text.len() as u32,
    );
    if let Some((field, field_col)) = fields.operands {
        operands_range = Range::line_span(line_no, field_col, field_col + field.len() as u32);
        for (text, col) in split_operands(field, field_col) {
            operands.push(classify_operand(text, line_no, col, ids));
        }
    }

    let stmt = RebuiltStatement {
        label,
        opcode: opcode_text.to_ascii_uppercase(),
        opcode_range,
        operands,
        operands_range,
        range: Range::line_span(line_no, 0, line.trim_end().len() as u32),
        line: line_no,
    };
    (ParsedLine::Statement(stmt), diags)
}

fn classify_operand(text: &str, line: u32, col: u32, ids: &mut IdStorage) -> Operand {
    let range = Range::line_span(line, col, col + text.len() as u32);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Operand {
            text: text.to_string(),
            kind: OperandKind::Empty,
            range,
        };
    }

    let kind = if trimmed.starts_with('\'') {
        match parse_quoted(trimmed) {
            Some(body) => OperandKind::String(body),
            None => OperandKind::Bad("unterminated string operand".to_string()),
        }
    } else if let Some(complex) = try_complex(trimmed, line, col) {
        complex
    } else if trimmed.starts_with('(') && trimmed.ends_with(')') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts = split_operands(inner, col + 1);
        if parts.len() == 2 {
            let base = parse_expr(parts[0].0, line, parts[0].1, ids);
            let end = parse_expr(parts[1].0, line, parts[1].1, ids);
            match (base, end) {
                (Ok(base), Ok(end)) => OperandKind::Pair(base, end),
                (Err(err), _) | (_, Err(err)) => OperandKind::Bad(err.message),
            }
        } else {
            expr_kind(trimmed, line, col, ids)
        }
    } else {
        expr_kind(trimmed, line, col, ids)
    };

    Operand {
        text: trimmed.to_string(),
        kind,
        range,
    }
}

fn expr_kind(text: &str, line: u32, col: u32, ids: &mut IdStorage) -> OperandKind {
    match parse_expr(text, line, col, ids) {
        Ok(expr) => OperandKind::Expr(expr),
        Err(err) => OperandKind::Bad(err.message),
    }
}

/// `KEYWORD(args)` with nothing after the closing parenthesis.
fn try_complex(text: &str, line: u32, col: u32) -> Option<OperandKind> {
    let bytes = text.as_bytes();
    let mut idx = 0usize;
    while idx < bytes.len()
        && (bytes[idx].is_ascii_alphanumeric() || matches!(bytes[idx], b'@' | b'#' | b'$' | b'_'))
    {
        idx += 1;
    }
    if idx == 0 || !bytes[0].is_ascii_alphabetic() {
        return None;
    }
    if bytes.get(idx) != Some(&b'(') || !text.ends_with(')') {
        return None;
    }
    let keyword = text[..idx].to_ascii_uppercase();
    let inner = &text[idx + 1..text.len() - 1];
    if inner.contains('(') {
        // Nested parentheses mean this is an expression, not a
        // keyword operand.
        return None;
    }
    let args = split_operands(inner, col + idx as u32 + 1)
        .into_iter()
        .map(|(arg, arg_col)| ComplexArg {
            text: arg.trim().to_string(),
            range: Range::line_span(line, arg_col, arg_col + arg.len() as u32),
        })
        .collect();
    Some(OperandKind::Complex { keyword, args })
}

fn parse_quoted(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut body = String::new();
    let mut idx = 1usize;
    loop {
        match bytes.get(idx) {
            None => return None,
            Some(b'\'') if bytes.get(idx + 1) == Some(&b'\'') => {
                body.push('\'');
                idx += 2;
            }
            Some(b'\'') => {
                idx += 1;
                break;
            }
            Some(b) => {
                body.push(*b as char);
                idx += 1;
            }
        }
    }
    if idx == bytes.len() {
        Some(body)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::MachExpr;

    fn stmt(line: &str) -> RebuiltStatement {
        let mut ids = IdStorage::new();
        let (parsed, diags) = parse_line(line, 0, &mut ids);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        match parsed {
            ParsedLine::Statement(stmt) => stmt,
            other => panic!("expected statement, got {other:?}"),
        }
    }

    #[test]
    fn label_and_opcode() {
        let s = stmt("HERE EQU *");
        assert!(matches!(s.label, LabelField::Ordinary { .. }));
        assert_eq!(s.opcode, "EQU");
        assert_eq!(s.operands.len(), 1);
        assert!(matches!(
            s.operands[0].kind,
            OperandKind::Expr(MachExpr::LocCounter(_))
        ));
    }

    #[test]
    fn sequence_label() {
        let s = stmt(".LOOP ANOP");
        assert!(matches!(s.label, LabelField::Sequence { .. }));
    }

    #[test]
    fn invalid_label_reports_e065() {
        let mut ids = IdStorage::new();
        let long = format!("{} DC F'1'", "A".repeat(70));
        let (parsed, diags) = parse_line(&long, 0, &mut ids);
        assert!(matches!(parsed, ParsedLine::Statement(_)));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E065");
    }

    #[test]
    fn string_operand() {
        let s = stmt(" MNOTE 8,'boom'");
        assert!(matches!(s.operands[0].kind, OperandKind::Expr(_)));
        assert_eq!(s.operands[1].string(), Some("boom"));
    }

    #[test]
    fn complex_operand() {
        let s = stmt(" EXTRN PART(A,B)");
        let OperandKind::Complex { keyword, args } = &s.operands[0].kind else {
            panic!("expected complex operand");
        };
        assert_eq!(keyword, "PART");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn base_end_pair() {
        let s = stmt(" USING (START,FINISH),12");
        assert!(matches!(s.operands[0].kind, OperandKind::Pair(_, _)));
    }

    #[test]
    fn parenthesized_expression_is_not_a_pair() {
        let s = stmt(" EQU (1+2)");
        assert!(matches!(s.operands[0].kind, OperandKind::Expr(_)));
    }

    #[test]
    fn dc_operand_keeps_raw_text() {
        let s = stmt(" DC CL5'AB'");
        assert_eq!(s.operands[0].text, "CL5'AB'");
    }

    #[test]
    fn machine_operand_that_is_not_an_expression_is_bad_not_fatal() {
        let s = stmt(" LR 1,0(2)");
        assert!(matches!(s.operands[1].kind, OperandKind::Bad(_) | OperandKind::Expr(_)));
    }
}
