// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Statement-field scanning.
//!
//! Splits a source record into name field, operation code and operand
//! field, then the operand field into top-level operands. Quoted
//! strings (with doubled apostrophes) and parentheses protect commas
//! and blanks; attribute references like `L'X` do not open a string.

/// Raw statement fields with their column offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields<'a> {
    pub label: Option<(&'a str, u32)>,
    pub opcode: Option<(&'a str, u32)>,
    pub operands: Option<(&'a str, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment,
    Statement(RawFields<'a>),
}

/// Letters that can precede an apostrophe as an attribute reference.
const ATTR_LETTERS: &[u8] = b"LKNTSIOD";

/// Does the apostrophe at `idx` start an attribute reference rather
/// than a quoted string? True when it follows a lone attribute letter
/// and is itself followed by a symbol character.
pub fn is_attribute_quote(bytes: &[u8], idx: usize) -> bool {
    if idx == 0 || idx + 1 >= bytes.len() {
        return false;
    }
    let prev = bytes[idx - 1].to_ascii_uppercase();
    if !ATTR_LETTERS.contains(&prev) {
        return false;
    }
    if idx >= 2 {
        let before = bytes[idx - 2];
        if before.is_ascii_alphanumeric() || matches!(before, b'@' | b'#' | b'$' | b'_') {
            return false;
        }
    }
    let next = bytes[idx + 1];
    next.is_ascii_alphabetic() || matches!(next, b'@' | b'#' | b'$' | b'_' | b'&' | b'=' | b'*')
}

/// Scan a record into fields. `*` in column one is a comment, `.*` a
/// conditional-assembly comment.
pub fn scan_line(line: &str) -> LineKind<'_> {
    let trimmed_end = line.trim_end();
    if trimmed_end.is_empty() {
        return LineKind::Blank;
    }
    if trimmed_end.starts_with('*') || trimmed_end.starts_with(".*") {
        return LineKind::Comment;
    }

    let bytes = trimmed_end.as_bytes();
    let mut pos = 0usize;

    let label = if !bytes[0].is_ascii_whitespace() {
        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        Some((&trimmed_end[start..pos], start as u32))
    } else {
        None
    };

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= bytes.len() {
        return LineKind::Statement(RawFields {
            label,
            opcode: None,
            operands: None,
        });
    }

    let opcode_start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let opcode = Some((&trimmed_end[opcode_start..pos], opcode_start as u32));

    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if pos >= bytes.len() {
        return LineKind::Statement(RawFields {
            label,
            opcode,
            operands: None,
        });
    }

    // The operand field runs to the first blank at depth zero outside
    // quotes; the rest of the record is remarks.
    let operand_start = pos;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut idx = pos;
    while idx < bytes.len() {
        let b = bytes[idx];
        if in_string {
            if b == b'\'' {
                if idx + 1 < bytes.len() && bytes[idx + 1] == b'\'' {
                    idx += 1;
                } else {
                    in_string = false;
                }
            }
        } else {
            match b {
                b'\'' if !is_attribute_quote(bytes, idx) => in_string = true,
                b'(' => depth += 1,
                b')' => depth -= 1,
                b' ' if depth <= 0 => break,
                _ => {}
            }
        }
        idx += 1;
    }

    LineKind::Statement(RawFields {
        label,
        opcode,
        operands: Some((&trimmed_end[operand_start..idx], operand_start as u32)),
    })
}

/// Split an operand field on top-level commas. Empty slots are kept,
/// so `" , "`-style placeholders surface as empty operands.
pub fn split_operands(field: &str, field_col: u32) -> Vec<(&str, u32)> {
    let bytes = field.as_bytes();
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut depth = 0i32;
    let mut in_string = false;
    for idx in 0..bytes.len() {
        let b = bytes[idx];
        if in_string {
            if b == b'\'' {
                if idx + 1 < bytes.len() && bytes[idx + 1] == b'\'' {
                    // skip doubled apostrophe
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        match b {
            b'\'' if !is_attribute_quote(bytes, idx) => in_string = true,
            b'(' => depth += 1,
            b')' => depth -= 1,
            b',' if depth == 0 => {
                out.push((&field[start..idx], field_col + start as u32));
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push((&field[start..], field_col + start as u32));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_lines() {
        assert_eq!(scan_line("* comment"), LineKind::Comment);
        assert_eq!(scan_line(".* ca comment"), LineKind::Comment);
        assert_eq!(scan_line("   "), LineKind::Blank);
    }

    #[test]
    fn label_opcode_operands() {
        let LineKind::Statement(fields) = scan_line("LBL   DC    F'1'   a remark") else {
            panic!("expected statement");
        };
        assert_eq!(fields.label, Some(("LBL", 0)));
        assert_eq!(fields.opcode, Some(("DC", 6)));
        assert_eq!(fields.operands, Some(("F'1'", 12)));
    }

    #[test]
    fn no_label_statement() {
        let LineKind::Statement(fields) = scan_line("  LTORG") else {
            panic!("expected statement");
        };
        assert_eq!(fields.label, None);
        assert_eq!(fields.opcode, Some(("LTORG", 2)));
        assert_eq!(fields.operands, None);
    }

    #[test]
    fn blanks_inside_strings_do_not_end_operands() {
        let LineKind::Statement(fields) = scan_line(" MNOTE 5,'test message'") else {
            panic!("expected statement");
        };
        assert_eq!(fields.operands, Some(("5,'test message'", 7)));
    }

    #[test]
    fn split_protects_quotes_and_parens() {
        let ops = split_operands("C'A,B',PART(X,Y),2", 0);
        let texts: Vec<&str> = ops.iter().map(|(text, _)| *text).collect();
        assert_eq!(texts, vec!["C'A,B'", "PART(X,Y)", "2"]);
    }

    #[test]
    fn split_keeps_empty_slots() {
        let ops = split_operands(",", 0);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].0, "");
        assert_eq!(ops[1].0, "");
    }

    #[test]
    fn attribute_quote_is_not_a_string() {
        let ops = split_operands("*,L'X", 0);
        let texts: Vec<&str> = ops.iter().map(|(text, _)| *text).collect();
        assert_eq!(texts, vec!["*", "L'X"]);
    }

    #[test]
    fn type_letter_quote_opens_a_string() {
        // DC operand C'..' keeps its comma: C is not an attribute letter.
        assert!(!is_attribute_quote(b"C'A,B'", 1));
        let ops = split_operands("C'A,B'", 0);
        assert_eq!(ops.len(), 1);
        // L-type float nominal: digit after the quote means string.
        assert!(!is_attribute_quote(b"L'3.14'", 1));
    }
}
