// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Diagnostic conversion for Language Server Protocol clients.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::core::diagnostics::{Diagnostic, Severity};

/// Drop exact duplicates while keeping the first occurrence's order.
pub fn dedup_diagnostics(input: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for diag in input {
        let key = (
            diag.code.clone(),
            diag.range.start.line,
            diag.range.start.col,
            diag.range.end.line,
            diag.range.end.col,
            diag.message.clone(),
        );
        if seen.insert(key) {
            out.push(diag);
        }
    }
    out
}

/// Render diagnostics as LSP `PublishDiagnostics` items.
pub fn diagnostics_to_lsp(input: &[Diagnostic]) -> Vec<Value> {
    input
        .iter()
        .map(|diag| {
            json!({
                "range": {
                    "start": {"line": diag.range.start.line, "character": diag.range.start.col},
                    "end": {"line": diag.range.end.line, "character": diag.range.end.col},
                },
                "severity": severity_to_lsp(diag.severity),
                "code": diag.code,
                "source": "hlasmforge",
                "message": diag.message,
                "relatedInformation": diag.related.iter().map(|related| {
                    json!({
                        "location": {
                            "range": {
                                "start": {
                                    "line": related.range.start.line,
                                    "character": related.range.start.col,
                                },
                                "end": {
                                    "line": related.range.end.line,
                                    "character": related.range.end.col,
                                },
                            },
                        },
                        "message": related.message,
                    })
                }).collect::<Vec<Value>>(),
            })
        })
        .collect()
}

fn severity_to_lsp(severity: Severity) -> u32 {
    match severity {
        Severity::Error => 1,
        Severity::Warning => 2,
        Severity::Info => 3,
        Severity::Hint => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::Range;

    #[test]
    fn dedup_uses_stable_tuple_key() {
        let a = Diagnostic::error("E031", "boom", Range::line_span(2, 3, 4));
        let b = a.clone();
        let out = dedup_diagnostics(vec![a, b]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn severity_mapping_follows_lsp_numbers() {
        let diags = vec![
            Diagnostic::new("MNOTE", Severity::Hint, "h", Range::default()),
            Diagnostic::new("MNOTE", Severity::Info, "i", Range::default()),
            Diagnostic::warning("W016", "w", Range::default()),
            Diagnostic::error("E031", "e", Range::default()),
        ];
        let values = diagnostics_to_lsp(&diags);
        let severities: Vec<u64> = values
            .iter()
            .map(|value| value["severity"].as_u64().unwrap())
            .collect();
        assert_eq!(severities, vec![4, 3, 2, 1]);
    }

    #[test]
    fn lsp_item_carries_code_and_source() {
        let diag = Diagnostic::error("E033", "cycle", Range::line_span(1, 0, 5));
        let value = &diagnostics_to_lsp(&[diag])[0];
        assert_eq!(value["code"], "E033");
        assert_eq!(value["source"], "hlasmforge");
        assert_eq!(value["range"]["start"]["line"], 1);
    }
}
