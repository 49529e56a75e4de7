// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Diagnostics with stable codes, severities and source ranges.

use std::fmt;

/// Zero-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range spanning `cols` on a single line.
    pub fn line_span(line: u32, col_start: u32, col_end: u32) -> Self {
        Self {
            start: Position::new(line, col_start),
            end: Position::new(line, col_end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// MNOTE level to severity: 0-1 hint, 2-3 info, 4-7 warning, 8+ error.
    pub fn from_mnote_level(level: u32) -> Self {
        match level {
            0..=1 => Severity::Hint,
            2..=3 => Severity::Info,
            4..=7 => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Extra marker carried by some diagnostics (dead branches etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticTag {
    Unnecessary,
    Deprecated,
}

/// Secondary location attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInfo {
    pub range: Range,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub range: Range,
    pub tags: Vec<DiagnosticTag>,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        range: Range,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            range,
            tags: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self::new(code, Severity::Error, message, range)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, range: Range) -> Self {
        Self::new(code, Severity::Warning, message, range)
    }

    pub fn with_related(mut self, range: Range, message: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            range,
            message: message.into(),
        });
        self
    }

    /// MNOTE-emitted diagnostic; the code is the literal string "MNOTE"
    /// and the severity follows the level mapping.
    pub fn mnote(level: u32, text: &str, range: Range) -> Self {
        Self::new(
            "MNOTE",
            Severity::from_mnote_level(level),
            sanitize_message(text),
            range,
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] - {}",
            self.range.start.line + 1,
            self.range.start.col + 1,
            self.severity.as_str().to_ascii_uppercase(),
            self.code,
            self.message
        )
    }
}

/// Replace non-printable bytes with `<hh>` escapes.
pub fn sanitize_message(text: &str) -> String {
    if text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        if (0x20..0x7F).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("<{b:02x}>"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnote_severity_mapping() {
        assert_eq!(Severity::from_mnote_level(0), Severity::Hint);
        assert_eq!(Severity::from_mnote_level(1), Severity::Hint);
        assert_eq!(Severity::from_mnote_level(2), Severity::Info);
        assert_eq!(Severity::from_mnote_level(3), Severity::Info);
        assert_eq!(Severity::from_mnote_level(4), Severity::Warning);
        assert_eq!(Severity::from_mnote_level(7), Severity::Warning);
        assert_eq!(Severity::from_mnote_level(8), Severity::Error);
        assert_eq!(Severity::from_mnote_level(255), Severity::Error);
    }

    #[test]
    fn sanitize_escapes_nonprintable() {
        assert_eq!(sanitize_message("plain"), "plain");
        assert_eq!(sanitize_message("a\tb"), "a<09>b");
        assert_eq!(sanitize_message("x\u{1}"), "x<01>");
    }

    #[test]
    fn display_is_one_based() {
        let diag = Diagnostic::error("E031", "duplicate", Range::line_span(2, 0, 5));
        assert_eq!(diag.to_string(), "3:1: ERROR [E031] - duplicate");
    }
}
