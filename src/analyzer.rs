// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Analyzer façade: drives the statement stream through the
//! ordinary-assembly processor.
//!
//! The analyzer owns the line queue. COPY splices member lines at the
//! head (with a marker guarding the copy stack), AINSERT injects
//! records at either end, and the opencode SET-symbol layer rewrites
//! statement text before field parsing. `co_analyze` steps one record
//! at a time; the only suspension point is a COPY member fetch, which
//! the host satisfies through [`Analyzer::supply_library`] or lets
//! [`Analyzer::analyze`] resolve via the configured provider.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::core::diagnostics::{Diagnostic, Range};
use crate::core::statement::{LabelField, OperandKind, RebuiltStatement};
use crate::parser::variables::{VarValue, VariableStore};
use crate::parser::{parse_line, ParsedLine};
use crate::processor::{Phase, Processor, StatementAction};

/// Synchronous rendition of the library-provider trio.
pub trait LibraryProvider {
    fn has_library(&self, name: &str) -> bool;
    fn get_library(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryDataKind {
    Ordinary,
    Macro,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsError {
    Duplicate(&'static str),
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::Duplicate(name) => {
                write!(f, "analyzer option {name} was given more than once")
            }
        }
    }
}

impl std::error::Error for OptionsError {}

pub struct AnalyzerOptions {
    pub(crate) file_location: Option<String>,
    pub(crate) library_provider: Option<Box<dyn LibraryProvider>>,
    pub(crate) library_data: (LibraryDataKind, Option<String>),
    pub(crate) collect_highlight_info: bool,
    pub(crate) opencode: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            file_location: None,
            library_provider: None,
            library_data: (LibraryDataKind::Ordinary, None),
            collect_highlight_info: false,
            opencode: true,
        }
    }
}

/// Builder enforcing single assignment per option.
#[derive(Default)]
pub struct AnalyzerOptionsBuilder {
    options: AnalyzerOptions,
    file_location_set: bool,
    provider_set: bool,
    library_data_set: bool,
}

impl AnalyzerOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_location(mut self, url: impl Into<String>) -> Result<Self, OptionsError> {
        if self.file_location_set {
            return Err(OptionsError::Duplicate("file_location"));
        }
        self.file_location_set = true;
        self.options.file_location = Some(url.into());
        Ok(self)
    }

    pub fn library_provider(
        mut self,
        provider: Box<dyn LibraryProvider>,
    ) -> Result<Self, OptionsError> {
        if self.provider_set {
            return Err(OptionsError::Duplicate("library_provider"));
        }
        self.provider_set = true;
        self.options.library_provider = Some(provider);
        Ok(self)
    }

    pub fn library_data(
        mut self,
        kind: LibraryDataKind,
        member: Option<String>,
    ) -> Result<Self, OptionsError> {
        if self.library_data_set {
            return Err(OptionsError::Duplicate("library_data"));
        }
        self.library_data_set = true;
        self.options.library_data = (kind, member);
        Ok(self)
    }

    pub fn collect_highlight_info(mut self, value: bool) -> Self {
        self.options.collect_highlight_info = value;
        self
    }

    pub fn opencode(mut self, value: bool) -> Self {
        self.options.opencode = value;
        self
    }

    pub fn build(self) -> AnalyzerOptions {
        self.options
    }
}

/// One `co_analyze` step result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Working,
    AwaitingLibrary(String),
    Cancelled,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzerMetrics {
    pub lines: u64,
    pub opencode_statements: u64,
    pub copy_statements: u64,
    pub injected_statements: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Label,
    SeqSymbol,
    VarSymbol,
    Instruction,
    Operand,
    Number,
    String,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticToken {
    pub range: Range,
    pub kind: TokenKind,
}

#[derive(Debug)]
enum QueuedLine {
    Source { text: String, line: u32 },
    CopyLine { text: String, line: u32 },
    CopyEnd,
    Injected { text: String },
}

const SET_OPCODES: &[&str] = &["SETA", "SETB", "SETC"];
const DECLARE_OPCODES: &[&str] = &["LCLA", "LCLB", "LCLC", "GBLA", "GBLB", "GBLC"];
const SKIPPED_CA_OPCODES: &[&str] = &["AIF", "AGO", "ACTR", "AREAD", "MACRO", "MEND", "MEXIT"];

pub struct Analyzer {
    processor: Processor,
    options: AnalyzerOptions,
    vars: VariableStore,
    queue: VecDeque<QueuedLine>,
    copy_cache: HashMap<String, Vec<String>>,
    copy_stack: Vec<String>,
    awaiting: Option<(String, Range)>,
    cancelled: bool,
    metrics: AnalyzerMetrics,
    tokens: Vec<SemanticToken>,
    injected_line: u32,
}

impl Analyzer {
    pub fn new(text: &str, options: AnalyzerOptions) -> Self {
        let queue = text
            .lines()
            .enumerate()
            .map(|(idx, line)| QueuedLine::Source {
                text: line.to_string(),
                line: idx as u32,
            })
            .collect();
        let injected_line = text.lines().count() as u32;
        Self {
            processor: Processor::new(),
            options,
            vars: VariableStore::new(),
            queue,
            copy_cache: HashMap::new(),
            copy_stack: Vec::new(),
            awaiting: None,
            cancelled: false,
            metrics: AnalyzerMetrics::default(),
            tokens: Vec::new(),
            injected_line,
        }
    }

    pub fn file_location(&self) -> Option<&str> {
        self.options.file_location.as_deref()
    }

    pub fn metrics(&self) -> AnalyzerMetrics {
        self.metrics
    }

    pub fn semantic_tokens(&self) -> &[SemanticToken] {
        &self.tokens
    }

    /// The semantic context: symbol table, sections, solver, usings.
    pub fn context(&self) -> &Processor {
        &self.processor
    }

    pub fn collect_diags(&self) -> Vec<Diagnostic> {
        self.processor.diags.clone()
    }

    /// Request cancellation; the next step returns `Step::Cancelled`.
    /// No rollback happens and no finalization runs.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Run to completion, resolving COPY fetches through the
    /// configured library provider.
    pub fn analyze(&mut self) {
        loop {
            match self.co_analyze() {
                Step::Working => {}
                Step::AwaitingLibrary(member) => {
                    let text = self
                        .options
                        .library_provider
                        .as_ref()
                        .and_then(|provider| provider.get_library(&member));
                    self.supply_library(&member, text);
                }
                Step::Cancelled | Step::Done => break,
            }
        }
    }

    /// Process one queued record.
    pub fn co_analyze(&mut self) -> Step {
        if self.cancelled {
            return Step::Cancelled;
        }
        if let Some((member, _)) = &self.awaiting {
            return Step::AwaitingLibrary(member.clone());
        }
        let Some(queued) = self.queue.pop_front() else {
            if self.processor.phase() != Phase::Finalized {
                self.processor.finish();
            }
            return Step::Done;
        };

        let (text, line, from_copy) = match queued {
            QueuedLine::CopyEnd => {
                self.copy_stack.pop();
                return Step::Working;
            }
            QueuedLine::Source { text, line } => (text, line, false),
            QueuedLine::CopyLine { text, line } => (text, line, true),
            QueuedLine::Injected { text } => {
                self.injected_line += 1;
                (text, self.injected_line - 1, false)
            }
        };
        self.metrics.lines += 1;

        // The name field of a SET statement is the variable itself;
        // substitution applies to the rest of the record only.
        let substituted = if text.starts_with('&') {
            match text.find(' ') {
                Some(idx) => format!("{}{}", &text[..idx], self.vars.substitute(&text[idx..])),
                None => text.clone(),
            }
        } else {
            self.vars.substitute(&text)
        };
        let (parsed, mut parse_diags) = parse_line(&substituted, line, &mut self.processor.ids);
        self.processor.diags.append(&mut parse_diags);

        let stmt = match parsed {
            ParsedLine::Blank => return Step::Working,
            ParsedLine::Comment => {
                if self.options.collect_highlight_info {
                    self.tokens.push(SemanticToken {
                        range: Range::line_span(line, 0, substituted.trim_end().len() as u32),
                        kind: TokenKind::Comment,
                    });
                }
                return Step::Working;
            }
            ParsedLine::Statement(stmt) => stmt,
        };

        if from_copy {
            self.metrics.copy_statements += 1;
        } else {
            self.metrics.opencode_statements += 1;
        }
        if self.options.collect_highlight_info {
            self.collect_tokens(&stmt);
        }

        if self.handle_conditional(&stmt) {
            return Step::Working;
        }

        match self.processor.process(stmt) {
            StatementAction::Done => {}
            StatementAction::Ainsert { record, front } => {
                self.metrics.injected_statements += 1;
                if front {
                    self.queue.push_front(QueuedLine::Injected { text: record });
                } else {
                    self.queue.push_back(QueuedLine::Injected { text: record });
                }
            }
            StatementAction::Copy { member, range } => {
                let name = self.processor.ids.resolve(member).to_string();
                self.enter_copy(name, range);
            }
        }
        Step::Working
    }

    /// Satisfy (or fail) the pending COPY fetch.
    pub fn supply_library(&mut self, member: &str, text: Option<String>) {
        let Some((pending, range)) = self.awaiting.take() else {
            return;
        };
        debug_assert!(pending.eq_ignore_ascii_case(member));
        match text {
            Some(text) => {
                self.copy_cache
                    .insert(pending.clone(), text.lines().map(str::to_string).collect());
                self.splice_copy(&pending);
            }
            None => {
                self.processor.diags.push(Diagnostic::error(
                    "E058",
                    format!("COPY member {pending} not found"),
                    range,
                ));
            }
        }
    }

    fn enter_copy(&mut self, member: String, range: Range) {
        if self
            .copy_stack
            .iter()
            .any(|entry| entry.eq_ignore_ascii_case(&member))
        {
            self.processor.diags.push(Diagnostic::error(
                "E062",
                format!("COPY member {member} is already being copied"),
                range,
            ));
            return;
        }
        if self.copy_cache.contains_key(&member) {
            self.splice_copy(&member);
        } else {
            self.awaiting = Some((member, range));
        }
    }

    fn splice_copy(&mut self, member: &str) {
        let lines = self.copy_cache.get(member).cloned().unwrap_or_default();
        self.copy_stack.push(member.to_string());
        self.queue.push_front(QueuedLine::CopyEnd);
        for (idx, text) in lines.into_iter().enumerate().rev() {
            self.queue.push_front(QueuedLine::CopyLine {
                text,
                line: idx as u32,
            });
        }
    }

    /// Opencode SET-symbol subset; returns true when the statement was
    /// consumed here.
    fn handle_conditional(&mut self, stmt: &RebuiltStatement) -> bool {
        let opcode = stmt.opcode.as_str();
        if SKIPPED_CA_OPCODES.contains(&opcode) {
            return true;
        }
        if DECLARE_OPCODES.contains(&opcode) {
            for op in &stmt.operands {
                let name = op.text.trim().trim_start_matches('&');
                if name.is_empty() {
                    continue;
                }
                match opcode.as_bytes()[3] {
                    b'A' => self.vars.declare_arith(name),
                    b'B' => self.vars.declare_bool(name),
                    _ => self.vars.declare_char(name),
                }
            }
            return true;
        }
        if !SET_OPCODES.contains(&opcode) {
            return false;
        }
        let LabelField::Variable { text, .. } = &stmt.label else {
            return true;
        };
        let name = text.trim_start_matches('&').to_string();
        match opcode {
            "SETA" => {
                let value = stmt
                    .operands
                    .first()
                    .and_then(|op| match &op.kind {
                        OperandKind::Expr(expr) => {
                            let view = self.processor.ctx.view(None);
                            expr.evaluate_silent(&view).as_abs()
                        }
                        _ => None,
                    })
                    .unwrap_or(0);
                self.vars.set(&name, VarValue::Arith(value));
            }
            "SETB" => {
                let value = stmt
                    .operands
                    .first()
                    .map(|op| op.text.trim_matches(|c| c == '(' || c == ')') == "1")
                    .unwrap_or(false);
                self.vars.set(&name, VarValue::Bool(value));
            }
            _ => {
                let value = stmt
                    .operands
                    .first()
                    .and_then(|op| op.string().map(str::to_string))
                    .unwrap_or_default();
                self.vars.set(&name, VarValue::Char(value));
            }
        }
        true
    }

    fn collect_tokens(&mut self, stmt: &RebuiltStatement) {
        match &stmt.label {
            LabelField::Empty => {}
            LabelField::Ordinary { range, .. } => self.tokens.push(SemanticToken {
                range: *range,
                kind: TokenKind::Label,
            }),
            LabelField::Sequence { range, .. } => self.tokens.push(SemanticToken {
                range: *range,
                kind: TokenKind::SeqSymbol,
            }),
            LabelField::Variable { range, .. } => self.tokens.push(SemanticToken {
                range: *range,
                kind: TokenKind::VarSymbol,
            }),
        }
        self.tokens.push(SemanticToken {
            range: stmt.opcode_range,
            kind: TokenKind::Instruction,
        });
        for op in &stmt.operands {
            let kind = match &op.kind {
                OperandKind::String(_) => TokenKind::String,
                OperandKind::Expr(crate::core::expr::MachExpr::Constant(..)) => TokenKind::Number,
                OperandKind::Empty => continue,
                _ => TokenKind::Operand,
            };
            self.tokens.push(SemanticToken {
                range: op.range,
                kind,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_rejects_duplicates() {
        let result = AnalyzerOptionsBuilder::new()
            .file_location("a.hlasm")
            .unwrap()
            .file_location("b.hlasm");
        assert!(matches!(result, Err(OptionsError::Duplicate("file_location"))));
    }

    #[test]
    fn analyze_reaches_done_and_finalizes() {
        let mut analyzer = Analyzer::new(" LTORG", AnalyzerOptions::default());
        analyzer.analyze();
        assert_eq!(analyzer.context().phase(), Phase::Finalized);
    }

    #[test]
    fn cancel_stops_stepping() {
        let mut analyzer = Analyzer::new("A EQU 1\nB EQU 2", AnalyzerOptions::default());
        assert_eq!(analyzer.co_analyze(), Step::Working);
        analyzer.cancel();
        assert_eq!(analyzer.co_analyze(), Step::Cancelled);
        assert_ne!(analyzer.context().phase(), Phase::Finalized);
    }

    #[test]
    fn highlight_tokens_when_requested() {
        let options = AnalyzerOptionsBuilder::new().collect_highlight_info(true).build();
        let mut analyzer = Analyzer::new("LBL DC C'X'\n* note", options);
        analyzer.analyze();
        let kinds: Vec<TokenKind> = analyzer
            .semantic_tokens()
            .iter()
            .map(|token| token.kind)
            .collect();
        assert!(kinds.contains(&TokenKind::Label));
        assert!(kinds.contains(&TokenKind::Instruction));
        assert!(kinds.contains(&TokenKind::Comment));
    }

    #[test]
    fn metrics_count_statement_provenance() {
        let mut analyzer = Analyzer::new("A EQU 1\n COPY MEM", AnalyzerOptions::default());
        loop {
            match analyzer.co_analyze() {
                Step::AwaitingLibrary(member) => {
                    assert_eq!(member, "MEM");
                    analyzer.supply_library("MEM", Some("B EQU 2".to_string()));
                }
                Step::Done => break,
                Step::Working => {}
                Step::Cancelled => panic!("not cancelled"),
            }
        }
        let metrics = analyzer.metrics();
        assert_eq!(metrics.opencode_statements, 2);
        assert_eq!(metrics.copy_statements, 1);
    }
}
