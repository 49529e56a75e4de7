// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Ordinary-assembly statement dispatcher.
//!
//! One processor instance owns the symbol table, section registry,
//! dependency solver, USING stack and literal pool, and consumes
//! rebuilt statements one at a time. Directive handlers live in the
//! sibling `directives_*` files; this module holds the dispatch table,
//! the shared helpers and the processor state machine.

mod directives_data;
mod directives_diag;
mod directives_layout;
mod directives_section;
mod directives_symbols;
mod directives_using;

use indexmap::IndexMap;

use crate::core::address::{Address, SpaceId, NO_ALIGN};
use crate::core::dependency::{DepKey, DependencySolver};
use crate::core::diagnostics::{Diagnostic, Range, Severity};
use crate::core::ids::{Id, IdStorage};
use crate::core::instructions::lookup_instruction;
use crate::core::ordinary::OrdinaryContext;
use crate::core::section::SectionKind;
use crate::core::statement::{LabelField, RebuiltStatement};
use crate::core::symbol::{SymbolAttributes, SymbolValue};
use crate::core::using::UsingStack;
use crate::parser::data_def_parser::parse_data_def;

/// Processor lifecycle. After END, opencode statements are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Running,
    EndSeen,
    Finalized,
}

/// Side-effects the statement driver must carry out.
#[derive(Debug, PartialEq, Eq)]
pub enum StatementAction {
    Done,
    /// AINSERT: inject a record into the opencode stream.
    Ainsert { record: String, front: bool },
    /// COPY: enter the named library member.
    Copy { member: Id, range: Range },
}

const DIRECTIVES: &[&str] = &[
    "ACONTROL", "AINSERT", "ALIAS", "ANOP", "CCW", "CCW0", "CCW1", "CNOP", "COM", "COPY",
    "CSECT", "CXD", "DC", "DROP", "DS", "DSECT", "EJECT", "END", "EQU", "EXTRN", "LOCTR",
    "LTORG", "MNOTE", "OPSYN", "ORG", "POP", "PRINT", "PUSH", "RSECT", "SPACE", "START",
    "TITLE", "USING", "WXTRN",
];

pub struct Processor {
    pub ids: IdStorage,
    pub ctx: OrdinaryContext,
    pub solver: DependencySolver,
    pub usings: UsingStack,
    pub diags: Vec<Diagnostic>,
    /// OPSYN rebindings: mnemonic -> Some(target) or None for removed.
    opsyn: IndexMap<String, Option<String>>,
    /// Registered sequence-symbol branch targets.
    sequence_symbols: IndexMap<Id, Range>,
    title: Option<String>,
    last_mnote_level: u32,
    mnote_max: u32,
    print_saves: usize,
    acontrol_saves: usize,
    phase: Phase,
}

impl Processor {
    pub fn new() -> Self {
        Self {
            ids: IdStorage::new(),
            ctx: OrdinaryContext::new(),
            solver: DependencySolver::new(),
            usings: UsingStack::new(),
            diags: Vec::new(),
            opsyn: IndexMap::new(),
            sequence_symbols: IndexMap::new(),
            title: None,
            last_mnote_level: 0,
            mnote_max: 0,
            print_saves: 0,
            acontrol_saves: 0,
            phase: Phase::Initial,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn mnote_max(&self) -> u32 {
        self.mnote_max
    }

    /// Sequence symbols registered as branch targets, in first-seen
    /// order.
    pub fn sequence_symbols(&self) -> &IndexMap<Id, Range> {
        &self.sequence_symbols
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diags)
    }

    /// Dispatch one rebuilt statement.
    pub fn process(&mut self, stmt: RebuiltStatement) -> StatementAction {
        if matches!(self.phase, Phase::EndSeen | Phase::Finalized) {
            return StatementAction::Done;
        }
        self.phase = Phase::Running;

        self.register_literals(&stmt);

        let Some(opcode) = self.resolve_opcode(&stmt.opcode) else {
            self.error(
                "E049",
                format!("Operation code not found: {}", stmt.opcode),
                stmt.opcode_range,
            );
            return StatementAction::Done;
        };

        match opcode.as_str() {
            "CSECT" => self.process_sect(SectionKind::Executable, stmt),
            "RSECT" => self.process_sect(SectionKind::Readonly, stmt),
            "COM" => self.process_sect(SectionKind::Common, stmt),
            "DSECT" => self.process_sect(SectionKind::Dummy, stmt),
            "LOCTR" => self.process_loctr(stmt),
            "START" => self.process_start(stmt),
            "END" => self.process_end(stmt),
            "CXD" => self.process_cxd(stmt),
            "EQU" => self.process_equ(stmt),
            "DC" | "DS" => self.process_data(stmt),
            "ORG" => self.process_org(stmt),
            "CNOP" => self.process_cnop(stmt),
            "CCW" | "CCW0" | "CCW1" => self.process_ccw(stmt),
            "LTORG" => self.process_ltorg(stmt),
            "COPY" => return self.process_copy(stmt),
            "EXTRN" => self.process_external(stmt, SectionKind::External),
            "WXTRN" => self.process_external(stmt, SectionKind::WeakExternal),
            "OPSYN" => self.process_opsyn(stmt),
            "AINSERT" => return self.process_ainsert(stmt),
            "ALIAS" => self.process_alias(stmt),
            "TITLE" => self.process_title(stmt),
            "MNOTE" => self.process_mnote(stmt),
            "USING" => self.process_using(stmt),
            "DROP" => self.process_drop(stmt),
            "PUSH" => self.process_push(stmt),
            "POP" => self.process_pop(stmt),
            "ANOP" | "EJECT" | "SPACE" | "PRINT" | "ACONTROL" => {
                self.find_sequence_symbol(&stmt);
            }
            _ => self.process_machine(&opcode, stmt),
        }
        StatementAction::Done
    }

    /// End of input: implicit literal pool, then run the solver to its
    /// fixed point and report what is left.
    pub fn finish(&mut self) {
        if self.phase == Phase::Finalized {
            return;
        }
        self.generate_pool();
        let mut diags = std::mem::take(&mut self.diags);
        self.solver.finalize(&mut self.ctx, &self.ids, &mut diags);
        self.diags = diags;
        self.ctx.normalize_symbol_values();
        self.phase = Phase::Finalized;
    }

    // ---- opcode resolution -------------------------------------------------

    /// Map a mnemonic through OPSYN and the builtin tables. `None`
    /// means the operation code does not exist (any more).
    fn resolve_opcode(&self, opcode: &str) -> Option<String> {
        let upper = opcode.to_ascii_uppercase();
        if let Some(mapped) = self.opsyn.get(&upper) {
            return mapped.clone();
        }
        self.builtin_opcode(&upper).then_some(upper)
    }

    fn builtin_opcode(&self, upper: &str) -> bool {
        DIRECTIVES.contains(&upper) || lookup_instruction(upper).is_some()
    }

    /// Is `name` currently a known operation code (for OPSYN)?
    pub(crate) fn operation_code_exists(&self, name: &str) -> bool {
        self.resolve_opcode(name).is_some()
    }

    pub(crate) fn rebind_opcode(&mut self, name: &str, target: Option<String>) {
        self.opsyn.insert(name.to_ascii_uppercase(), target);
    }

    // ---- shared helpers ----------------------------------------------------

    pub(crate) fn error(&mut self, code: &str, message: impl Into<String>, range: Range) {
        self.diags.push(Diagnostic::error(code, message, range));
    }

    pub(crate) fn warn(&mut self, code: &str, message: impl Into<String>, range: Range) {
        self.diags.push(Diagnostic::warning(code, message, range));
    }

    pub(crate) fn error_e031(&mut self, what: &str, range: Range) {
        self.error("E031", format!("Duplicate {what} definition"), range);
    }

    pub(crate) fn error_a011(&mut self, op: &str, count: usize, range: Range) {
        self.error(
            "A011",
            format!("{op} must have exactly {count} operands"),
            range,
        );
    }

    pub(crate) fn error_a012(&mut self, op: &str, from: usize, to: usize, range: Range) {
        self.error(
            "A012",
            format!("{op} must have {from} to {to} operands"),
            range,
        );
    }

    pub(crate) fn error_a013(&mut self, op: &str, min: usize, range: Range) {
        self.error(
            "A013",
            format!("{op} must have at least {min} operands"),
            range,
        );
    }

    /// Ordinary label of the statement, or `Id::EMPTY`.
    pub(crate) fn find_label_symbol(&self, stmt: &RebuiltStatement) -> Id {
        match &stmt.label {
            LabelField::Ordinary { id, .. } => *id,
            _ => Id::EMPTY,
        }
    }

    /// Register a `.LABEL` as a branch target and return its name.
    pub(crate) fn find_sequence_symbol(&mut self, stmt: &RebuiltStatement) -> Id {
        match &stmt.label {
            LabelField::Sequence { id, range } => {
                self.sequence_symbols.entry(*id).or_insert(*range);
                *id
            }
            _ => Id::EMPTY,
        }
    }

    /// Create a symbol and wake its waiters.
    pub(crate) fn create_symbol(
        &mut self,
        name: Id,
        value: SymbolValue,
        attrs: SymbolAttributes,
        range: Range,
    ) {
        let defined = value.is_defined();
        self.ctx.create_symbol(name, value, attrs, range);
        if defined {
            self.notify_symbol(name);
        }
    }

    pub(crate) fn notify_symbol(&mut self, name: Id) {
        let mut diags = std::mem::take(&mut self.diags);
        self.solver
            .notify_defined(DepKey::Symbol(name), &mut self.ctx, &mut diags);
        self.diags = diags;
    }

    pub(crate) fn notify_space(&mut self, space: SpaceId) {
        let mut diags = std::mem::take(&mut self.diags);
        self.solver
            .notify_defined(DepKey::Space(space), &mut self.ctx, &mut diags);
        self.diags = diags;
    }

    /// Current location with no extra alignment, used as the `*` value
    /// for the statement being processed.
    pub(crate) fn current_loctr(&mut self) -> Address {
        self.ctx.align(NO_ALIGN)
    }

    /// Register every literal mentioned by the statement's operand
    /// expressions in the current pool generation.
    fn register_literals(&mut self, stmt: &RebuiltStatement) {
        let mut texts: Vec<String> = Vec::new();
        for op in &stmt.operands {
            let mut refs = Vec::new();
            match &op.kind {
                crate::core::statement::OperandKind::Expr(expr) => {
                    expr.referenced_literals(&mut refs)
                }
                crate::core::statement::OperandKind::Pair(base, end) => {
                    base.referenced_literals(&mut refs);
                    end.referenced_literals(&mut refs);
                }
                _ => {}
            }
            for text in refs {
                if !texts.iter().any(|t| t == text) {
                    texts.push(text.to_string());
                }
            }
        }
        for text in texts {
            if self.ctx.literals.lookup(&text).is_some() {
                continue;
            }
            match parse_data_def(&text[1..], stmt.line, stmt.operands_range.start.col + 1, &mut self.ids) {
                Ok(data) => {
                    self.ctx
                        .literals
                        .register(&mut self.ids, &text, data, stmt.operands_range);
                }
                Err(err) => {
                    self.diags.push(Diagnostic::new(
                        "D001",
                        Severity::Error,
                        format!("invalid literal {text}: {err}"),
                        err.range,
                    ));
                }
            }
        }
    }

    /// Machine instruction: storage layout and label attributes only;
    /// operand encoding is not this component's business.
    fn process_machine(&mut self, opcode: &str, stmt: RebuiltStatement) {
        let Some(entry) = lookup_instruction(opcode) else {
            self.error(
                "E049",
                format!("Operation code not found: {opcode}"),
                stmt.opcode_range,
            );
            return;
        };
        self.find_sequence_symbol(&stmt);
        let loctr = self.ctx.align(crate::core::address::HALFWORD);
        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr),
                    SymbolAttributes::instruction(entry.length),
                    stmt.range,
                );
            }
        }
        self.ctx
            .reserve_storage_area(entry.length as i32, NO_ALIGN);
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}
