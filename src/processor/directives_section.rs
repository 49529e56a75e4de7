// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Section directives: CSECT/DSECT/RSECT/COM, LOCTR, START, END, CXD.

use super::*;
use crate::core::address::FULLWORD;
use crate::core::statement::OperandKind;

impl Processor {
    pub(super) fn process_sect(&mut self, kind: SectionKind, stmt: RebuiltStatement) {
        let name = self.find_label_symbol(&stmt);

        let other_private_exists = name.is_empty()
            && kind != SectionKind::Dummy
            && [
                SectionKind::Common,
                SectionKind::Executable,
                SectionKind::Readonly,
            ]
            .iter()
            .any(|k| *k != kind && self.ctx.section_defined(Id::EMPTY, *k));

        let name_taken = !name.is_empty()
            && self.ctx.symbol_defined(name)
            && !self.ctx.section_defined(name, kind);

        if name_taken || other_private_exists {
            self.error_e031("symbol", stmt.label.range());
            return;
        }

        if let Some(defined) = self.ctx.set_section(name, kind, stmt.range) {
            self.notify_symbol(defined);
        }
    }

    pub(super) fn process_loctr(&mut self, stmt: RebuiltStatement) {
        let name = self.find_label_symbol(&stmt);

        if name.is_empty() {
            self.error("E053", "LOCTR requires a name", stmt.label.range());
            return;
        }
        if self.ctx.symbol_defined(name) && !self.ctx.counter_defined(name) {
            self.error_e031("symbol", stmt.label.range());
            return;
        }
        if let Some(defined) = self.ctx.set_location_counter(name, stmt.range) {
            self.notify_symbol(defined);
        }
    }

    pub(super) fn process_start(&mut self, stmt: RebuiltStatement) {
        let name = self.find_label_symbol(&stmt);

        let code_exists = self.ctx.sections().iter().any(|sect| {
            matches!(
                sect.kind,
                SectionKind::Executable | SectionKind::Readonly
            )
        });
        if code_exists {
            self.error(
                "E073",
                "START is not allowed after the first control section",
                stmt.range,
            );
            return;
        }
        if !name.is_empty() && self.ctx.symbol_defined(name) {
            self.error_e031("symbol", stmt.label.range());
            return;
        }

        if let Some(defined) = self.ctx.set_section(name, SectionKind::Executable, stmt.range) {
            self.notify_symbol(defined);
        }

        let ops: Vec<_> = stmt.operands.iter().filter(|op| !op.is_empty()).collect();
        if ops.len() != 1 {
            return;
        }
        let offset = ops[0].expr().and_then(|expr| {
            let view = self.ctx.view(None);
            expr.evaluate_silent(&view).as_abs()
        });
        let Some(offset) = offset else {
            self.error(
                "A250",
                "START operand must be an absolute expression of previously defined symbols",
                ops[0].range,
            );
            return;
        };
        // Round the initial offset up to the section alignment.
        let aligned = (offset.max(0) + 7) & !7;
        self.ctx.reserve_storage_area(aligned, NO_ALIGN);
    }

    pub(super) fn process_end(&mut self, stmt: RebuiltStatement) {
        match &stmt.label {
            LabelField::Empty => {}
            LabelField::Sequence { .. } => {
                self.find_sequence_symbol(&stmt);
            }
            other => {
                self.warn(
                    "A249",
                    "A sequence symbol was expected in the name field",
                    other.range(),
                );
            }
        }

        if let Some(op) = stmt.operands.first() {
            if let OperandKind::Expr(expr) = &op.kind {
                let value = {
                    let view = self.ctx.view(None);
                    expr.evaluate_silent(&view)
                };
                if let SymbolValue::Absolute(abs) = value {
                    self.error(
                        "E032",
                        format!("END operand must not be absolute: {abs}"),
                        stmt.operands_range,
                    );
                }
            }
        }

        self.phase = Phase::EndSeen;
    }

    pub(super) fn process_cxd(&mut self, stmt: RebuiltStatement) {
        const CXD_LENGTH: u32 = 4;
        let loctr = self.ctx.align(FULLWORD);
        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr),
                    SymbolAttributes::new(
                        crate::core::symbol::SymbolOrigin::Asm,
                        crate::core::ebcdic::to_ebcdic(b'A'),
                        CXD_LENGTH,
                    ),
                    stmt.range,
                );
            }
        }
        self.ctx.reserve_storage_area(CXD_LENGTH as i32, NO_ALIGN);
    }
}
