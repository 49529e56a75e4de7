// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Layout directives: ORG, CNOP, CCW and the literal pool (LTORG).

use super::*;
use crate::core::address::{Alignment, DOUBLEWORD, HALFWORD};
use crate::core::ebcdic::to_ebcdic;
use crate::core::expr::MachExpr;
use crate::core::symbol::{SymbolOrigin, UNDEF_LENGTH};

impl Processor {
    pub(super) fn process_org(&mut self, stmt: RebuiltStatement) {
        self.find_sequence_symbol(&stmt);

        let loctr = self.current_loctr();
        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr.clone()),
                    SymbolAttributes::org(),
                    stmt.range,
                );
            }
        }

        if stmt.operands.is_empty() || stmt.operands_empty() {
            self.ctx.set_available_location_counter_value();
            return;
        }

        let ops = &stmt.operands;
        let mut reloc_expr: Option<&MachExpr> = None;
        let mut boundary: u32 = 0;
        let mut offset: i32 = 0;

        for (idx, op) in ops.iter().enumerate().take(3) {
            if op.is_empty() {
                continue;
            }
            let Some(expr) = op.expr() else {
                if idx != 0 {
                    self.error("A115", "invalid ORG operand format", stmt.range);
                }
                break;
            };
            match idx {
                0 => reloc_expr = Some(expr),
                1 => {
                    let value = {
                        let view = self.ctx.view(Some(loctr.clone()));
                        if expr.collect_deps(&view).contains_dependencies() {
                            None
                        } else {
                            expr.evaluate_silent(&view).as_abs()
                        }
                    };
                    match value {
                        Some(v) if (2..=4096).contains(&v) && (v & (v - 1)) == 0 => {
                            boundary = v as u32;
                        }
                        _ => {
                            self.error(
                                "A116",
                                "ORG boundary must be a power of 2 between 2 and 4096",
                                stmt.range,
                            );
                            return;
                        }
                    }
                }
                _ => {
                    let value = {
                        let view = self.ctx.view(Some(loctr.clone()));
                        if expr.collect_deps(&view).contains_dependencies() {
                            None
                        } else {
                            expr.evaluate_silent(&view).as_abs()
                        }
                    };
                    match value {
                        Some(v) => offset = v,
                        None => {
                            self.error("A115", "invalid ORG operand format", stmt.range);
                            return;
                        }
                    }
                }
            }
        }

        let Some(expr) = reloc_expr else {
            self.error(
                "A245",
                "ORG requires a relocatable expression operand",
                stmt.range,
            );
            return;
        };

        let deps = {
            let view = self.ctx.view(Some(loctr.clone()));
            expr.collect_deps(&view)
        };

        if !deps.contains_dependencies() {
            let target = {
                let view = self.ctx.view(Some(loctr.clone()));
                expr.evaluate_silent(&view)
            };
            let SymbolValue::Relocatable(target) = target else {
                self.error(
                    "A245",
                    "ORG requires a relocatable expression operand",
                    stmt.range,
                );
                return;
            };
            let mut target = target.normalized(&self.ctx.spaces);
            if boundary > 1 {
                target.add_offset(Alignment::bytes(boundary).gap_from(target.offset()));
            }
            target.add_offset(offset);

            let delta = (&target - &loctr).normalized(&self.ctx.spaces);
            if !delta.is_absolute() {
                self.error("A115", "invalid ORG operand format", stmt.range);
                return;
            }
            let counter_offset = self
                .ctx
                .current_section()
                .map(|sect| sect.current_counter().current_offset())
                .unwrap_or(0);
            if counter_offset + delta.offset() < 0 {
                self.error(
                    "E068",
                    "ORG target is below the section origin",
                    stmt.range,
                );
                return;
            }
            self.ctx.org_by(delta.offset());
        } else {
            // The target is not computable yet; close the gap with a
            // space the solver fills in later.
            let expr = expr.clone();
            let range = stmt.range;
            let space = self.ctx.org_space(Alignment::bytes(boundary.max(1)));
            self.solver.add_org_dependency(
                &mut self.ctx,
                space,
                expr,
                loctr.clone(),
                boundary,
                offset,
                Some(loctr),
                Some(stmt),
                range,
            );
        }
    }

    pub(super) fn process_cnop(&mut self, stmt: RebuiltStatement) {
        let loctr = self.ctx.align(HALFWORD);
        self.find_sequence_symbol(&stmt);

        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr.clone()),
                    SymbolAttributes::cnop(),
                    stmt.range,
                );
            }
        }

        let ops: Vec<_> = stmt.operands.iter().filter(|op| !op.is_empty()).collect();
        if ops.len() != 2 {
            return;
        }
        // Operands with dependencies are ignored: the label was
        // produced, the alignment is skipped. TODO revisit once the
        // dependency-aware CNOP cases show up in real sources.
        let values = {
            let view = self.ctx.view(Some(loctr));
            let byte = ops[0]
                .expr()
                .filter(|expr| !expr.collect_deps(&view).contains_dependencies())
                .and_then(|expr| expr.evaluate_silent(&view).as_abs());
            let boundary = ops[1]
                .expr()
                .filter(|expr| !expr.collect_deps(&view).contains_dependencies())
                .and_then(|expr| expr.evaluate_silent(&view).as_abs());
            (byte, boundary)
        };
        if let (Some(byte), Some(boundary)) = values {
            if byte >= 0
                && boundary > 0
                && (boundary & (boundary - 1)) == 0
                && byte < boundary
                && byte % 2 == 0
            {
                self.ctx.reserve_storage_area(
                    0,
                    Alignment {
                        byte: byte as u32,
                        boundary: boundary as u32,
                    },
                );
            }
        }
    }

    pub(super) fn process_ccw(&mut self, stmt: RebuiltStatement) {
        const CCW_LENGTH: i32 = 8;
        let loctr = self.ctx.align(DOUBLEWORD);
        self.find_sequence_symbol(&stmt);

        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr),
                    SymbolAttributes::ccw(),
                    stmt.range,
                );
            }
        }

        self.ctx.reserve_storage_area(CCW_LENGTH, DOUBLEWORD);

        // Operand expressions may still wait on later definitions.
        let exprs: Vec<MachExpr> = stmt
            .operands
            .iter()
            .filter_map(|op| op.expr().cloned())
            .collect();
        if !exprs.is_empty() {
            let loctr = self.current_loctr();
            self.solver
                .add_statement_check(&self.ctx, exprs, Some(loctr), stmt);
        }
    }

    pub(super) fn process_ltorg(&mut self, stmt: RebuiltStatement) {
        let loctr = self.ctx.align(DOUBLEWORD);
        self.find_sequence_symbol(&stmt);

        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr),
                    SymbolAttributes::new(SymbolOrigin::Equ, to_ebcdic(b'U'), 1),
                    stmt.range,
                );
            }
        }

        self.generate_pool();
    }

    /// Materialize the pending literal pool at the current location.
    pub(super) fn generate_pool(&mut self) {
        if self.ctx.literals.is_empty() {
            return;
        }
        self.ctx.align(DOUBLEWORD);
        let entries = self.ctx.literals.take_pending();
        for entry in entries {
            let align = entry.data.alignment();
            let addr = self.ctx.align(align);
            let (length, scale, integer) = {
                let view = self.ctx.view(Some(addr.clone()));
                (
                    entry.data.length_attribute(&view),
                    entry.data.scale_attribute(&view),
                    entry.data.integer_attribute(&view),
                )
            };
            let mut attrs = SymbolAttributes::new(
                SymbolOrigin::Dat,
                to_ebcdic(entry.data.type_char as u8),
                length.unwrap_or(UNDEF_LENGTH),
            );
            if let Some(scale) = scale {
                attrs = attrs.with_scale(scale);
            }
            if let Some(integer) = integer {
                attrs = attrs.with_integer(integer);
            }
            self.create_symbol(entry.key, SymbolValue::Relocatable(addr.clone()), attrs, entry.range);

            let total = {
                let view = self.ctx.view(Some(addr.clone()));
                entry.data.operand_length(&view)
            };
            match total {
                Some(total) => {
                    self.ctx.reserve_storage_area(total as i32, NO_ALIGN);
                }
                None => {
                    let space = self.ctx.register_ordinary_space(NO_ALIGN);
                    self.solver.add_data_length_dependency(
                        &mut self.ctx,
                        space,
                        vec![entry.data.clone()],
                        Some(addr),
                        entry.range,
                    );
                }
            }
        }
    }
}
