// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Symbol-defining directives: EQU and DC/DS.

use super::*;
use crate::core::address::Alignment;
use crate::core::data_def::{operands_length, DataDef};
use crate::core::ebcdic::to_ebcdic;
use crate::core::expr::{AttrKind, MachExpr, OverrideSymbolCandidates};
use crate::core::statement::OperandKind;
use crate::core::symbol::{SymbolOrigin, UNDEF_LENGTH};

impl Processor {
    pub(super) fn process_equ(&mut self, stmt: RebuiltStatement) {
        let loctr = self.current_loctr();
        let symbol = self.find_label_symbol(&stmt);

        if symbol.is_empty() {
            if stmt.label.is_empty() {
                self.error("E053", "EQU requires a name", stmt.label.range());
            }
            return;
        }
        if self.ctx.symbol_defined(symbol) {
            self.error_e031("symbol", stmt.label.range());
            return;
        }

        let ops = &stmt.operands;
        if ops.is_empty() || ops.len() > 5 {
            self.error_a012("EQU", 1, 5, stmt.range);
            return;
        }

        // Type attribute operand. Unknown symbols read as declared
        // undefined so the operand never triggers lookahead.
        let mut t_attr: Option<u8> = None;
        if let Some(op) = ops.get(2).filter(|op| !op.is_empty()) {
            let value = match &op.kind {
                OperandKind::Expr(expr) => {
                    let view = self.ctx.view(Some(loctr.clone()));
                    let wrapped = OverrideSymbolCandidates::new(&view);
                    if expr.collect_deps(&wrapped).contains_dependencies() {
                        None
                    } else {
                        expr.evaluate_silent(&wrapped)
                            .as_abs()
                            .filter(|v| (0..=255).contains(v))
                    }
                }
                _ => None,
            };
            match value {
                Some(v) => t_attr = Some(v as u8),
                None => self.error(
                    "A134",
                    "EQU type attribute must be an absolute value 0 through 255",
                    op.range,
                ),
            }
        }

        // Length attribute operand.
        let mut length_attr: Option<u32> = None;
        if let Some(op) = ops.get(1).filter(|op| !op.is_empty()) {
            let value = match &op.kind {
                OperandKind::Expr(expr) => {
                    let view = self.ctx.view(Some(loctr.clone()));
                    let wrapped = OverrideSymbolCandidates::new(&view);
                    if expr.collect_deps(&wrapped).contains_dependencies() {
                        None
                    } else {
                        expr.evaluate_silent(&wrapped)
                            .as_abs()
                            .filter(|v| (0..=65535).contains(v))
                    }
                }
                _ => None,
            };
            match value {
                Some(v) => length_attr = Some(v as u32),
                None => self.error(
                    "A133",
                    "EQU length attribute must be an absolute value 0 through 65535",
                    op.range,
                ),
            }
        }

        // Value operand.
        let Some(expr) = ops[0].expr() else {
            self.error("A132", "EQU value must be an expression", ops[0].range);
            return;
        };

        let deps = {
            let view = self.ctx.view(Some(loctr.clone()));
            expr.collect_deps(&view)
        };

        // Default length: inherit from the leftmost term when it is a
        // defined symbol, else 1.
        if length_attr.is_none() {
            if let MachExpr::Symbol(id, _) = expr.leftmost_term() {
                if let Some(sym) = self.ctx.get_symbol(*id) {
                    if sym.value.is_defined() {
                        length_attr = Some(sym.attrs.length());
                    }
                }
            }
        }
        let attrs = SymbolAttributes::new(
            SymbolOrigin::Equ,
            t_attr.unwrap_or_else(|| to_ebcdic(b'U')),
            length_attr.unwrap_or(1),
        );

        if deps.undefined_symbols.is_empty() {
            // Computable now; the value may still carry open spaces.
            let value = {
                let view = self.ctx.view(Some(loctr.clone()));
                let mut diags = Vec::new();
                let value = expr.evaluate(&view, &mut diags);
                (value, diags)
            };
            self.diags.extend(value.1);
            self.create_symbol(symbol, value.0, attrs, stmt.range);
        } else {
            let value_expr = expr.clone();
            let stmt_range = stmt.range;
            self.ctx
                .create_symbol(symbol, SymbolValue::Undefined, attrs, stmt_range);
            if !self.solver.add_symbol_dependency(
                &mut self.ctx,
                symbol,
                value_expr,
                Some(loctr),
                Some(stmt),
                stmt_range,
            ) {
                self.error("E033", "Cyclic symbol definition", stmt_range);
            }
        }
    }

    pub(super) fn process_data(&mut self, stmt: RebuiltStatement) {
        self.find_sequence_symbol(&stmt);

        let ops = &stmt.operands;
        if ops.is_empty() || ops.iter().any(|op| op.is_empty()) {
            self.error(
                "A021",
                format!("{} operands cannot be empty", stmt.opcode),
                stmt.operands_range,
            );
            return;
        }

        let mut defs: Vec<DataDef> = Vec::with_capacity(ops.len());
        for op in ops {
            match parse_data_def(&op.text, stmt.line, op.range.start.col, &mut self.ids) {
                Ok(def) => defs.push(def),
                Err(err) => {
                    self.error("D001", format!("invalid data definition: {err}"), err.range);
                    return;
                }
            }
        }

        // The first operand's alignment applies to the whole statement
        // start; that aligned location is the label's value.
        let loctr = self.ctx.align(defs[0].alignment());

        let label = self.find_label_symbol(&stmt);
        let mut patch_length = false;
        let mut patch_scale = false;

        if !label.is_empty() {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                let first = &defs[0];
                // Detect self-references before the symbol exists.
                let (length, scale, integer, l_pending, s_pending) = {
                    let view = self.ctx.view(Some(loctr.clone()));
                    let l_deps = first
                        .length
                        .as_ref()
                        .map(|expr| expr.collect_deps(&view))
                        .unwrap_or_default();
                    let s_deps = first
                        .scale
                        .as_ref()
                        .map(|expr| expr.collect_deps(&view))
                        .unwrap_or_default();
                    let l_pending = l_deps.contains_dependencies();
                    let s_pending = s_deps.contains_dependencies();
                    let length = if l_pending {
                        None
                    } else {
                        first.length_attribute(&view)
                    };
                    let scale = if s_pending {
                        None
                    } else {
                        first.scale_attribute(&view)
                    };
                    let integer = first.integer_attribute(&view);
                    (length, scale, integer, l_pending, s_pending)
                };

                let mut attrs = SymbolAttributes::new(
                    SymbolOrigin::Dat,
                    to_ebcdic(first.type_char as u8),
                    length.unwrap_or(UNDEF_LENGTH),
                );
                if let Some(scale) = scale {
                    attrs = attrs.with_scale(scale);
                }
                if let Some(integer) = integer {
                    attrs = attrs.with_integer(integer);
                }
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr.clone()),
                    attrs,
                    stmt.range,
                );
                patch_length = l_pending && first.length.is_some();
                patch_scale = s_pending && first.scale.is_some();
            }
        }

        // Enroll the deferred attribute patches; the solver never lets
        // them wait on the label itself.
        if patch_length {
            let expr = defs[0].length.clone().expect("checked above");
            if !self.solver.add_attr_dependency(
                &mut self.ctx,
                label,
                AttrKind::Length,
                expr,
                Some(loctr.clone()),
                defs[0].range,
            ) {
                self.error("E033", "Cyclic symbol definition", ops[0].range);
            }
        }
        if patch_scale {
            let expr = defs[0].scale.clone().expect("checked above");
            if !self.solver.add_attr_dependency(
                &mut self.ctx,
                label,
                AttrKind::Scale,
                expr,
                Some(loctr.clone()),
                defs[0].range,
            ) {
                self.error("E033", "Cyclic symbol definition", ops[0].range);
            }
        }

        // Lay the operands out in chunks: a new chunk starts whenever
        // the alignment requirement grows, so every chunk begins on a
        // boundary it can compute gaps from.
        let mut idx = 0usize;
        while idx < defs.len() {
            let start = idx;
            let initial_align = defs[idx].alignment();
            let chunk_loctr = self.ctx.align(initial_align);
            let mut current_boundary = initial_align.boundary;
            let mut has_deps = false;
            while idx < defs.len() {
                let op_align = defs[idx].alignment();
                if op_align.boundary > current_boundary {
                    break;
                }
                current_boundary = op_align.boundary;
                let view = self.ctx.view(Some(chunk_loctr.clone()));
                has_deps |= defs[idx].length_deps(&view).contains_dependencies();
                idx += 1;
            }
            let chunk: Vec<DataDef> = defs[start..idx].to_vec();
            if has_deps {
                let space = self
                    .ctx
                    .register_ordinary_space(Alignment::bytes(current_boundary.max(1)));
                self.solver.add_data_length_dependency(
                    &mut self.ctx,
                    space,
                    chunk,
                    Some(chunk_loctr),
                    stmt.range,
                );
            } else {
                let length = {
                    let view = self.ctx.view(Some(chunk_loctr.clone()));
                    operands_length(&chunk, &view)
                };
                if let Some(length) = length {
                    self.ctx.reserve_storage_area(length as i32, NO_ALIGN);
                }
            }
        }
    }
}
