// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! USING/DROP and the PUSH/POP save stacks.

use super::*;
use crate::core::expr::MachExpr;
use crate::core::statement::{Operand, OperandKind};
use crate::core::using::UsingFrame;

impl Processor {
    pub(super) fn process_using(&mut self, stmt: RebuiltStatement) {
        let loctr = self.current_loctr();

        let label = self.find_label_symbol(&stmt);
        if !label.is_empty() {
            if !self.ctx.symbol_defined(label) {
                self.ctx.register_using_label(label);
            } else if !self.ctx.is_using_label(label) {
                self.error_e031("symbol", stmt.label.range());
                return;
            }
        }

        let ops = &stmt.operands;
        if ops.len() < 2 || ops.len() > 17 {
            self.error_a012("USING", 2, 17, stmt.operands_range);
            return;
        }

        let (begin, end) = match &ops[0].kind {
            OperandKind::Expr(expr) => {
                let view = self.ctx.view(Some(loctr.clone()));
                (expr.evaluate_silent(&view), None)
            }
            OperandKind::Pair(base, end) => {
                let view = self.ctx.view(Some(loctr.clone()));
                (
                    base.evaluate_silent(&view),
                    Some(end.evaluate_silent(&view)),
                )
            }
            _ => {
                self.error(
                    "A104",
                    "USING first operand must be an expression or a (base,end) pair",
                    ops[0].range,
                );
                return;
            }
        };

        let mut registers = Vec::with_capacity(ops.len() - 1);
        for op in &ops[1..] {
            match self.eval_register(op, &loctr) {
                Some(register) => registers.push(register),
                None => {
                    self.error(
                        "A164",
                        "USING base operand must be an absolute value 0 through 15",
                        op.range,
                    );
                    return;
                }
            }
        }

        self.usings.add(UsingFrame {
            label,
            begin,
            end,
            registers,
            range: stmt.range,
        });
    }

    pub(super) fn process_drop(&mut self, stmt: RebuiltStatement) {
        let loctr = self.current_loctr();

        if let Some(label) = match &stmt.label {
            LabelField::Ordinary { id, .. } => Some(*id),
            _ => None,
        } {
            if self.ctx.symbol_defined(label) {
                self.error_e031("symbol", stmt.label.range());
            } else {
                self.warn("A251", "unexpected name field", stmt.label.range());
                self.create_symbol(
                    label,
                    SymbolValue::Relocatable(loctr.clone()),
                    SymbolAttributes::new(
                        crate::core::symbol::SymbolOrigin::Equ,
                        crate::core::ebcdic::to_ebcdic(b'U'),
                        1,
                    ),
                    stmt.range,
                );
            }
        }

        if stmt.operands.is_empty() || stmt.operands_empty() {
            self.usings.remove_all();
            return;
        }

        let ops = stmt.operands.clone();
        for op in &ops {
            if op.is_empty() {
                continue;
            }
            // A bare symbol may name a labeled USING.
            if let Some(id) = op.plain_symbol() {
                if self.ctx.is_using_label(id) {
                    self.usings.remove_label(id);
                    continue;
                }
            }
            match self.eval_register(op, &loctr) {
                Some(register) => self.usings.remove_register(register),
                None => self.error(
                    "A141",
                    "DROP operand must be a base register or USING label",
                    op.range,
                ),
            }
        }
    }

    pub(super) fn process_push(&mut self, stmt: RebuiltStatement) {
        for key in Self::stack_keys(&stmt) {
            match key.as_str() {
                "USING" => self.usings.push(),
                "PRINT" => self.print_saves += 1,
                "ACONTROL" => self.acontrol_saves += 1,
                _ => {}
            }
        }
    }

    pub(super) fn process_pop(&mut self, stmt: RebuiltStatement) {
        for key in Self::stack_keys(&stmt) {
            match key.as_str() {
                "USING" => {
                    if !self.usings.pop() {
                        self.error(
                            "A165",
                            "POP USING without a corresponding PUSH USING",
                            stmt.range,
                        );
                    }
                }
                "PRINT" => self.print_saves = self.print_saves.saturating_sub(1),
                "ACONTROL" => self.acontrol_saves = self.acontrol_saves.saturating_sub(1),
                _ => {}
            }
        }
    }

    fn stack_keys(stmt: &RebuiltStatement) -> Vec<String> {
        stmt.operands
            .iter()
            .filter_map(|op| match &op.kind {
                OperandKind::Expr(MachExpr::Symbol(..)) => Some(op.text.to_ascii_uppercase()),
                _ => None,
            })
            .collect()
    }

    fn eval_register(&self, op: &Operand, loctr: &crate::core::address::Address) -> Option<i32> {
        let expr = op.expr()?;
        let view = self.ctx.view(Some(loctr.clone()));
        expr.evaluate_silent(&view)
            .as_abs()
            .filter(|value| (0..=15).contains(value))
    }
}
