// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! MNOTE: user-emitted diagnostics.

use super::*;
use crate::core::expr::MachExpr;
use crate::core::statement::OperandKind;

const MNOTE_MAX_MESSAGE: usize = 1020;
const MNOTE_MAX_OPERANDS: usize = 1024;

impl Processor {
    pub(super) fn process_mnote(&mut self, stmt: RebuiltStatement) {
        self.find_sequence_symbol(&stmt);

        let ops = &stmt.operands;
        let mut level: Option<u32> = None;
        let mut first_op_len = 0usize;

        match ops.len() {
            0 => {
                self.error_a012("MNOTE", 1, 2, stmt.operands_range);
                return;
            }
            1 => level = Some(0),
            2 => match &ops[0].kind {
                OperandKind::Empty => level = Some(1),
                OperandKind::Expr(MachExpr::LocCounter(_)) => {
                    // `*` repeats the previous MNOTE level.
                    level = Some(self.last_mnote_level);
                    first_op_len = 1;
                }
                OperandKind::Expr(_) => {
                    first_op_len = ops[0].text.len();
                    level = ops[0]
                        .text
                        .parse::<u32>()
                        .ok()
                        .filter(|value| *value <= 255);
                }
                _ => {}
            },
            _ => {
                self.error_a012("MNOTE", 1, 2, stmt.operands_range);
                return;
            }
        }

        let Some(level) = level else {
            self.error(
                "A119",
                "MNOTE severity must be * or an absolute value 0 through 255",
                ops[0].range,
            );
            return;
        };

        let last = ops.last().expect("operand count checked above");
        let range = last.range;
        let mut text: &str = "";
        match &last.kind {
            OperandKind::String(body) => text = body,
            OperandKind::Expr(_) => {
                text = &last.text;
                self.warn("A300", "MNOTE message should be enclosed in apostrophes", range);
            }
            _ => {
                self.warn("A300", "MNOTE message should be enclosed in apostrophes", range);
            }
        }

        let mut text = text.to_string();
        if text.len() > MNOTE_MAX_MESSAGE {
            self.error("A117", "MNOTE message is too long", range);
            text.truncate(MNOTE_MAX_MESSAGE);
        } else if text.len() + first_op_len > MNOTE_MAX_OPERANDS {
            self.error("A118", "MNOTE operands are too long", range);
        }

        self.diags
            .push(crate::core::diagnostics::Diagnostic::mnote(level, &text, range));

        self.last_mnote_level = level;
        if level > self.mnote_max {
            self.mnote_max = level;
        }
    }
}
