// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! COPY, EXTRN/WXTRN, OPSYN, AINSERT, ALIAS and TITLE.

use super::*;
use crate::core::statement::OperandKind;

const AINSERT_RECORD_LIMIT: usize = 80;

impl Processor {
    pub(super) fn process_copy(&mut self, stmt: RebuiltStatement) -> StatementAction {
        self.find_sequence_symbol(&stmt);

        let ops: Vec<_> = stmt.operands.iter().filter(|op| !op.is_empty()).collect();
        let member = if ops.len() == 1 { ops[0].plain_symbol() } else { None };
        match member {
            Some(member) => StatementAction::Copy {
                member,
                range: stmt.range,
            },
            None => {
                self.error(
                    "E058",
                    "COPY operand must be a single member name",
                    stmt.operands_range,
                );
                StatementAction::Done
            }
        }
    }

    pub(super) fn process_external(&mut self, stmt: RebuiltStatement, kind: SectionKind) {
        match &stmt.label {
            LabelField::Empty => {}
            LabelField::Sequence { .. } => {
                self.find_sequence_symbol(&stmt);
            }
            other => self.warn(
                "A249",
                "A sequence symbol was expected in the name field",
                other.range(),
            ),
        }

        let op_name = if kind == SectionKind::WeakExternal {
            "WXTRN"
        } else {
            "EXTRN"
        };
        if stmt.operands.is_empty() || stmt.operands_empty() {
            self.error_a013(op_name, 1, stmt.operands_range);
            return;
        }

        // Collect targets first; creating sections mutates the context.
        let mut targets: Vec<(Id, Range)> = Vec::new();
        for op in &stmt.operands {
            match &op.kind {
                OperandKind::Expr(expr) => {
                    if let crate::core::expr::MachExpr::Symbol(id, range) = expr {
                        targets.push((*id, *range));
                    }
                }
                OperandKind::Complex { keyword, args } if keyword == "PART" => {
                    let mut bad = false;
                    for arg in args {
                        if arg.text.is_empty() {
                            bad = true;
                            continue;
                        }
                        match self.ids.intern(&arg.text) {
                            Ok(id) => targets.push((id, arg.range)),
                            Err(err) => self.error(
                                "E065",
                                format!("invalid symbol name: {err}"),
                                arg.range,
                            ),
                        }
                    }
                    if bad {
                        self.error("A129", format!("invalid {op_name} PART operand"), op.range);
                    }
                }
                _ => {}
            }
        }

        for (id, range) in targets {
            if self.ctx.symbol_defined(id) {
                self.error_e031("external symbol", range);
            } else {
                self.ctx.create_external_section(id, kind, range);
                self.notify_symbol(id);
            }
        }
    }

    pub(super) fn process_opsyn(&mut self, stmt: RebuiltStatement) {
        let label = self.find_label_symbol(&stmt);
        if label.is_empty() {
            if stmt.label.is_empty() {
                self.error("E053", "OPSYN requires a name", stmt.label.range());
            }
            return;
        }
        let label_name = self.ids.resolve(label).to_string();

        let ops: Vec<_> = stmt.operands.iter().filter(|op| !op.is_empty()).collect();
        let operand = if ops.len() == 1 {
            ops[0].plain_symbol()
        } else {
            None
        };

        match operand {
            None => {
                // Removal form: LABEL OPSYN (no operand).
                if self.operation_code_exists(&label_name) {
                    self.rebind_opcode(&label_name, None);
                } else {
                    self.error(
                        "E049",
                        format!("Operation code not found: {label_name}"),
                        stmt.label.range(),
                    );
                }
            }
            Some(target) => {
                let target_name = self.ids.resolve(target).to_string();
                match self.resolve_opcode(&target_name) {
                    Some(canonical) => self.rebind_opcode(&label_name, Some(canonical)),
                    None => self.error(
                        "A246",
                        format!("OPSYN target is not an operation code: {target_name}"),
                        ops[0].range,
                    ),
                }
            }
        }
    }

    pub(super) fn process_ainsert(&mut self, stmt: RebuiltStatement) -> StatementAction {
        let ops = &stmt.operands;
        if ops.len() != 2 {
            self.error_a011("AINSERT", 2, stmt.operands_range);
            return StatementAction::Done;
        }

        let destination = match &ops[1].kind {
            OperandKind::Expr(crate::core::expr::MachExpr::Symbol(id, _)) => {
                match self.ids.resolve(*id) {
                    "FRONT" => Some(true),
                    "BACK" => Some(false),
                    _ => None,
                }
            }
            _ => None,
        };
        let Some(front) = destination else {
            self.error(
                "A156",
                "AINSERT second operand must be FRONT or BACK",
                ops[1].range,
            );
            return StatementAction::Done;
        };

        let Some(record) = ops[0].string() else {
            self.error(
                "A301",
                "AINSERT first operand must be a quoted string",
                ops[0].range,
            );
            return StatementAction::Done;
        };
        if record.len() > AINSERT_RECORD_LIMIT {
            self.error(
                "A157",
                format!("AINSERT record is longer than {AINSERT_RECORD_LIMIT} bytes"),
                ops[0].range,
            );
            return StatementAction::Done;
        }
        if record.is_empty() {
            self.error("A021", "AINSERT record cannot be empty", ops[0].range);
            return StatementAction::Done;
        }

        StatementAction::Ainsert {
            record: record.to_string(),
            front,
        }
    }

    pub(super) fn process_alias(&mut self, stmt: RebuiltStatement) {
        let label = self.find_label_symbol(&stmt);
        if label.is_empty() {
            self.error("A163", "ALIAS requires a name", stmt.range);
        }
    }

    pub(super) fn process_title(&mut self, stmt: RebuiltStatement) {
        if let LabelField::Ordinary { id, range } = &stmt.label {
            let name = self.ids.resolve(*id).to_string();
            if self.title.is_none() {
                self.title = Some(name);
            } else {
                self.warn("W016", "TITLE name is already defined", *range);
            }
        }
    }
}
