// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Rebuilt statements: the dispatcher's input.
//!
//! Statements arrive with conditional-assembly substitution already
//! applied; the dispatcher treats them as immutable owned values and
//! moves them into the postponed store when deferring. The operand
//! variants form a closed set and are matched exhaustively.

use crate::core::diagnostics::Range;
use crate::core::expr::MachExpr;
use crate::core::ids::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelField {
    Empty,
    /// Ordinary symbol in the name field.
    Ordinary { id: Id, range: Range },
    /// Sequence symbol `.NAME`.
    Sequence { id: Id, range: Range },
    /// Variable symbol `&NAME` that survived substitution.
    Variable { text: String, range: Range },
}

impl LabelField {
    pub fn range(&self) -> Range {
        match self {
            LabelField::Empty => Range::default(),
            LabelField::Ordinary { range, .. }
            | LabelField::Sequence { range, .. }
            | LabelField::Variable { range, .. } => *range,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LabelField::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexArg {
    pub text: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    Empty,
    Expr(MachExpr),
    /// Quoted string operand with the apostrophes stripped.
    String(String),
    /// `KEYWORD(arg,arg,…)`.
    Complex {
        keyword: String,
        args: Vec<ComplexArg>,
    },
    /// `(base,end)` pair, first operand of USING.
    Pair(MachExpr, MachExpr),
    /// Operand text that did not parse; the message explains why.
    Bad(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Raw source text; DC/DS reparse it as a data definition.
    pub text: String,
    pub kind: OperandKind,
    pub range: Range,
}

impl Operand {
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, OperandKind::Empty)
    }

    pub fn expr(&self) -> Option<&MachExpr> {
        match &self.kind {
            OperandKind::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match &self.kind {
            OperandKind::String(text) => Some(text),
            _ => None,
        }
    }

    /// The single symbol this operand names, when it is exactly that.
    pub fn plain_symbol(&self) -> Option<Id> {
        match &self.kind {
            OperandKind::Expr(MachExpr::Symbol(id, _)) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RebuiltStatement {
    pub label: LabelField,
    /// Upper-cased operation code.
    pub opcode: String,
    pub opcode_range: Range,
    pub operands: Vec<Operand>,
    pub operands_range: Range,
    /// Whole-statement range.
    pub range: Range,
    /// Zero-based source line of the statement.
    pub line: u32,
}

impl RebuiltStatement {
    pub fn operand(&self, idx: usize) -> Option<&Operand> {
        self.operands.get(idx)
    }

    /// True when the operand field is empty or all-empty placeholders
    /// (the " , " form counts as empty).
    pub fn operands_empty(&self) -> bool {
        self.operands.iter().all(Operand::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_operand_detection() {
        let stmt = RebuiltStatement {
            label: LabelField::Empty,
            opcode: "ORG".to_string(),
            opcode_range: Range::default(),
            operands: vec![
                Operand {
                    text: String::new(),
                    kind: OperandKind::Empty,
                    range: Range::default(),
                },
                Operand {
                    text: String::new(),
                    kind: OperandKind::Empty,
                    range: Range::default(),
                },
            ],
            operands_range: Range::default(),
            range: Range::default(),
            line: 0,
        };
        assert!(stmt.operands_empty());
    }

    #[test]
    fn plain_symbol_only_matches_bare_symbols() {
        let op = Operand {
            text: "X".to_string(),
            kind: OperandKind::Expr(MachExpr::Symbol(Id::EMPTY, Range::default())),
            range: Range::default(),
        };
        assert!(op.plain_symbol().is_some());
        let op = Operand {
            text: "'X'".to_string(),
            kind: OperandKind::String("X".to_string()),
            range: Range::default(),
        };
        assert!(op.plain_symbol().is_none());
    }
}
