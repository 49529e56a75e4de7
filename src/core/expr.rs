// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Machine-expression trees and their evaluation.
//!
//! Expressions evaluate against a [`SolverView`], the narrow interface
//! onto the symbol table, the current location and the space registry.
//! Directives can wrap the real view to change lookup semantics (EQU
//! attribute operands treat unknown symbols as declared-undefined).
//!
//! Two modes are provided: [`MachExpr::collect_deps`] returns the set
//! of unresolved leaves; [`MachExpr::evaluate`] produces a value and
//! may assume nothing about the dependency set, degrading to
//! `Undefined` when a leaf has no value yet.

use crate::core::address::{Address, SpaceId, SpaceRegistry};
use crate::core::diagnostics::{Diagnostic, Range};
use crate::core::ids::Id;
use crate::core::symbol::{Symbol, SymbolValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Length,
    Type,
    Scale,
    Integer,
}

impl AttrKind {
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'L' => Some(AttrKind::Length),
            'T' => Some(AttrKind::Type),
            'S' => Some(AttrKind::Scale),
            'I' => Some(AttrKind::Integer),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            AttrKind::Length => 'L',
            AttrKind::Type => 'T',
            AttrKind::Scale => 'S',
            AttrKind::Integer => 'I',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Sll,
    Srl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachExpr {
    Constant(i32, Range),
    Symbol(Id, Range),
    LocCounter(Range),
    AttrRef {
        attr: AttrKind,
        symbol: Id,
        range: Range,
    },
    Literal {
        text: String,
        range: Range,
    },
    Unary {
        op: UnaryOp,
        expr: Box<MachExpr>,
        range: Range,
    },
    Binary {
        op: BinaryOp,
        left: Box<MachExpr>,
        right: Box<MachExpr>,
        range: Range,
    },
}

/// Result of a symbol lookup through a solver view.
#[derive(Debug, Clone, Copy)]
pub enum SymbolLookup<'a> {
    /// A symbol object exists; its value may still be `Undefined`.
    Defined(&'a Symbol),
    /// Declared (mentioned) but carries no symbol object.
    Undefined,
    /// Never seen.
    Unknown,
}

/// Narrow interface the evaluator reads the world through.
pub trait SolverView {
    fn lookup(&self, id: Id) -> SymbolLookup<'_>;
    /// Current location counter value, when one is meaningful here.
    fn loctr(&self) -> Option<&Address>;
    /// Symbol standing for a literal in the current pool generation.
    fn literal_symbol(&self, text: &str) -> Option<Id>;
    fn spaces(&self) -> &SpaceRegistry;
}

/// View wrapper that reads "unknown symbol" as "declared undefined",
/// so EQU type/length operands never trigger definition lookahead.
pub struct OverrideSymbolCandidates<'a> {
    base: &'a dyn SolverView,
}

impl<'a> OverrideSymbolCandidates<'a> {
    pub fn new(base: &'a dyn SolverView) -> Self {
        Self { base }
    }
}

impl SolverView for OverrideSymbolCandidates<'_> {
    fn lookup(&self, id: Id) -> SymbolLookup<'_> {
        match self.base.lookup(id) {
            SymbolLookup::Unknown => SymbolLookup::Undefined,
            other => other,
        }
    }

    fn loctr(&self) -> Option<&Address> {
        self.base.loctr()
    }

    fn literal_symbol(&self, text: &str) -> Option<Id> {
        self.base.literal_symbol(text)
    }

    fn spaces(&self) -> &SpaceRegistry {
        self.base.spaces()
    }
}

/// Unresolved leaves found while collecting dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    pub undefined_symbols: Vec<Id>,
    pub unresolved_spaces: Vec<SpaceId>,
}

impl DependencySet {
    pub fn contains_dependencies(&self) -> bool {
        !self.undefined_symbols.is_empty() || !self.unresolved_spaces.is_empty()
    }

    fn push_symbol(&mut self, id: Id) {
        if !self.undefined_symbols.contains(&id) {
            self.undefined_symbols.push(id);
        }
    }

    fn push_address_spaces(&mut self, addr: &Address, registry: &SpaceRegistry) {
        for space in addr.unresolved_spaces(registry) {
            if !self.unresolved_spaces.contains(&space) {
                self.unresolved_spaces.push(space);
            }
        }
    }

    pub fn merge(&mut self, other: DependencySet) {
        for id in other.undefined_symbols {
            self.push_symbol(id);
        }
        for space in other.unresolved_spaces {
            if !self.unresolved_spaces.contains(&space) {
                self.unresolved_spaces.push(space);
            }
        }
    }
}

impl MachExpr {
    pub fn range(&self) -> Range {
        match self {
            MachExpr::Constant(_, range)
            | MachExpr::Symbol(_, range)
            | MachExpr::LocCounter(range)
            | MachExpr::AttrRef { range, .. }
            | MachExpr::Literal { range, .. }
            | MachExpr::Unary { range, .. }
            | MachExpr::Binary { range, .. } => *range,
        }
    }

    /// Leftmost term of the expression tree; EQU inherits the length
    /// attribute from it when no explicit length operand is given.
    pub fn leftmost_term(&self) -> &MachExpr {
        match self {
            MachExpr::Unary { expr, .. } => expr.leftmost_term(),
            MachExpr::Binary { left, .. } => left.leftmost_term(),
            other => other,
        }
    }

    /// Symbols referenced anywhere in the tree.
    pub fn referenced_symbols(&self, out: &mut Vec<Id>) {
        match self {
            MachExpr::Symbol(id, _) | MachExpr::AttrRef { symbol: id, .. } => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            MachExpr::Unary { expr, .. } => expr.referenced_symbols(out),
            MachExpr::Binary { left, right, .. } => {
                left.referenced_symbols(out);
                right.referenced_symbols(out);
            }
            _ => {}
        }
    }

    /// Literal operand texts referenced anywhere in the tree.
    pub fn referenced_literals<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            MachExpr::Literal { text, .. } => {
                if !out.iter().any(|t| *t == text.as_str()) {
                    out.push(text);
                }
            }
            MachExpr::Unary { expr, .. } => expr.referenced_literals(out),
            MachExpr::Binary { left, right, .. } => {
                left.referenced_literals(out);
                right.referenced_literals(out);
            }
            _ => {}
        }
    }

    /// Collect the unresolved leaves of this expression.
    pub fn collect_deps(&self, view: &dyn SolverView) -> DependencySet {
        let mut deps = DependencySet::default();
        self.collect_into(view, &mut deps);
        deps
    }

    fn collect_into(&self, view: &dyn SolverView, deps: &mut DependencySet) {
        match self {
            MachExpr::Constant(..) => {}
            MachExpr::Symbol(id, _) => match view.lookup(*id) {
                SymbolLookup::Defined(sym) => match &sym.value {
                    SymbolValue::Relocatable(addr) => {
                        deps.push_address_spaces(addr, view.spaces());
                    }
                    SymbolValue::Absolute(_) => {}
                    SymbolValue::Undefined => deps.push_symbol(*id),
                },
                SymbolLookup::Undefined | SymbolLookup::Unknown => deps.push_symbol(*id),
            },
            MachExpr::LocCounter(_) => {
                if let Some(addr) = view.loctr() {
                    deps.push_address_spaces(addr, view.spaces());
                }
            }
            MachExpr::AttrRef { attr, symbol, .. } => match view.lookup(*symbol) {
                SymbolLookup::Defined(sym) if sym.value.is_defined() => {
                    if *attr == AttrKind::Length && !sym.attrs.length_defined() {
                        deps.push_symbol(*symbol);
                    }
                }
                _ => deps.push_symbol(*symbol),
            },
            MachExpr::Literal { text, .. } => match view.literal_symbol(text) {
                Some(id) => match view.lookup(id) {
                    SymbolLookup::Defined(sym) if sym.value.is_defined() => {
                        if let SymbolValue::Relocatable(addr) = &sym.value {
                            deps.push_address_spaces(addr, view.spaces());
                        }
                    }
                    _ => deps.push_symbol(id),
                },
                None => {}
            },
            MachExpr::Unary { expr, .. } => expr.collect_into(view, deps),
            MachExpr::Binary { left, right, .. } => {
                left.collect_into(view, deps);
                right.collect_into(view, deps);
            }
        }
    }

    /// Evaluate to a value. Leaves without a value degrade the result
    /// to `Undefined`; arithmetic violations report into `diags`.
    pub fn evaluate(&self, view: &dyn SolverView, diags: &mut Vec<Diagnostic>) -> SymbolValue {
        match self {
            MachExpr::Constant(value, _) => SymbolValue::Absolute(*value),
            MachExpr::Symbol(id, _) => match view.lookup(*id) {
                SymbolLookup::Defined(sym) => normalized(sym.value.clone(), view),
                _ => SymbolValue::Undefined,
            },
            MachExpr::LocCounter(_) => match view.loctr() {
                Some(addr) => normalized(SymbolValue::Relocatable(addr.clone()), view),
                None => SymbolValue::Undefined,
            },
            MachExpr::AttrRef { attr, symbol, .. } => match view.lookup(*symbol) {
                SymbolLookup::Defined(sym) => attribute_value(*attr, sym),
                SymbolLookup::Undefined | SymbolLookup::Unknown => match attr {
                    AttrKind::Length => SymbolValue::Absolute(1),
                    AttrKind::Type => {
                        SymbolValue::Absolute(crate::core::ebcdic::to_ebcdic(b'U') as i32)
                    }
                    AttrKind::Scale | AttrKind::Integer => SymbolValue::Absolute(0),
                },
            },
            MachExpr::Literal { text, .. } => match view
                .literal_symbol(text)
                .map(|id| view.lookup(id))
            {
                Some(SymbolLookup::Defined(sym)) => normalized(sym.value.clone(), view),
                _ => SymbolValue::Undefined,
            },
            MachExpr::Unary { op, expr, range } => {
                let value = expr.evaluate(view, diags);
                apply_unary(*op, value, *range, diags)
            }
            MachExpr::Binary {
                op,
                left,
                right,
                range,
            } => {
                let lhs = left.evaluate(view, diags);
                let rhs = right.evaluate(view, diags);
                apply_binary(*op, lhs, rhs, *range, view, diags)
            }
        }
    }

    /// Evaluate, discarding arithmetic diagnostics.
    pub fn evaluate_silent(&self, view: &dyn SolverView) -> SymbolValue {
        let mut scratch = Vec::new();
        self.evaluate(view, &mut scratch)
    }
}

fn normalized(value: SymbolValue, view: &dyn SolverView) -> SymbolValue {
    match value {
        SymbolValue::Relocatable(addr) => {
            let addr = addr.normalized(view.spaces());
            if addr.is_absolute() {
                SymbolValue::Absolute(addr.offset())
            } else {
                SymbolValue::Relocatable(addr)
            }
        }
        other => other,
    }
}

fn attribute_value(attr: AttrKind, sym: &Symbol) -> SymbolValue {
    match attr {
        AttrKind::Length => SymbolValue::Absolute(sym.attrs.length() as i32),
        AttrKind::Type => SymbolValue::Absolute(sym.attrs.type_attr as i32),
        AttrKind::Scale => SymbolValue::Absolute(sym.attrs.scale()),
        AttrKind::Integer => SymbolValue::Absolute(sym.attrs.integer()),
    }
}

fn apply_unary(
    op: UnaryOp,
    value: SymbolValue,
    range: Range,
    diags: &mut Vec<Diagnostic>,
) -> SymbolValue {
    match (op, value) {
        (_, SymbolValue::Undefined) => SymbolValue::Undefined,
        (UnaryOp::Plus, value) => value,
        (UnaryOp::Minus, SymbolValue::Absolute(v)) => SymbolValue::Absolute(v.wrapping_neg()),
        (UnaryOp::Minus, SymbolValue::Relocatable(addr)) => SymbolValue::Relocatable(-&addr),
        (UnaryOp::Not, SymbolValue::Absolute(v)) => SymbolValue::Absolute(!v),
        (UnaryOp::Not, SymbolValue::Relocatable(_)) => {
            diags.push(Diagnostic::error(
                "CE004",
                "operand of NOT must be an absolute value",
                range,
            ));
            SymbolValue::Undefined
        }
    }
}

fn apply_binary(
    op: BinaryOp,
    lhs: SymbolValue,
    rhs: SymbolValue,
    range: Range,
    view: &dyn SolverView,
    diags: &mut Vec<Diagnostic>,
) -> SymbolValue {
    use SymbolValue::{Absolute, Relocatable, Undefined};

    match (op, lhs, rhs) {
        (_, Undefined, _) | (_, _, Undefined) => Undefined,
        (BinaryOp::Add, Absolute(l), Absolute(r)) => Absolute(l.wrapping_add(r)),
        (BinaryOp::Add, Relocatable(addr), Absolute(n))
        | (BinaryOp::Add, Absolute(n), Relocatable(addr)) => {
            let mut addr = addr;
            addr.add_offset(n);
            normalized(Relocatable(addr), view)
        }
        (BinaryOp::Add, Relocatable(l), Relocatable(r)) => normalized(Relocatable(&l + &r), view),
        (BinaryOp::Sub, Absolute(l), Absolute(r)) => Absolute(l.wrapping_sub(r)),
        (BinaryOp::Sub, Relocatable(addr), Absolute(n)) => {
            let mut addr = addr;
            addr.add_offset(n.wrapping_neg());
            normalized(Relocatable(addr), view)
        }
        (BinaryOp::Sub, Absolute(n), Relocatable(addr)) => {
            let mut addr = -&addr;
            addr.add_offset(n);
            normalized(Relocatable(addr), view)
        }
        (BinaryOp::Sub, Relocatable(l), Relocatable(r)) => normalized(Relocatable(&l - &r), view),
        (BinaryOp::Div, Absolute(_), Absolute(0)) => {
            diags.push(Diagnostic::error("CE012", "division by zero", range));
            Undefined
        }
        (op, Absolute(l), Absolute(r)) => Absolute(match op {
            BinaryOp::Mul => l.wrapping_mul(r),
            BinaryOp::Div => l.wrapping_div(r),
            BinaryOp::And => l & r,
            BinaryOp::Or => l | r,
            BinaryOp::Xor => l ^ r,
            BinaryOp::Sll => l.wrapping_shl(r as u32 & 0x3F),
            BinaryOp::Srl => ((l as u32).wrapping_shr(r as u32 & 0x3F)) as i32,
            BinaryOp::Add | BinaryOp::Sub => unreachable!(),
        }),
        (_, _, _) => {
            diags.push(Diagnostic::error(
                "CE004",
                "relocatable operand where an absolute value is required",
                range,
            ));
            Undefined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::SectionId;
    use crate::core::ids::IdStorage;
    use crate::core::symbol::SymbolAttributes;

    struct TestView {
        symbols: Vec<Symbol>,
        spaces: SpaceRegistry,
        loctr: Option<Address>,
    }

    impl TestView {
        fn new() -> Self {
            Self {
                symbols: Vec::new(),
                spaces: SpaceRegistry::new(),
                loctr: None,
            }
        }

        fn define(&mut self, id: Id, value: SymbolValue) {
            self.symbols.push(Symbol::new(
                id,
                value,
                SymbolAttributes::undefined(),
                Range::default(),
            ));
        }
    }

    impl SolverView for TestView {
        fn lookup(&self, id: Id) -> SymbolLookup<'_> {
            match self.symbols.iter().find(|sym| sym.name == id) {
                Some(sym) => SymbolLookup::Defined(sym),
                None => SymbolLookup::Unknown,
            }
        }

        fn loctr(&self) -> Option<&Address> {
            self.loctr.as_ref()
        }

        fn literal_symbol(&self, _text: &str) -> Option<Id> {
            None
        }

        fn spaces(&self) -> &SpaceRegistry {
            &self.spaces
        }
    }

    fn sym(id: Id) -> MachExpr {
        MachExpr::Symbol(id, Range::default())
    }

    fn num(value: i32) -> MachExpr {
        MachExpr::Constant(value, Range::default())
    }

    fn bin(op: BinaryOp, left: MachExpr, right: MachExpr) -> MachExpr {
        MachExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            range: Range::default(),
        }
    }

    #[test]
    fn absolute_arithmetic() {
        let view = TestView::new();
        let expr = bin(BinaryOp::Add, num(2), bin(BinaryOp::Mul, num(3), num(4)));
        assert_eq!(expr.evaluate_silent(&view), SymbolValue::Absolute(14));
    }

    #[test]
    fn division_truncates_toward_zero_and_guards_zero() {
        let view = TestView::new();
        assert_eq!(
            bin(BinaryOp::Div, num(-7), num(2)).evaluate_silent(&view),
            SymbolValue::Absolute(-3)
        );
        let mut diags = Vec::new();
        assert_eq!(
            bin(BinaryOp::Div, num(7), num(0)).evaluate(&view, &mut diags),
            SymbolValue::Undefined
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "CE012");
    }

    #[test]
    fn reloc_difference_cancels_to_absolute() {
        let mut ids = IdStorage::new();
        let mut view = TestView::new();
        let a = ids.add("A");
        let b = ids.add("B");
        let base = Address::section_origin(SectionId(0));
        view.define(a, SymbolValue::Relocatable(base.clone().with_offset(8)));
        view.define(b, SymbolValue::Relocatable(base.with_offset(20)));
        let expr = bin(BinaryOp::Sub, sym(b), sym(a));
        assert_eq!(expr.evaluate_silent(&view), SymbolValue::Absolute(12));
    }

    #[test]
    fn undefined_leaf_poisons_result_and_is_collected() {
        let mut ids = IdStorage::new();
        let view = TestView::new();
        let x = ids.add("X");
        let expr = bin(BinaryOp::Add, sym(x), num(1));
        assert_eq!(expr.evaluate_silent(&view), SymbolValue::Undefined);
        let deps = expr.collect_deps(&view);
        assert_eq!(deps.undefined_symbols, vec![x]);
    }

    #[test]
    fn relocatable_multiplication_is_rejected() {
        let mut ids = IdStorage::new();
        let mut view = TestView::new();
        let a = ids.add("A");
        view.define(
            a,
            SymbolValue::Relocatable(Address::section_origin(SectionId(0))),
        );
        let mut diags = Vec::new();
        let expr = bin(BinaryOp::Mul, sym(a), num(2));
        assert_eq!(expr.evaluate(&view, &mut diags), SymbolValue::Undefined);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn override_wrapper_reads_unknown_as_undefined() {
        let mut ids = IdStorage::new();
        let view = TestView::new();
        let x = ids.add("X");
        let wrapped = OverrideSymbolCandidates::new(&view);
        assert!(matches!(wrapped.lookup(x), SymbolLookup::Undefined));
    }

    #[test]
    fn length_attribute_of_undefined_symbol_defaults_to_one() {
        let mut ids = IdStorage::new();
        let view = TestView::new();
        let x = ids.add("X");
        let expr = MachExpr::AttrRef {
            attr: AttrKind::Length,
            symbol: x,
            range: Range::default(),
        };
        assert_eq!(expr.evaluate_silent(&view), SymbolValue::Absolute(1));
    }

    #[test]
    fn leftmost_term_walks_left_spine() {
        let mut ids = IdStorage::new();
        let y = ids.add("Y");
        let expr = bin(BinaryOp::Sub, bin(BinaryOp::Add, sym(y), num(5)), sym(y));
        assert_eq!(expr.leftmost_term(), &sym(y));
    }
}
