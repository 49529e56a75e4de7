// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Dependency solver and postponed-statement store.
//!
//! Anything that cannot be computed when its statement is processed is
//! parked here as a *dependant*: a lazily-defined symbol (EQU), a
//! self-referential length/scale patch (DC), a space waiting for a
//! data-definition length or an ORG distance, or a check-only
//! postponed statement. Dependants wait on symbol and space keys;
//! whenever a key gains a value the waiters re-collect their
//! dependency sets and either retire or re-park on what is left.
//!
//! Cycles among lazily-defined symbols are detected when the closing
//! edge is added, by a depth-first walk over the pending subgraph; the
//! participants are abandoned so a cycle reports exactly once.

use std::collections::VecDeque;

use indexmap::IndexMap;

use crate::core::address::{Address, Alignment, SpaceId};
use crate::core::data_def::{operands_length, DataDef};
use crate::core::diagnostics::{Diagnostic, Range};
use crate::core::expr::{AttrKind, DependencySet, MachExpr};
use crate::core::ids::{Id, IdStorage};
use crate::core::ordinary::OrdinaryContext;
use crate::core::statement::RebuiltStatement;
use crate::core::symbol::SymbolValue;

pub type PostponedId = usize;

/// A key a dependant can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKey {
    Symbol(Id),
    Space(SpaceId),
}

/// What gets written once the dependencies are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepTarget {
    Symbol(Id),
    SymbolAttr(Id, AttrKind),
    Space(SpaceId),
    Statement,
}

/// The computation a dependant performs on retirement.
#[derive(Debug)]
enum Resolvable {
    /// Define the target symbol from the expression.
    Value(MachExpr),
    /// Patch L'/S' of the target symbol from the expression.
    Attr(MachExpr),
    /// Close the target space with a data-definition chunk length.
    DataLength(Vec<DataDef>),
    /// Close the target space with the distance from `prev` to the
    /// aligned ORG target.
    OrgTarget {
        expr: MachExpr,
        prev: Address,
        boundary: u32,
        offset: i32,
    },
    /// Nothing to write; exists so unresolved operands surface at
    /// finalization.
    Check(Vec<MachExpr>),
}

#[derive(Debug)]
struct Dependant {
    target: DepTarget,
    resolvable: Resolvable,
    /// Location counter value captured at the statement, for `*`.
    loctr: Option<Address>,
    /// The postponed statement, kept for diagnostics.
    stmt: Option<RebuiltStatement>,
    range: Range,
    waits_on: Vec<DepKey>,
    done: bool,
}

#[derive(Debug, Default)]
pub struct DependencySolver {
    dependants: Vec<Dependant>,
    waiters: IndexMap<DepKey, Vec<PostponedId>>,
    ready: VecDeque<DepKey>,
    /// Pending lazily-defined symbols, for cycle detection.
    pending_symbols: IndexMap<Id, PostponedId>,
}

impl DependencySolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.dependants.iter().filter(|d| !d.done).count()
    }

    /// Define `symbol` lazily from `expr`. The symbol must already
    /// exist with an `Undefined` value. Returns false when the new
    /// edge closes a cycle; the cycle participants are abandoned and
    /// the caller reports E033 once.
    pub fn add_symbol_dependency(
        &mut self,
        ctx: &mut OrdinaryContext,
        symbol: Id,
        expr: MachExpr,
        loctr: Option<Address>,
        stmt: Option<RebuiltStatement>,
        range: Range,
    ) -> bool {
        let dependant = Dependant {
            target: DepTarget::Symbol(symbol),
            resolvable: Resolvable::Value(expr),
            loctr,
            stmt,
            range,
            waits_on: Vec::new(),
            done: false,
        };
        let deps = self.collect(&dependant, ctx);
        if let Some(path) = self.find_cycle(symbol, &deps.undefined_symbols) {
            for participant in path {
                if let Some(idx) = self.pending_symbols.swap_remove(&participant) {
                    self.dependants[idx].done = true;
                }
            }
            return false;
        }
        let idx = self.push(dependant);
        self.pending_symbols.insert(symbol, idx);
        if deps.contains_dependencies() {
            self.park(idx, &deps);
        } else {
            // Everything needed is already here.
            let mut diags = Vec::new();
            self.apply(idx, ctx, &mut diags);
        }
        true
    }

    /// Self-referential L'/S' patch for a DC/DS label. Returns false
    /// on a cycle, mirroring `add_symbol_dependency`.
    pub fn add_attr_dependency(
        &mut self,
        ctx: &mut OrdinaryContext,
        symbol: Id,
        attr: AttrKind,
        expr: MachExpr,
        loctr: Option<Address>,
        range: Range,
    ) -> bool {
        let dependant = Dependant {
            target: DepTarget::SymbolAttr(symbol, attr),
            resolvable: Resolvable::Attr(expr),
            loctr,
            stmt: None,
            range,
            waits_on: Vec::new(),
            done: false,
        };
        let deps = self.collect(&dependant, ctx);
        if let Some(path) = self.find_cycle(symbol, &deps.undefined_symbols) {
            for participant in path {
                if let Some(idx) = self.pending_symbols.swap_remove(&participant) {
                    self.dependants[idx].done = true;
                }
            }
            return false;
        }
        let idx = self.push(dependant);
        if deps.contains_dependencies() {
            self.park(idx, &deps);
        } else {
            let mut diags = Vec::new();
            self.apply(idx, ctx, &mut diags);
        }
        true
    }

    /// Close `space` once the chunk of data definitions has a length.
    pub fn add_data_length_dependency(
        &mut self,
        ctx: &mut OrdinaryContext,
        space: SpaceId,
        ops: Vec<DataDef>,
        loctr: Option<Address>,
        range: Range,
    ) {
        let dependant = Dependant {
            target: DepTarget::Space(space),
            resolvable: Resolvable::DataLength(ops),
            loctr,
            stmt: None,
            range,
            waits_on: Vec::new(),
            done: false,
        };
        let deps = self.collect(&dependant, ctx);
        let idx = self.push(dependant);
        if deps.contains_dependencies() {
            self.park(idx, &deps);
        } else {
            let mut diags = Vec::new();
            self.apply(idx, ctx, &mut diags);
        }
    }

    /// Close `space` with the distance from `prev` to the aligned ORG
    /// target once it is computable.
    pub fn add_org_dependency(
        &mut self,
        ctx: &mut OrdinaryContext,
        space: SpaceId,
        expr: MachExpr,
        prev: Address,
        boundary: u32,
        offset: i32,
        loctr: Option<Address>,
        stmt: Option<RebuiltStatement>,
        range: Range,
    ) {
        let dependant = Dependant {
            target: DepTarget::Space(space),
            resolvable: Resolvable::OrgTarget {
                expr,
                prev,
                boundary,
                offset,
            },
            loctr,
            stmt,
            range,
            waits_on: Vec::new(),
            done: false,
        };
        let deps = self.collect(&dependant, ctx);
        let idx = self.push(dependant);
        if deps.contains_dependencies() {
            self.park(idx, &deps);
        } else {
            let mut diags = Vec::new();
            self.apply(idx, ctx, &mut diags);
        }
    }

    /// Park a statement whose operand expressions still have
    /// dependencies; it produces nothing, only finalization
    /// diagnostics when the dependencies never resolve.
    pub fn add_statement_check(
        &mut self,
        ctx: &OrdinaryContext,
        exprs: Vec<MachExpr>,
        loctr: Option<Address>,
        stmt: RebuiltStatement,
    ) {
        let range = stmt.range;
        let dependant = Dependant {
            target: DepTarget::Statement,
            resolvable: Resolvable::Check(exprs),
            loctr,
            stmt: Some(stmt),
            range,
            waits_on: Vec::new(),
            done: false,
        };
        let deps = self.collect(&dependant, ctx);
        if !deps.contains_dependencies() {
            return;
        }
        let idx = self.push(dependant);
        self.park(idx, &deps);
    }

    /// A key gained a value: re-check its waiters to fixed point.
    pub fn notify_defined(
        &mut self,
        key: DepKey,
        ctx: &mut OrdinaryContext,
        diags: &mut Vec<Diagnostic>,
    ) {
        self.ready.push_back(key);
        self.resolve_pending(ctx, diags);
    }

    /// Run the worklist until nothing more resolves.
    pub fn resolve_pending(&mut self, ctx: &mut OrdinaryContext, diags: &mut Vec<Diagnostic>) {
        while let Some(key) = self.ready.pop_front() {
            let waiters = self.waiters.swap_remove(&key).unwrap_or_default();
            for idx in waiters {
                if self.dependants[idx].done {
                    continue;
                }
                let deps = self.collect(&self.dependants[idx], ctx);
                if deps.contains_dependencies() {
                    self.park(idx, &deps);
                } else {
                    self.apply(idx, ctx, diags);
                }
            }
            for space in ctx.resolve_structural_spaces() {
                ctx.normalize_symbol_values();
                self.ready.push_back(DepKey::Space(space));
            }
        }
    }

    /// End-of-input pass: close remaining layout, run to fixed point,
    /// then report what is left in source order.
    pub fn finalize(
        &mut self,
        ctx: &mut OrdinaryContext,
        ids: &IdStorage,
        diags: &mut Vec<Diagnostic>,
    ) {
        loop {
            self.resolve_pending(ctx, diags);
            let mut progressed = false;
            for space in ctx.resolve_structural_spaces() {
                self.ready.push_back(DepKey::Space(space));
                progressed = true;
            }
            for space in ctx.finish_layout() {
                self.ready.push_back(DepKey::Space(space));
                progressed = true;
            }
            if progressed {
                ctx.normalize_symbol_values();
                continue;
            }
            if self.ready.is_empty() {
                break;
            }
        }

        for idx in 0..self.dependants.len() {
            if self.dependants[idx].done {
                continue;
            }
            let names: Vec<&str> = self.dependants[idx]
                .waits_on
                .iter()
                .filter_map(|key| match key {
                    DepKey::Symbol(id) => Some(ids.resolve(*id)),
                    DepKey::Space(_) => None,
                })
                .collect();
            let message = match (&self.dependants[idx].stmt, names.is_empty()) {
                (_, false) => format!("Unknown symbol: {}", names.join(", ")),
                (Some(stmt), true) => {
                    format!("{} statement has unresolved dependencies", stmt.opcode)
                }
                (None, true) => "statement has unresolved dependencies".to_string(),
            };
            diags.push(Diagnostic::error(
                "E010",
                message,
                self.dependants[idx].range,
            ));
            self.dependants[idx].done = true;
        }
        self.pending_symbols.clear();
        self.waiters.clear();
    }

    fn push(&mut self, dependant: Dependant) -> PostponedId {
        self.dependants.push(dependant);
        self.dependants.len() - 1
    }

    fn park(&mut self, idx: PostponedId, deps: &DependencySet) {
        let mut keys: Vec<DepKey> = deps
            .undefined_symbols
            .iter()
            .map(|id| DepKey::Symbol(*id))
            .collect();
        keys.extend(deps.unresolved_spaces.iter().map(|sp| DepKey::Space(*sp)));
        for key in &keys {
            let entry = self.waiters.entry(*key).or_default();
            if !entry.contains(&idx) {
                entry.push(idx);
            }
        }
        self.dependants[idx].waits_on = keys;
    }

    fn collect(&self, dependant: &Dependant, ctx: &OrdinaryContext) -> DependencySet {
        let view = ctx.view(dependant.loctr.clone());
        let mut deps = match &dependant.resolvable {
            Resolvable::Value(expr) | Resolvable::Attr(expr) => expr.collect_deps(&view),
            Resolvable::DataLength(ops) => {
                let mut deps = DependencySet::default();
                for op in ops {
                    deps.merge(op.length_deps(&view));
                    deps.merge(op.scale_deps(&view));
                }
                deps
            }
            Resolvable::OrgTarget { expr, prev, .. } => {
                let mut deps = expr.collect_deps(&view);
                if deps.undefined_symbols.is_empty() {
                    if let SymbolValue::Relocatable(target) = expr.evaluate_silent(&view) {
                        let diff = (&target - prev).normalized(&ctx.spaces);
                        let mut spaces = DependencySet::default();
                        for space in diff.unresolved_spaces(&ctx.spaces) {
                            spaces.unresolved_spaces.push(space);
                        }
                        deps.merge(spaces);
                    }
                }
                deps
            }
            Resolvable::Check(exprs) => {
                let mut deps = DependencySet::default();
                for expr in exprs {
                    deps.merge(expr.collect_deps(&view));
                }
                deps
            }
        };
        // Attribute patches never wait on their own symbol; that is
        // the documented self-reference pattern.
        if let DepTarget::SymbolAttr(id, _) = dependant.target {
            deps.undefined_symbols.retain(|sym| *sym != id);
        }
        deps
    }

    fn apply(&mut self, idx: PostponedId, ctx: &mut OrdinaryContext, diags: &mut Vec<Diagnostic>) {
        let dependant = &self.dependants[idx];
        let loctr = dependant.loctr.clone();
        let mut follow_up = Vec::new();
        match (&dependant.target, &dependant.resolvable) {
            (DepTarget::Symbol(id), Resolvable::Value(expr)) => {
                let value = {
                    let view = ctx.view(loctr);
                    expr.evaluate(&view, diags)
                };
                ctx.define_symbol_value(*id, value);
                follow_up.push(DepKey::Symbol(*id));
                self.pending_symbols.swap_remove(id);
            }
            (DepTarget::SymbolAttr(id, attr), Resolvable::Attr(expr)) => {
                let value = {
                    let view = ctx.view(loctr);
                    expr.evaluate_silent(&view)
                };
                if let SymbolValue::Absolute(raw) = value {
                    if let Some(sym) = ctx.get_symbol_mut(*id) {
                        match attr {
                            AttrKind::Length => {
                                if (0..=65535).contains(&raw) {
                                    sym.set_length(raw as u32);
                                }
                            }
                            AttrKind::Scale => sym.set_scale(raw),
                            _ => {}
                        }
                    }
                    follow_up.push(DepKey::Symbol(*id));
                }
            }
            (DepTarget::Space(space), Resolvable::DataLength(ops)) => {
                let length = {
                    let view = ctx.view(loctr);
                    operands_length(ops, &view)
                };
                if let Some(length) = length {
                    if ctx.spaces.resolve(*space, length as i32) {
                        ctx.normalize_symbol_values();
                        follow_up.push(DepKey::Space(*space));
                    }
                }
            }
            (
                DepTarget::Space(space),
                Resolvable::OrgTarget {
                    expr,
                    prev,
                    boundary,
                    offset,
                },
            ) => {
                let resolved = {
                    let view = ctx.view(loctr);
                    match expr.evaluate_silent(&view) {
                        SymbolValue::Relocatable(target) => {
                            let mut target = target.normalized(&ctx.spaces);
                            let gap = Alignment::bytes((*boundary).max(1))
                                .gap_from(target.offset());
                            target.add_offset(gap + offset);
                            let diff = (&target - prev).normalized(&ctx.spaces);
                            diff.is_absolute().then(|| diff.offset())
                        }
                        _ => None,
                    }
                };
                if let Some(length) = resolved {
                    if ctx.spaces.resolve(*space, length) {
                        ctx.normalize_symbol_values();
                        follow_up.push(DepKey::Space(*space));
                    }
                }
            }
            (DepTarget::Statement, Resolvable::Check(_)) => {}
            _ => {}
        }
        self.dependants[idx].done = true;
        self.dependants[idx].waits_on.clear();
        for key in follow_up {
            self.ready.push_back(key);
        }
    }

    /// Depth-first search over the pending subgraph: does `target`
    /// sit on a path reachable from `deps`? Returns the participants
    /// when it does.
    fn find_cycle(&self, target: Id, deps: &[Id]) -> Option<Vec<Id>> {
        let mut stack: Vec<Id> = Vec::new();
        let mut visited: Vec<Id> = Vec::new();
        for start in deps {
            stack.clear();
            if self.dfs(*start, target, &mut visited, &mut stack) {
                stack.push(target);
                return Some(stack);
            }
        }
        None
    }

    fn dfs(&self, current: Id, target: Id, visited: &mut Vec<Id>, stack: &mut Vec<Id>) -> bool {
        if current == target {
            return true;
        }
        if visited.contains(&current) {
            return false;
        }
        visited.push(current);
        stack.push(current);
        if let Some(idx) = self.pending_symbols.get(&current) {
            let next: Vec<Id> = self.dependants[*idx]
                .waits_on
                .iter()
                .filter_map(|key| match key {
                    DepKey::Symbol(id) => Some(*id),
                    DepKey::Space(_) => None,
                })
                .collect();
            for sym in next {
                if self.dfs(sym, target, visited, stack) {
                    return true;
                }
            }
        }
        stack.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::NO_ALIGN;
    use crate::core::symbol::{SymbolAttributes, SymbolValue};

    fn sym_expr(id: Id) -> MachExpr {
        MachExpr::Symbol(id, Range::default())
    }

    fn plus_one(id: Id) -> MachExpr {
        MachExpr::Binary {
            op: crate::core::expr::BinaryOp::Add,
            left: Box::new(sym_expr(id)),
            right: Box::new(MachExpr::Constant(1, Range::default())),
            range: Range::default(),
        }
    }

    #[test]
    fn lazy_symbol_resolves_on_definition() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let a = ids.add("A");
        let b = ids.add("B");

        ctx.create_symbol(a, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(solver.add_symbol_dependency(&mut ctx, a, plus_one(b), None, None, Range::default()));
        assert_eq!(solver.pending_count(), 1);

        ctx.create_symbol(b, SymbolValue::Absolute(4), SymbolAttributes::undefined(), Range::default());
        let mut diags = Vec::new();
        solver.notify_defined(DepKey::Symbol(b), &mut ctx, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(ctx.get_symbol(a).unwrap().value, SymbolValue::Absolute(5));
        assert_eq!(solver.pending_count(), 0);
    }

    #[test]
    fn chained_definitions_cascade() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let a = ids.add("A");
        let b = ids.add("B");
        let c = ids.add("C");

        ctx.create_symbol(a, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(solver.add_symbol_dependency(&mut ctx, a, plus_one(b), None, None, Range::default()));
        ctx.create_symbol(b, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(solver.add_symbol_dependency(&mut ctx, b, plus_one(c), None, None, Range::default()));

        ctx.create_symbol(c, SymbolValue::Absolute(1), SymbolAttributes::undefined(), Range::default());
        let mut diags = Vec::new();
        solver.notify_defined(DepKey::Symbol(c), &mut ctx, &mut diags);
        assert_eq!(ctx.get_symbol(b).unwrap().value, SymbolValue::Absolute(2));
        assert_eq!(ctx.get_symbol(a).unwrap().value, SymbolValue::Absolute(3));
    }

    #[test]
    fn two_symbol_cycle_detected_once() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let a = ids.add("A");
        let b = ids.add("B");

        ctx.create_symbol(a, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(solver.add_symbol_dependency(&mut ctx, a, plus_one(b), None, None, Range::default()));
        ctx.create_symbol(b, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(!solver.add_symbol_dependency(&mut ctx, b, plus_one(a), None, None, Range::default()));

        // Both stay undefined; the abandoned participants produce no
        // further diagnostics at finalization.
        let mut diags = Vec::new();
        solver.finalize(&mut ctx, &ids, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(ctx.get_symbol(a).unwrap().value, SymbolValue::Undefined);
        assert_eq!(ctx.get_symbol(b).unwrap().value, SymbolValue::Undefined);
    }

    #[test]
    fn self_cycle_detected() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let a = ids.add("A");
        ctx.create_symbol(a, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(!solver.add_symbol_dependency(&mut ctx, a, plus_one(a), None, None, Range::default()));
    }

    #[test]
    fn unresolved_symbol_reports_at_finalize() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let a = ids.add("A");
        let ghost = ids.add("GHOST");
        ctx.create_symbol(a, SymbolValue::Undefined, SymbolAttributes::undefined(), Range::default());
        assert!(solver.add_symbol_dependency(&mut ctx, a, plus_one(ghost), None, None, Range::default()));

        let mut diags = Vec::new();
        solver.finalize(&mut ctx, &ids, &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E010");
        assert!(diags[0].message.contains("GHOST"));
    }

    #[test]
    fn data_length_space_closes_when_symbol_defines() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let mut solver = DependencySolver::new();
        let len = ids.add("LEN");

        let space = ctx.register_ordinary_space(NO_ALIGN);
        let op = DataDef {
            type_char: 'X',
            type_ext: None,
            dup: None,
            length: Some(sym_expr(len)),
            scale: None,
            exponent: None,
            nominals: Vec::new(),
            range: Range::default(),
        };
        solver.add_data_length_dependency(&mut ctx, space, vec![op], None, Range::default());
        assert_eq!(solver.pending_count(), 1);

        ctx.create_symbol(len, SymbolValue::Absolute(12), SymbolAttributes::undefined(), Range::default());
        let mut diags = Vec::new();
        solver.notify_defined(DepKey::Symbol(len), &mut ctx, &mut diags);
        assert_eq!(ctx.spaces.get(space).length(), Some(12));
        assert_eq!(solver.pending_count(), 0);
    }
}
