// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Ordinary-assembly context: the symbol table, the section registry,
//! the space registry and the literal pool, owned together so layout
//! operations can move between them without back-pointers.

use indexmap::IndexMap;

use crate::core::address::{Address, Alignment, SectionId, SpaceId, SpaceKind, SpaceRegistry};
use crate::core::diagnostics::Range;
use crate::core::expr::{SolverView, SymbolLookup};
use crate::core::ids::Id;
use crate::core::literals::LiteralPool;
use crate::core::section::{Section, SectionKind};
use crate::core::symbol::{Symbol, SymbolAttributes, SymbolValue};

/// What a name in the symbol table stands for.
#[derive(Debug)]
enum SymbolEntry {
    Symbol(Symbol),
    /// Mentioned inside a macro definition; not an ordinary symbol yet.
    MacroLabel,
    /// Name bound by a labeled USING.
    UsingLabel,
}

#[derive(Debug, Default)]
pub struct OrdinaryContext {
    symbols: IndexMap<Id, SymbolEntry>,
    sections: Vec<Section>,
    curr_section: Option<usize>,
    pub spaces: SpaceRegistry,
    pub literals: LiteralPool,
}

impl OrdinaryContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_private_section(&mut self) -> usize {
        let id = SectionId(self.sections.len() as u32);
        self.sections
            .push(Section::new(Id::EMPTY, SectionKind::Executable, id));
        let idx = self.sections.len() - 1;
        self.curr_section = Some(idx);
        idx
    }

    pub fn ensure_section(&mut self) -> &mut Section {
        let idx = match self.curr_section {
            Some(idx) => idx,
            None => self.create_private_section(),
        };
        &mut self.sections[idx]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn current_section(&self) -> Option<&Section> {
        self.curr_section.map(|idx| &self.sections[idx])
    }

    pub fn section_defined(&self, name: Id, kind: SectionKind) -> bool {
        self.sections
            .iter()
            .any(|sect| sect.name == name && sect.kind == kind)
    }

    pub fn counter_defined(&self, name: Id) -> bool {
        self.sections.iter().any(|sect| sect.counter_defined(name))
    }

    /// Create or switch to the section `(name, kind)`. When this
    /// defines a new named section, the section-name symbol is created
    /// and returned so the caller can notify the dependency solver.
    pub fn set_section(&mut self, name: Id, kind: SectionKind, range: Range) -> Option<Id> {
        if let Some(idx) = self
            .sections
            .iter()
            .position(|sect| sect.name == name && sect.kind == kind)
        {
            self.curr_section = Some(idx);
            return None;
        }
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(Section::new(name, kind, id));
        self.curr_section = Some(self.sections.len() - 1);
        if name.is_empty() {
            return None;
        }
        let origin = self.sections[self.curr_section.expect("section created above")].current_address();
        self.insert_symbol(Symbol::new(
            name,
            SymbolValue::Relocatable(origin),
            SymbolAttributes::section(),
            range,
        ));
        Some(name)
    }

    /// EXTRN/WXTRN target: a section of external kind plus a symbol
    /// valued at its origin.
    pub fn create_external_section(&mut self, name: Id, kind: SectionKind, range: Range) {
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(Section::new(name, kind, id));
        let origin = self.sections.last().expect("just pushed").current_address();
        let attrs = match kind {
            SectionKind::WeakExternal => SymbolAttributes::wxtrn(),
            _ => SymbolAttributes::extrn(),
        };
        self.insert_symbol(Symbol::new(
            name,
            SymbolValue::Relocatable(origin),
            attrs,
            range,
        ));
    }

    /// Switch to (or create) the named location counter; searches all
    /// sections since LOCTR returns to the owning section. A new
    /// counter defines the counter-name symbol.
    pub fn set_location_counter(&mut self, name: Id, range: Range) -> Option<Id> {
        self.ensure_section();
        if let Some(idx) = self
            .sections
            .iter()
            .position(|sect| sect.counter_defined(name))
        {
            self.curr_section = Some(idx);
            self.sections[idx].set_location_counter(name, &mut self.spaces);
            return None;
        }
        let idx = self.curr_section.expect("ensured above");
        self.sections[idx].set_location_counter(name, &mut self.spaces);
        let addr = self.sections[idx].current_address();
        self.insert_symbol(Symbol::new(
            name,
            SymbolValue::Relocatable(addr),
            SymbolAttributes::section(),
            range,
        ));
        Some(name)
    }

    pub fn symbol_defined(&self, name: Id) -> bool {
        matches!(
            self.symbols.get(&name),
            Some(SymbolEntry::Symbol(_) | SymbolEntry::UsingLabel)
        )
    }

    pub fn is_using_label(&self, name: Id) -> bool {
        matches!(self.symbols.get(&name), Some(SymbolEntry::UsingLabel))
    }

    pub fn register_using_label(&mut self, name: Id) {
        self.symbols.insert(name, SymbolEntry::UsingLabel);
    }

    /// A macro definition mentioned the name; keeps the slot warm
    /// without making it an ordinary symbol.
    pub fn mention_macro_label(&mut self, name: Id) {
        self.symbols.entry(name).or_insert(SymbolEntry::MacroLabel);
    }

    pub fn get_symbol(&self, name: Id) -> Option<&Symbol> {
        match self.symbols.get(&name) {
            Some(SymbolEntry::Symbol(sym)) => Some(sym),
            _ => None,
        }
    }

    pub fn get_symbol_mut(&mut self, name: Id) -> Option<&mut Symbol> {
        match self.symbols.get_mut(&name) {
            Some(SymbolEntry::Symbol(sym)) => Some(sym),
            _ => None,
        }
    }

    /// All ordinary symbols in definition order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().filter_map(|entry| match entry {
            SymbolEntry::Symbol(sym) => Some(sym),
            _ => None,
        })
    }

    /// Insert a symbol; the caller has verified the name is free.
    pub fn create_symbol(
        &mut self,
        name: Id,
        value: SymbolValue,
        attrs: SymbolAttributes,
        range: Range,
    ) {
        let value = self.normalize_value(value);
        self.insert_symbol(Symbol::new(name, value, attrs, range));
    }

    /// Late definition of a symbol created with an `Undefined` value.
    pub fn define_symbol_value(&mut self, name: Id, value: SymbolValue) {
        let value = self.normalize_value(value);
        if let Some(SymbolEntry::Symbol(sym)) = self.symbols.get_mut(&name) {
            if !sym.value.is_defined() {
                sym.value = value;
            }
        }
    }

    fn insert_symbol(&mut self, sym: Symbol) {
        self.symbols.insert(sym.name, SymbolEntry::Symbol(sym));
    }

    fn normalize_value(&self, value: SymbolValue) -> SymbolValue {
        match value {
            SymbolValue::Relocatable(addr) => {
                let addr = addr.normalized(&self.spaces);
                if addr.is_absolute() {
                    SymbolValue::Absolute(addr.offset())
                } else {
                    SymbolValue::Relocatable(addr)
                }
            }
            other => other,
        }
    }

    pub fn current_address(&mut self) -> Address {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        self.sections[idx]
            .current_address()
            .normalized(&self.spaces)
    }

    /// Reserve `length` bytes at `align` in the current counter.
    pub fn reserve_storage_area(
        &mut self,
        length: i32,
        align: Alignment,
    ) -> (Address, Option<SpaceId>) {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        let section_id = self.sections[idx].id;
        let (addr, space) = self.sections[idx].current_counter_mut().reserve(
            section_id,
            &mut self.spaces,
            length,
            align,
        );
        (addr.normalized(&self.spaces), space)
    }

    pub fn align(&mut self, align: Alignment) -> Address {
        self.reserve_storage_area(0, align).0
    }

    pub fn register_ordinary_space(&mut self, align: Alignment) -> SpaceId {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        let section_id = self.sections[idx].id;
        self.sections[idx].current_counter_mut().register_ordinary_space(
            section_id,
            &mut self.spaces,
            align,
        )
    }

    /// ORG with a computable distance from the current location.
    pub fn org_by(&mut self, delta: i32) {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        self.sections[idx].current_counter_mut().jump(delta);
    }

    /// ORG to a target that is not computable yet.
    pub fn org_space(&mut self, align: Alignment) -> SpaceId {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        let section_id = self.sections[idx].id;
        self.sections[idx]
            .current_counter_mut()
            .jump_space(section_id, &mut self.spaces, align)
    }

    /// ORG with no operands: back to the highest location used.
    pub fn set_available_location_counter_value(&mut self) {
        self.ensure_section();
        let idx = self.curr_section.expect("ensured above");
        self.sections[idx].current_counter_mut().restore_available();
    }

    /// Close alignment gaps whose predecessors are all resolved.
    /// Returns the spaces closed; callers feed them to the solver.
    pub fn resolve_structural_spaces(&mut self) -> Vec<SpaceId> {
        let mut closed = Vec::new();
        for sect in &self.sections {
            for counter in sect.counters() {
                let mut prefix_len = Some(0i64);
                for slot in counter.slots() {
                    let space = self.spaces.get(*slot);
                    match space.length() {
                        Some(len) => {
                            if let Some(total) = prefix_len {
                                prefix_len = Some(total + len as i64);
                            }
                        }
                        None => {
                            if space.kind == SpaceKind::Alignment {
                                if let Some(total) = prefix_len {
                                    let pos = space.offset_at_creation as i64 + total;
                                    let gap = space.align.gap_from(pos as i32);
                                    closed.push((*slot, gap));
                                    prefix_len = Some(total + gap as i64);
                                    continue;
                                }
                            }
                            prefix_len = None;
                        }
                    }
                }
            }
        }
        let mut out = Vec::with_capacity(closed.len());
        for (space, gap) in closed {
            if self.spaces.resolve(space, gap) {
                out.push(space);
            }
        }
        out
    }

    /// Concatenate location counters: close each begin space with the
    /// aligned extent of the counters before it. Stops per section at
    /// the first counter that still has unresolved spaces.
    pub fn finish_layout(&mut self) -> Vec<SpaceId> {
        let mut closed = Vec::new();
        for sect in &self.sections {
            let mut cumulative = 0i64;
            for counter in sect.counters() {
                if let Some(begin) = counter.begin_space() {
                    match self.spaces.get(begin).length() {
                        Some(len) => cumulative = len as i64,
                        None => {
                            // Counters start on a doubleword.
                            let aligned = (cumulative + 7) & !7;
                            closed.push((begin, aligned as i32));
                            cumulative = aligned;
                        }
                    }
                }
                match counter.storage(&self.spaces) {
                    Some(extent) => cumulative += extent as i64,
                    None => break,
                }
            }
        }
        let mut out = Vec::with_capacity(closed.len());
        for (space, len) in closed {
            if self.spaces.resolve(space, len) {
                out.push(space);
            }
        }
        out
    }

    /// Fold newly resolved spaces into stored symbol values.
    pub fn normalize_symbol_values(&mut self) {
        let spaces = &self.spaces;
        for entry in self.symbols.values_mut() {
            if let SymbolEntry::Symbol(sym) = entry {
                if let SymbolValue::Relocatable(addr) = &mut sym.value {
                    addr.normalize(spaces);
                }
            }
        }
    }

    /// Evaluator view over this context with an optional current
    /// location.
    pub fn view(&self, loctr: Option<Address>) -> OrdinaryView<'_> {
        OrdinaryView { ctx: self, loctr }
    }
}

pub struct OrdinaryView<'a> {
    ctx: &'a OrdinaryContext,
    loctr: Option<Address>,
}

impl SolverView for OrdinaryView<'_> {
    fn lookup(&self, id: Id) -> SymbolLookup<'_> {
        match self.ctx.symbols.get(&id) {
            Some(SymbolEntry::Symbol(sym)) => SymbolLookup::Defined(sym),
            Some(SymbolEntry::MacroLabel) | Some(SymbolEntry::UsingLabel) => {
                SymbolLookup::Undefined
            }
            None => SymbolLookup::Unknown,
        }
    }

    fn loctr(&self) -> Option<&Address> {
        self.loctr.as_ref()
    }

    fn literal_symbol(&self, text: &str) -> Option<Id> {
        self.ctx.literals.lookup(text)
    }

    fn spaces(&self) -> &SpaceRegistry {
        &self.ctx.spaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::{FULLWORD, NO_ALIGN};
    use crate::core::ids::IdStorage;

    #[test]
    fn private_section_appears_on_first_use() {
        let mut ctx = OrdinaryContext::new();
        assert!(ctx.current_section().is_none());
        let addr = ctx.current_address();
        assert!(addr.is_simply_relocatable());
        assert_eq!(ctx.sections().len(), 1);
        assert!(ctx.sections()[0].name.is_empty());
    }

    #[test]
    fn named_section_defines_symbol() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let name = ids.add("CODE");
        let defined = ctx.set_section(name, SectionKind::Executable, Range::default());
        assert_eq!(defined, Some(name));
        assert!(ctx.symbol_defined(name));
        // Switching back to the same section defines nothing new.
        assert_eq!(
            ctx.set_section(name, SectionKind::Executable, Range::default()),
            None
        );
    }

    #[test]
    fn reserve_then_distance() {
        let mut ctx = OrdinaryContext::new();
        let (start, _) = ctx.reserve_storage_area(6, NO_ALIGN);
        let (next, _) = ctx.reserve_storage_area(4, NO_ALIGN);
        let diff = &next - &start;
        assert!(diff.is_absolute());
        assert_eq!(diff.offset(), 6);
    }

    #[test]
    fn structural_alignment_resolves_behind_closed_space() {
        let mut ctx = OrdinaryContext::new();
        ctx.reserve_storage_area(1, NO_ALIGN);
        let open = ctx.register_ordinary_space(NO_ALIGN);
        let (_, align_space) = ctx.reserve_storage_area(4, FULLWORD);
        let align_space = align_space.expect("alignment space behind open space");

        assert!(ctx.resolve_structural_spaces().is_empty());
        assert!(ctx.spaces.resolve(open, 2));
        let closed = ctx.resolve_structural_spaces();
        assert_eq!(closed, vec![align_space]);
        // offset 1 + length 2 = 3, fullword gap = 1.
        assert_eq!(ctx.spaces.get(align_space).length(), Some(1));
    }

    #[test]
    fn finish_layout_closes_counter_begins() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        ctx.reserve_storage_area(10, NO_ALIGN);
        let aux = ids.add("AUX");
        ctx.set_location_counter(aux, Range::default());
        ctx.reserve_storage_area(2, NO_ALIGN);
        let closed = ctx.finish_layout();
        assert_eq!(closed.len(), 1);
        // 10 rounded up to a doubleword.
        assert_eq!(ctx.spaces.get(closed[0]).length(), Some(16));
    }

    #[test]
    fn using_labels_shadow_symbols() {
        let mut ids = IdStorage::new();
        let mut ctx = OrdinaryContext::new();
        let name = ids.add("MAP");
        ctx.register_using_label(name);
        assert!(ctx.symbol_defined(name));
        assert!(ctx.is_using_label(name));
        assert!(ctx.get_symbol(name).is_none());
    }
}
