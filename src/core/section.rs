// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Sections and location counters.
//!
//! A section owns an ordered list of location counters; the counters
//! are concatenated in source order when the module layout finishes.
//! Each counter tracks the concrete bytes it has reserved plus the
//! spaces opened inside it; its current location is the section base
//! plus every space opened so far plus the concrete offset.

use crate::core::address::{Address, Alignment, SpaceId, SpaceKind, SpaceRegistry, SectionId, DOUBLEWORD};
use crate::core::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Executable,
    Readonly,
    Common,
    Dummy,
    External,
    WeakExternal,
}

impl SectionKind {
    /// Kinds that compete for a symbol name as a control section.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            SectionKind::Executable | SectionKind::Readonly | SectionKind::Common
        )
    }
}

#[derive(Debug)]
pub struct LocationCounter {
    pub name: Id,
    /// Ordinal of this counter within its section.
    pub ordinal: u32,
    /// Space standing for this counter's start; `None` for the first
    /// counter, whose start is the section origin.
    begin_space: Option<SpaceId>,
    /// Spaces opened in this counter, in creation order.
    slots: Vec<SpaceId>,
    /// Concrete bytes reserved outside spaces, relative to the counter
    /// start. May move backward under ORG; never below zero.
    offset: i32,
    /// Maximum concrete offset ever reached. Restored by ORG with no
    /// operands; the reserved extent of the counter.
    high_water: i32,
}

impl LocationCounter {
    fn new(name: Id, ordinal: u32, begin_space: Option<SpaceId>) -> Self {
        Self {
            name,
            ordinal,
            begin_space,
            slots: Vec::new(),
            offset: 0,
            high_water: 0,
        }
    }

    pub fn current_offset(&self) -> i32 {
        self.offset
    }

    pub fn high_water(&self) -> i32 {
        self.high_water
    }

    pub fn begin_space(&self) -> Option<SpaceId> {
        self.begin_space
    }

    pub fn slots(&self) -> &[SpaceId] {
        &self.slots
    }

    pub fn current_address(&self, section: SectionId) -> Address {
        let mut addr = Address::section_origin(section);
        if let Some(begin) = self.begin_space {
            addr.append_space(begin);
        }
        for slot in &self.slots {
            addr.append_space(*slot);
        }
        addr.add_offset(self.offset);
        addr
    }

    pub fn has_unresolved_spaces(&self, registry: &SpaceRegistry) -> bool {
        self.begin_space
            .iter()
            .chain(self.slots.iter())
            .any(|id| !registry.is_resolved(*id))
    }

    fn has_unresolved_slots(&self, registry: &SpaceRegistry) -> bool {
        self.slots.iter().any(|id| !registry.is_resolved(*id))
    }

    /// Reserve `length` bytes aligned to `align`. Returns the address
    /// where the storage begins and the alignment space when the gap
    /// could not be computed yet.
    pub fn reserve(
        &mut self,
        section: SectionId,
        registry: &mut SpaceRegistry,
        length: i32,
        align: Alignment,
    ) -> (Address, Option<SpaceId>) {
        let mut created = None;
        if align.boundary > 1 {
            if self.has_unresolved_slots(registry) {
                let space = registry.create(
                    SpaceKind::Alignment,
                    section,
                    self.ordinal,
                    align,
                    self.offset,
                );
                self.slots.push(space);
                created = Some(space);
            } else {
                self.offset += align.gap_from(self.offset);
                self.bump_high_water();
            }
        }
        let addr = self.current_address(section);
        self.offset += length;
        self.bump_high_water();
        (addr, created)
    }

    /// Open a space for storage whose length is not known yet.
    pub fn register_ordinary_space(
        &mut self,
        section: SectionId,
        registry: &mut SpaceRegistry,
        align: Alignment,
    ) -> SpaceId {
        let space = registry.create(
            SpaceKind::Ordinary,
            section,
            self.ordinal,
            align,
            self.offset,
        );
        self.slots.push(space);
        space
    }

    /// ORG to a target whose distance from the current location is
    /// known: move the concrete offset by `delta`.
    pub fn jump(&mut self, delta: i32) {
        self.offset += delta;
        self.bump_high_water();
    }

    /// ORG to a target that cannot be computed yet: open a gap space
    /// that the dependency solver will close with the signed distance.
    pub fn jump_space(
        &mut self,
        section: SectionId,
        registry: &mut SpaceRegistry,
        align: Alignment,
    ) -> SpaceId {
        let space = registry.create(
            SpaceKind::LoctrSet,
            section,
            self.ordinal,
            align,
            self.offset,
        );
        self.slots.push(space);
        space
    }

    /// ORG with no operands: restore the maximum location reached.
    pub fn restore_available(&mut self) {
        self.offset = self.high_water;
    }

    /// Total extent once every space has a length.
    pub fn storage(&self, registry: &SpaceRegistry) -> Option<i32> {
        let mut total = self.high_water;
        for slot in &self.slots {
            total += registry.get(*slot).length()?;
        }
        Some(total)
    }

    fn bump_high_water(&mut self) {
        if self.offset > self.high_water {
            self.high_water = self.offset;
        }
    }
}

#[derive(Debug)]
pub struct Section {
    pub name: Id,
    pub kind: SectionKind,
    pub id: SectionId,
    counters: Vec<LocationCounter>,
    current: usize,
}

impl Section {
    pub fn new(name: Id, kind: SectionKind, id: SectionId) -> Self {
        Self {
            name,
            kind,
            id,
            counters: vec![LocationCounter::new(Id::EMPTY, 0, None)],
            current: 0,
        }
    }

    pub fn counters(&self) -> &[LocationCounter] {
        &self.counters
    }

    pub fn counter_defined(&self, name: Id) -> bool {
        self.counters.iter().any(|counter| counter.name == name)
    }

    /// Switch to (or create) the named location counter. A new counter
    /// starts behind every earlier one; its start is a space closed
    /// when the layout finishes.
    pub fn set_location_counter(&mut self, name: Id, registry: &mut SpaceRegistry) {
        if let Some(idx) = self
            .counters
            .iter()
            .position(|counter| counter.name == name)
        {
            self.current = idx;
            return;
        }
        let ordinal = self.counters.len() as u32;
        let begin = registry.create(SpaceKind::LoctrBegin, self.id, ordinal, DOUBLEWORD, 0);
        self.counters
            .push(LocationCounter::new(name, ordinal, Some(begin)));
        self.current = self.counters.len() - 1;
    }

    pub fn current_counter(&self) -> &LocationCounter {
        &self.counters[self.current]
    }

    pub fn current_counter_mut(&mut self) -> &mut LocationCounter {
        &mut self.counters[self.current]
    }

    pub fn current_address(&self) -> Address {
        self.current_counter().current_address(self.id)
    }

    pub fn has_unresolved_spaces(&self, registry: &SpaceRegistry) -> bool {
        self.counters
            .iter()
            .any(|counter| counter.has_unresolved_spaces(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::{FULLWORD, NO_ALIGN};

    fn section() -> (Section, SpaceRegistry) {
        (
            Section::new(Id::EMPTY, SectionKind::Executable, SectionId(0)),
            SpaceRegistry::new(),
        )
    }

    #[test]
    fn reserve_advances_offset() {
        let (mut sect, mut registry) = section();
        let id = sect.id;
        let (addr, space) = sect
            .current_counter_mut()
            .reserve(id, &mut registry, 5, NO_ALIGN);
        assert!(space.is_none());
        assert_eq!(addr.offset(), 0);
        assert_eq!(sect.current_counter().current_offset(), 5);
    }

    #[test]
    fn alignment_is_concrete_without_open_spaces() {
        let (mut sect, mut registry) = section();
        let id = sect.id;
        sect.current_counter_mut()
            .reserve(id, &mut registry, 3, NO_ALIGN);
        let (addr, space) = sect
            .current_counter_mut()
            .reserve(id, &mut registry, 4, FULLWORD);
        assert!(space.is_none());
        assert_eq!(addr.offset(), 4);
        assert_eq!(sect.current_counter().current_offset(), 8);
    }

    #[test]
    fn alignment_behind_open_space_creates_space() {
        let (mut sect, mut registry) = section();
        let id = sect.id;
        sect.current_counter_mut()
            .register_ordinary_space(id, &mut registry, NO_ALIGN);
        let (addr, space) = sect
            .current_counter_mut()
            .reserve(id, &mut registry, 4, FULLWORD);
        assert!(space.is_some());
        assert!(addr.has_unresolved_spaces(&registry));
    }

    #[test]
    fn org_restores_high_water() {
        let (mut sect, mut registry) = section();
        let id = sect.id;
        sect.current_counter_mut()
            .reserve(id, &mut registry, 16, NO_ALIGN);
        sect.current_counter_mut().jump(-10);
        assert_eq!(sect.current_counter().current_offset(), 6);
        sect.current_counter_mut().restore_available();
        assert_eq!(sect.current_counter().current_offset(), 16);
    }

    #[test]
    fn reserved_extent_never_decreases() {
        let (mut sect, mut registry) = section();
        let id = sect.id;
        sect.current_counter_mut()
            .reserve(id, &mut registry, 16, NO_ALIGN);
        sect.current_counter_mut().jump(-16);
        sect.current_counter_mut()
            .reserve(id, &mut registry, 4, NO_ALIGN);
        assert_eq!(sect.current_counter().storage(&registry), Some(16));
    }

    #[test]
    fn secondary_counter_opens_begin_space() {
        let (mut sect, mut registry) = section();
        let mut ids = crate::core::ids::IdStorage::new();
        let name = ids.add("AUX");
        sect.set_location_counter(name, &mut registry);
        assert!(sect.current_counter().begin_space().is_some());
        assert!(sect.current_address().has_unresolved_spaces(&registry));
        // Switching back needs no new space.
        sect.set_location_counter(Id::EMPTY, &mut registry);
        assert!(sect.current_counter().begin_space().is_none());
    }
}
