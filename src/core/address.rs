// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Relocatable addresses and layout spaces.
//!
//! An address is an element of the free module over sections and
//! spaces: signed coefficients for each base and each space, plus an
//! integer offset. Two addresses in the same section subtract to an
//! absolute byte distance once every space between them has a length.
//!
//! Spaces are placeholders for byte extents that are not yet known: a
//! `DS` with an unresolved length expression, an alignment gap behind
//! such storage, the start of a secondary location counter, or an `ORG`
//! to a forward target. A space length is written exactly once;
//! addresses fold resolved spaces into their offset on normalization.

use std::ops::{Add, Neg, Sub};

/// Index of a section in the section registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub u32);

/// Index of a space in the space registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u32);

/// Alignment requirement: the location must satisfy
/// `loc ≡ byte (mod boundary)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub byte: u32,
    pub boundary: u32,
}

pub const NO_ALIGN: Alignment = Alignment { byte: 0, boundary: 1 };
pub const HALFWORD: Alignment = Alignment { byte: 0, boundary: 2 };
pub const FULLWORD: Alignment = Alignment { byte: 0, boundary: 4 };
pub const DOUBLEWORD: Alignment = Alignment { byte: 0, boundary: 8 };

impl Alignment {
    pub fn bytes(boundary: u32) -> Self {
        Self { byte: 0, boundary }
    }

    /// Gap from `offset` to the next conforming location.
    pub fn gap_from(self, offset: i32) -> i32 {
        if self.boundary <= 1 {
            return 0;
        }
        let boundary = self.boundary as i64;
        let target = self.byte as i64 % boundary;
        let rem = (offset as i64).rem_euclid(boundary);
        ((target - rem).rem_euclid(boundary)) as i32
    }
}

/// What a space stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Storage of unknown length (postponed data definition).
    Ordinary,
    /// Alignment gap behind storage of unknown length.
    Alignment,
    /// Start of a location counter other than the first one.
    LoctrBegin,
    /// Gap created by ORG to a not-yet-computable target.
    LoctrSet,
}

#[derive(Debug, Clone)]
pub struct Space {
    pub kind: SpaceKind,
    pub section: SectionId,
    pub counter: u32,
    pub align: Alignment,
    /// Concrete offset of the owning counter when the space was
    /// created; used to resolve alignment gaps.
    pub offset_at_creation: i32,
    length: Option<i32>,
}

impl Space {
    pub fn length(&self) -> Option<i32> {
        self.length
    }

    pub fn is_resolved(&self) -> bool {
        self.length.is_some()
    }
}

/// Owning registry for spaces. Addresses refer to spaces by id only.
#[derive(Debug, Default)]
pub struct SpaceRegistry {
    spaces: Vec<Space>,
}

impl SpaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        kind: SpaceKind,
        section: SectionId,
        counter: u32,
        align: Alignment,
        offset_at_creation: i32,
    ) -> SpaceId {
        let id = SpaceId(self.spaces.len() as u32);
        self.spaces.push(Space {
            kind,
            section,
            counter,
            align,
            offset_at_creation,
            length: None,
        });
        id
    }

    pub fn get(&self, id: SpaceId) -> &Space {
        &self.spaces[id.0 as usize]
    }

    /// Assign the final length. Returns false when the space was
    /// already resolved; lengths are write-once.
    pub fn resolve(&mut self, id: SpaceId, length: i32) -> bool {
        let space = &mut self.spaces[id.0 as usize];
        if space.length.is_some() {
            return false;
        }
        space.length = Some(length);
        true
    }

    pub fn is_resolved(&self, id: SpaceId) -> bool {
        self.get(id).is_resolved()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

/// Relocatable address: signed base and space coefficients plus offset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    bases: Vec<(SectionId, i32)>,
    spaces: Vec<(SpaceId, i32)>,
    offset: i32,
}

fn merge<K: Copy + Ord>(lhs: &[(K, i32)], rhs: &[(K, i32)], rhs_sign: i32) -> Vec<(K, i32)> {
    let mut out = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() || j < rhs.len() {
        let take_left = match (lhs.get(i), rhs.get(j)) {
            (Some(l), Some(r)) => l.0 <= r.0,
            (Some(_), None) => true,
            _ => false,
        };
        if take_left {
            let (key, coeff) = lhs[i];
            i += 1;
            let mut total = coeff;
            if j < rhs.len() && rhs[j].0 == key {
                total += rhs_sign * rhs[j].1;
                j += 1;
            }
            if total != 0 {
                out.push((key, total));
            }
        } else {
            let (key, coeff) = rhs[j];
            j += 1;
            let total = rhs_sign * coeff;
            if total != 0 {
                out.push((key, total));
            }
        }
    }
    out
}

impl Address {
    /// Origin of a section.
    pub fn section_origin(section: SectionId) -> Self {
        Self {
            bases: vec![(section, 1)],
            spaces: Vec::new(),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn bases(&self) -> &[(SectionId, i32)] {
        &self.bases
    }

    pub fn spaces(&self) -> &[(SpaceId, i32)] {
        &self.spaces
    }

    pub fn add_offset(&mut self, bytes: i32) {
        self.offset = self.offset.wrapping_add(bytes);
    }

    pub fn append_space(&mut self, space: SpaceId) {
        self.spaces = merge(&self.spaces, &[(space, 1)], 1);
    }

    /// No bases and no spaces left; the offset is a plain number.
    pub fn is_absolute(&self) -> bool {
        self.bases.is_empty() && self.spaces.is_empty()
    }

    /// Exactly one base with coefficient one and no spaces.
    pub fn is_simply_relocatable(&self) -> bool {
        self.spaces.is_empty() && self.bases.len() == 1 && self.bases[0].1 == 1
    }

    pub fn single_base(&self) -> Option<SectionId> {
        if self.is_simply_relocatable() {
            Some(self.bases[0].0)
        } else {
            None
        }
    }

    pub fn has_unresolved_spaces(&self, registry: &SpaceRegistry) -> bool {
        self.spaces.iter().any(|(id, _)| !registry.is_resolved(*id))
    }

    pub fn unresolved_spaces<'a>(
        &'a self,
        registry: &'a SpaceRegistry,
    ) -> impl Iterator<Item = SpaceId> + 'a {
        self.spaces
            .iter()
            .filter(|(id, _)| !registry.is_resolved(*id))
            .map(|(id, _)| *id)
    }

    /// Fold every resolved space into the offset.
    pub fn normalize(&mut self, registry: &SpaceRegistry) {
        if self.spaces.is_empty() {
            return;
        }
        let mut folded = 0i64;
        self.spaces.retain(|(id, coeff)| match registry.get(*id).length() {
            Some(len) => {
                folded += *coeff as i64 * len as i64;
                false
            }
            None => true,
        });
        self.offset = self.offset.wrapping_add(folded as i32);
    }

    pub fn normalized(mut self, registry: &SpaceRegistry) -> Self {
        self.normalize(registry);
        self
    }
}

impl Add for &Address {
    type Output = Address;

    fn add(self, rhs: &Address) -> Address {
        Address {
            bases: merge(&self.bases, &rhs.bases, 1),
            spaces: merge(&self.spaces, &rhs.spaces, 1),
            offset: self.offset.wrapping_add(rhs.offset),
        }
    }
}

impl Sub for &Address {
    type Output = Address;

    fn sub(self, rhs: &Address) -> Address {
        Address {
            bases: merge(&self.bases, &rhs.bases, -1),
            spaces: merge(&self.spaces, &rhs.spaces, -1),
            offset: self.offset.wrapping_sub(rhs.offset),
        }
    }
}

impl Neg for &Address {
    type Output = Address;

    fn neg(self) -> Address {
        Address {
            bases: self.bases.iter().map(|(k, c)| (*k, -c)).collect(),
            spaces: self.spaces.iter().map(|(k, c)| (*k, -c)).collect(),
            offset: self.offset.wrapping_neg(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(section: u32, offset: i32) -> Address {
        Address::section_origin(SectionId(section)).with_offset(offset)
    }

    #[test]
    fn same_section_difference_is_absolute() {
        let a = addr(0, 8);
        let b = addr(0, 20);
        let diff = &b - &a;
        assert!(diff.is_absolute());
        assert_eq!(diff.offset(), 12);
    }

    #[test]
    fn cross_section_difference_is_not_absolute() {
        let a = addr(0, 8);
        let b = addr(1, 8);
        let diff = &b - &a;
        assert!(!diff.is_absolute());
        assert!(!diff.is_simply_relocatable());
    }

    #[test]
    fn spaces_cancel_in_subtraction() {
        let mut registry = SpaceRegistry::new();
        let sp = registry.create(SpaceKind::Ordinary, SectionId(0), 0, NO_ALIGN, 0);
        let mut a = addr(0, 0);
        a.append_space(sp);
        let mut b = a.clone();
        b.add_offset(5);
        let diff = &b - &a;
        assert!(diff.is_absolute());
        assert_eq!(diff.offset(), 5);
    }

    #[test]
    fn normalize_folds_resolved_spaces() {
        let mut registry = SpaceRegistry::new();
        let sp = registry.create(SpaceKind::Ordinary, SectionId(0), 0, NO_ALIGN, 0);
        let mut a = addr(0, 4);
        a.append_space(sp);
        assert!(a.has_unresolved_spaces(&registry));

        assert!(registry.resolve(sp, 10));
        a.normalize(&registry);
        assert!(a.spaces().is_empty());
        assert_eq!(a.offset(), 14);
        assert!(a.is_simply_relocatable());
    }

    #[test]
    fn space_length_is_write_once() {
        let mut registry = SpaceRegistry::new();
        let sp = registry.create(SpaceKind::Ordinary, SectionId(0), 0, NO_ALIGN, 0);
        assert!(registry.resolve(sp, 3));
        assert!(!registry.resolve(sp, 4));
        assert_eq!(registry.get(sp).length(), Some(3));
    }

    #[test]
    fn alignment_gap() {
        assert_eq!(DOUBLEWORD.gap_from(0), 0);
        assert_eq!(DOUBLEWORD.gap_from(1), 7);
        assert_eq!(DOUBLEWORD.gap_from(8), 0);
        assert_eq!(HALFWORD.gap_from(5), 1);
        assert_eq!(NO_ALIGN.gap_from(3), 0);
        // CNOP-style mid-word target: loc ≡ 2 (mod 4).
        let mid = Alignment { byte: 2, boundary: 4 };
        assert_eq!(mid.gap_from(0), 2);
        assert_eq!(mid.gap_from(2), 0);
        assert_eq!(mid.gap_from(3), 3);
    }

    proptest! {
        #[test]
        fn add_then_subtract_round_trips(
            sect in 0u32..4,
            off_a in -1000i32..1000,
            off_b in -1000i32..1000,
        ) {
            let a = addr(sect, off_a);
            let b = addr(sect, off_b);
            let sum = &a + &b;
            let back = &sum - &b;
            prop_assert_eq!(back, a);
        }

        #[test]
        fn distance_matches_offset_delta(
            sect in 0u32..4,
            off_a in -1000i32..1000,
            delta in 0i32..1000,
        ) {
            let a = addr(sect, off_a);
            let b = addr(sect, off_a + delta);
            let diff = &b - &a;
            prop_assert!(diff.is_absolute());
            prop_assert_eq!(diff.offset(), delta);
        }

        #[test]
        fn negation_is_involutive(sect in 0u32..4, off in -1000i32..1000) {
            let a = addr(sect, off);
            prop_assert_eq!(-&-&a, a);
        }
    }
}
