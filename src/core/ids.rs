// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Identifier interning for ordinary symbols.
//!
//! Every symbol name is folded to ASCII upper case and interned into a
//! per-analyzer table, so the rest of the crate compares cheap `Id`
//! tokens instead of strings. Literal names (`=F'1'`) and sequence
//! symbols (`.LOOP`) share the same table; only ordinary-symbol
//! interning applies the HLASM naming rules.

use std::fmt;

use indexmap::IndexSet;

/// Interned identifier. Equality is index equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);

impl Id {
    /// Sentinel meaning "no label".
    pub const EMPTY: Id = Id(0);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// Why a candidate name cannot be an ordinary symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdError {
    Empty,
    TooLong(usize),
    NonAscii,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::Empty => write!(f, "symbol name is empty"),
            IdError::TooLong(len) => write!(f, "symbol name is {len} bytes, limit is 63"),
            IdError::NonAscii => write!(f, "symbol name contains non-ASCII bytes"),
        }
    }
}

impl std::error::Error for IdError {}

/// Per-analyzer identifier table.
///
/// Index 0 is reserved for the empty name so `Id::EMPTY` always
/// resolves to `""`.
pub struct IdStorage {
    names: IndexSet<Box<str>>,
}

impl IdStorage {
    pub fn new() -> Self {
        let mut names = IndexSet::new();
        names.insert(Box::from(""));
        Self { names }
    }

    /// Intern an ordinary-symbol name. Folds to upper case and applies
    /// the 1..=63 byte ASCII naming rules.
    pub fn intern(&mut self, text: &str) -> Result<Id, IdError> {
        if text.is_empty() {
            return Err(IdError::Empty);
        }
        if text.len() > 63 {
            return Err(IdError::TooLong(text.len()));
        }
        if !text.is_ascii() {
            return Err(IdError::NonAscii);
        }
        Ok(self.add(text))
    }

    /// Intern without ordinary-symbol validation. Used for well-known
    /// names, literal keys and sequence symbols.
    pub fn add(&mut self, text: &str) -> Id {
        let folded = text.to_ascii_uppercase();
        if let Some(idx) = self.names.get_index_of(folded.as_str()) {
            return Id(idx as u32);
        }
        let (idx, _) = self.names.insert_full(folded.into_boxed_str());
        Id(idx as u32)
    }

    /// Look up an already-interned name.
    pub fn find(&self, text: &str) -> Option<Id> {
        let folded = text.to_ascii_uppercase();
        self.names
            .get_index_of(folded.as_str())
            .map(|idx| Id(idx as u32))
    }

    pub fn resolve(&self, id: Id) -> &str {
        self.names
            .get_index(id.0 as usize)
            .map(|name| name.as_ref())
            .unwrap_or("")
    }
}

impl Default for IdStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_folds_case() {
        let mut ids = IdStorage::new();
        let a = ids.intern("label").unwrap();
        let b = ids.intern("LABEL").unwrap();
        assert_eq!(a, b);
        assert_eq!(ids.resolve(a), "LABEL");
    }

    #[test]
    fn empty_id_is_reserved() {
        let ids = IdStorage::new();
        assert!(Id::EMPTY.is_empty());
        assert_eq!(ids.resolve(Id::EMPTY), "");
        assert_eq!(IdStorage::new().intern(""), Err(IdError::Empty));
    }

    #[test]
    fn ordinary_symbol_rules_apply() {
        let mut ids = IdStorage::new();
        assert_eq!(ids.intern("caf\u{e9}"), Err(IdError::NonAscii));
        let long = "A".repeat(64);
        assert_eq!(ids.intern(&long), Err(IdError::TooLong(64)));
        assert!(ids.intern(&"A".repeat(63)).is_ok());
    }

    #[test]
    fn add_accepts_literal_keys() {
        let mut ids = IdStorage::new();
        let lit = ids.add("=f'1'");
        assert_eq!(ids.resolve(lit), "=F'1'");
        assert_eq!(ids.find("=F'1'"), Some(lit));
    }
}
