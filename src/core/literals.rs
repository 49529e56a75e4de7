// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Literal pool.
//!
//! `=`-literals accumulate between LTORGs; each distinct text within a
//! pool cycle allocates one entry backed by a symbol whose name is the
//! literal text itself (suffixed with the generation after the first
//! pool, so a re-used literal in a later cycle gets a fresh symbol).
//! LTORG, or the implicit pool at END, materializes the pending
//! entries into the current section.

use indexmap::IndexMap;

use crate::core::data_def::DataDef;
use crate::core::diagnostics::Range;
use crate::core::ids::{Id, IdStorage};

#[derive(Debug, Clone)]
pub struct LiteralEntry {
    /// Symbol key backing this literal in its generation.
    pub key: Id,
    /// Canonical upper-cased `=...` text.
    pub text: String,
    pub data: DataDef,
    /// First reference; diagnostics anchor here.
    pub range: Range,
}

#[derive(Debug, Default)]
pub struct LiteralPool {
    generation: usize,
    pending: IndexMap<String, LiteralEntry>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_generation(&self) -> usize {
        self.generation
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register a literal reference, deduplicating by exact text
    /// within the current pool cycle. Returns the backing symbol key.
    pub fn register(
        &mut self,
        ids: &mut IdStorage,
        text: &str,
        data: DataDef,
        range: Range,
    ) -> Id {
        let canonical = text.to_ascii_uppercase();
        if let Some(entry) = self.pending.get(&canonical) {
            return entry.key;
        }
        let key_name = if self.generation == 0 {
            canonical.clone()
        } else {
            format!("{canonical}@{}", self.generation)
        };
        let key = ids.add(&key_name);
        self.pending.insert(
            canonical.clone(),
            LiteralEntry {
                key,
                text: canonical,
                data,
                range,
            },
        );
        key
    }

    /// Symbol key for a literal text in the current generation.
    pub fn lookup(&self, text: &str) -> Option<Id> {
        self.pending
            .get(&text.to_ascii_uppercase())
            .map(|entry| entry.key)
    }

    /// Close the pool cycle: hand out the pending entries in emission
    /// order (increasing alignment requirement, then insertion order)
    /// and start the next generation.
    pub fn take_pending(&mut self) -> Vec<LiteralEntry> {
        let mut entries: Vec<LiteralEntry> =
            std::mem::take(&mut self.pending).into_values().collect();
        entries.sort_by_key(|entry| entry.data.alignment().boundary);
        self.generation += 1;
        entries
    }
}
