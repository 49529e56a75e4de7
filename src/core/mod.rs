// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Ordinary-assembly core: symbols, sections, spaces, expressions and
//! the dependency solver.

pub mod address;
pub mod data_def;
pub mod dependency;
pub mod diagnostics;
pub mod ebcdic;
pub mod expr;
pub mod ids;
pub mod instructions;
pub mod literals;
pub mod ordinary;
pub mod section;
pub mod statement;
pub mod symbol;
pub mod using;
