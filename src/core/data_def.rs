// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Data-definition semantics for DC/DS operands.
//!
//! A parsed operand carries the duplication factor, type letter with
//! optional extension, modifier expressions and nominal values. This
//! module derives the layout facts from it: alignment, total byte
//! length and the L'/S'/I' attributes of a labelling symbol. DC and DS
//! differ only in whether nominal values are emitted, which does not
//! matter for layout.

use crate::core::address::{Alignment, DOUBLEWORD, FULLWORD, HALFWORD, NO_ALIGN};
use crate::core::diagnostics::Range;
use crate::core::expr::{DependencySet, MachExpr, SolverView};
use crate::core::symbol::SymbolValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nominal {
    /// Quoted nominal: `C'text'`, `F'1,2'`, `X'FF'`.
    Text(String),
    /// Parenthesized nominal: `A(X,Y)`, `S(BASE)`.
    Exprs(Vec<MachExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDef {
    pub type_char: char,
    pub type_ext: Option<char>,
    pub dup: Option<MachExpr>,
    pub length: Option<MachExpr>,
    pub scale: Option<MachExpr>,
    pub exponent: Option<MachExpr>,
    pub nominals: Vec<Nominal>,
    pub range: Range,
}

struct TypeProps {
    implied_length: u32,
    align: Alignment,
    /// Length comes from the nominal text, not a fixed element size.
    measured: bool,
}

fn type_props(type_char: char) -> Option<TypeProps> {
    let props = match type_char {
        'B' | 'C' | 'X' | 'P' | 'Z' => TypeProps {
            implied_length: 1,
            align: NO_ALIGN,
            measured: true,
        },
        'H' => TypeProps {
            implied_length: 2,
            align: HALFWORD,
            measured: false,
        },
        'F' => TypeProps {
            implied_length: 4,
            align: FULLWORD,
            measured: false,
        },
        'E' => TypeProps {
            implied_length: 4,
            align: FULLWORD,
            measured: false,
        },
        'D' => TypeProps {
            implied_length: 8,
            align: DOUBLEWORD,
            measured: false,
        },
        'L' => TypeProps {
            implied_length: 16,
            align: DOUBLEWORD,
            measured: false,
        },
        'A' | 'V' | 'J' => TypeProps {
            implied_length: 4,
            align: FULLWORD,
            measured: false,
        },
        'Y' | 'S' => TypeProps {
            implied_length: 2,
            align: HALFWORD,
            measured: false,
        },
        _ => return None,
    };
    Some(props)
}

pub fn known_type(type_char: char) -> bool {
    type_props(type_char.to_ascii_uppercase()).is_some()
}

impl DataDef {
    /// Alignment requirement. An explicit length modifier switches the
    /// operand to byte alignment.
    pub fn alignment(&self) -> Alignment {
        if self.length.is_some() {
            return NO_ALIGN;
        }
        type_props(self.type_char)
            .map(|props| props.align)
            .unwrap_or(NO_ALIGN)
    }

    /// Dependencies that gate the total length: duplication factor and
    /// length modifier (scale and exponent never change layout).
    pub fn length_deps(&self, view: &dyn SolverView) -> DependencySet {
        let mut deps = DependencySet::default();
        if let Some(dup) = &self.dup {
            deps.merge(dup.collect_deps(view));
        }
        if let Some(length) = &self.length {
            deps.merge(length.collect_deps(view));
        }
        deps
    }

    /// Dependencies of the scale modifier alone.
    pub fn scale_deps(&self, view: &dyn SolverView) -> DependencySet {
        match &self.scale {
            Some(scale) => scale.collect_deps(view),
            None => DependencySet::default(),
        }
    }

    fn eval_abs(expr: &MachExpr, view: &dyn SolverView) -> Option<i32> {
        match expr.evaluate_silent(view) {
            SymbolValue::Absolute(value) => Some(value),
            _ => None,
        }
    }

    fn explicit_length(&self, view: &dyn SolverView) -> Option<Option<u32>> {
        match &self.length {
            None => Some(None),
            Some(expr) => match Self::eval_abs(expr, view) {
                Some(value) if (0..=65535).contains(&value) => Some(Some(value as u32)),
                _ => None,
            },
        }
    }

    fn dup_factor(&self, view: &dyn SolverView) -> Option<i64> {
        match &self.dup {
            None => Some(1),
            Some(expr) => match Self::eval_abs(expr, view) {
                Some(value) if value >= 0 => Some(value as i64),
                _ => None,
            },
        }
    }

    /// L' attribute of the operand: explicit length, else implied by
    /// the type and the first nominal.
    pub fn length_attribute(&self, view: &dyn SolverView) -> Option<u32> {
        let props = type_props(self.type_char)?;
        if let Some(explicit) = self.explicit_length(view)? {
            return Some(explicit);
        }
        if !props.measured {
            return Some(props.implied_length);
        }
        match self.nominals.first() {
            Some(nominal) => measured_group_lengths(self.type_char, nominal)
                .and_then(|lengths| lengths.first().copied())
                .map(|len| len as u32)
                .or(Some(props.implied_length)),
            None => Some(props.implied_length),
        }
    }

    /// S' attribute: explicit scale modifier, else derived for packed
    /// and zoned decimals, else zero.
    pub fn scale_attribute(&self, view: &dyn SolverView) -> Option<i32> {
        if let Some(scale) = &self.scale {
            return Self::eval_abs(scale, view);
        }
        match self.type_char {
            'P' | 'Z' => {
                let text = match self.nominals.first() {
                    Some(Nominal::Text(text)) => text,
                    _ => return Some(0),
                };
                let first = text.split(',').next().unwrap_or("");
                Some(match first.split_once('.') {
                    Some((_, frac)) => frac.chars().filter(char::is_ascii_digit).count() as i32,
                    None => 0,
                })
            }
            _ => Some(0),
        }
    }

    /// I' attribute, from L' and S' per type family.
    pub fn integer_attribute(&self, view: &dyn SolverView) -> Option<i32> {
        let length = self.length_attribute(view)? as i32;
        let scale = self.scale_attribute(view)?;
        Some(match self.type_char {
            'F' | 'H' => 8 * length - scale - 1,
            'P' => 2 * length - scale - 1,
            'Z' => length - scale,
            'E' | 'D' | 'L' => 2 * (length - 1) - scale,
            _ => 0,
        })
    }

    /// Total byte length of the operand:
    /// `dup × Σ per-nominal element lengths`.
    pub fn operand_length(&self, view: &dyn SolverView) -> Option<i64> {
        let props = type_props(self.type_char)?;
        let dup = self.dup_factor(view)?;
        let explicit = self.explicit_length(view)?;

        let one_pass: i64 = if self.nominals.is_empty() {
            explicit.unwrap_or(props.implied_length) as i64
        } else {
            let mut total = 0i64;
            for nominal in &self.nominals {
                total += match nominal {
                    Nominal::Exprs(values) => {
                        let count = values.len().max(1) as i64;
                        count * explicit.unwrap_or(props.implied_length) as i64
                    }
                    Nominal::Text(text) => match explicit {
                        Some(len) => {
                            let count = if props.measured && self.type_char == 'C' {
                                1
                            } else {
                                group_count(text) as i64
                            };
                            count * len as i64
                        }
                        None if props.measured => measured_group_lengths(self.type_char, nominal)?
                            .iter()
                            .sum::<i64>(),
                        None => group_count(text) as i64 * props.implied_length as i64,
                    },
                };
            }
            total
        };

        Some(dup * one_pass)
    }
}

fn group_count(text: &str) -> usize {
    if text.is_empty() {
        1
    } else {
        text.split(',').count()
    }
}

/// Byte lengths of the comma-separated groups of a measured-type
/// nominal (C keeps commas as data).
fn measured_group_lengths(type_char: char, nominal: &Nominal) -> Option<Vec<i64>> {
    let text = match nominal {
        Nominal::Text(text) => text,
        Nominal::Exprs(_) => return None,
    };
    let lengths = match type_char {
        'C' => vec![text.len().max(1) as i64],
        'X' => text
            .split(',')
            .map(|group| {
                let digits = group.chars().filter(|c| c.is_ascii_hexdigit()).count();
                (digits.max(1) as i64 + 1) / 2
            })
            .collect(),
        'B' => text
            .split(',')
            .map(|group| {
                let bits = group.chars().filter(|c| *c == '0' || *c == '1').count();
                (bits.max(1) as i64 + 7) / 8
            })
            .collect(),
        'P' => text
            .split(',')
            .map(|group| {
                let digits = group.chars().filter(char::is_ascii_digit).count();
                digits.max(1) as i64 / 2 + 1
            })
            .collect(),
        'Z' => text
            .split(',')
            .map(|group| group.chars().filter(char::is_ascii_digit).count().max(1) as i64)
            .collect(),
        _ => return None,
    };
    Some(lengths)
}

/// Lay consecutive operands out from a common aligned start; the
/// result is the chunk extent used both for immediate reservation and
/// for closing a chunk space.
pub fn operands_length(ops: &[DataDef], view: &dyn SolverView) -> Option<i64> {
    let mut pos = 0i64;
    for op in ops {
        let align = op.alignment();
        pos += align.gap_from(pos as i32) as i64;
        pos += op.operand_length(view)?;
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::SpaceRegistry;
    use crate::core::expr::SymbolLookup;
    use crate::core::ids::Id;

    struct EmptyView(SpaceRegistry);

    impl SolverView for EmptyView {
        fn lookup(&self, _id: Id) -> SymbolLookup<'_> {
            SymbolLookup::Unknown
        }

        fn loctr(&self) -> Option<&crate::core::address::Address> {
            None
        }

        fn literal_symbol(&self, _text: &str) -> Option<Id> {
            None
        }

        fn spaces(&self) -> &SpaceRegistry {
            &self.0
        }
    }

    fn def(type_char: char) -> DataDef {
        DataDef {
            type_char,
            type_ext: None,
            dup: None,
            length: None,
            scale: None,
            exponent: None,
            nominals: Vec::new(),
            range: Range::default(),
        }
    }

    fn num(value: i32) -> MachExpr {
        MachExpr::Constant(value, Range::default())
    }

    #[test]
    fn char_length_comes_from_nominal() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('C');
        d.nominals.push(Nominal::Text("HELLO".to_string()));
        assert_eq!(d.length_attribute(&view), Some(5));
        assert_eq!(d.operand_length(&view), Some(5));
    }

    #[test]
    fn explicit_length_overrides_and_drops_alignment() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('F');
        d.length = Some(num(2));
        d.nominals.push(Nominal::Text("1".to_string()));
        assert_eq!(d.length_attribute(&view), Some(2));
        assert_eq!(d.alignment(), NO_ALIGN);
        assert_eq!(d.operand_length(&view), Some(2));
    }

    #[test]
    fn duplication_scales_length() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('H');
        d.dup = Some(num(3));
        assert_eq!(d.operand_length(&view), Some(6));
    }

    #[test]
    fn zero_duplication_reserves_nothing() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('F');
        d.dup = Some(num(0));
        assert_eq!(d.operand_length(&view), Some(0));
        assert_eq!(d.alignment(), FULLWORD);
    }

    #[test]
    fn multiple_fullword_values_count() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('F');
        d.nominals.push(Nominal::Text("1,2,3".to_string()));
        assert_eq!(d.operand_length(&view), Some(12));
    }

    #[test]
    fn hex_length_rounds_up() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('X');
        d.nominals.push(Nominal::Text("FFF".to_string()));
        assert_eq!(d.length_attribute(&view), Some(2));
        assert_eq!(d.operand_length(&view), Some(2));
    }

    #[test]
    fn packed_scale_and_integer() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('P');
        d.nominals.push(Nominal::Text("12.345".to_string()));
        // 5 digits -> 3 bytes, scale 3, integer 2*3-3-1 = 2.
        assert_eq!(d.length_attribute(&view), Some(3));
        assert_eq!(d.scale_attribute(&view), Some(3));
        assert_eq!(d.integer_attribute(&view), Some(2));
    }

    #[test]
    fn address_constant_list() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('A');
        d.nominals.push(Nominal::Exprs(vec![num(1), num(2)]));
        assert_eq!(d.operand_length(&view), Some(8));
    }

    #[test]
    fn chunk_layout_aligns_between_operands() {
        let view = EmptyView(SpaceRegistry::new());
        let mut c = def('C');
        c.nominals.push(Nominal::Text("ABC".to_string()));
        let f = def('F');
        // C at 0..3, F aligns to 4, ends at 8.
        assert_eq!(operands_length(&[c, f], &view), Some(8));
    }

    #[test]
    fn unresolved_modifier_reports_none() {
        let view = EmptyView(SpaceRegistry::new());
        let mut d = def('C');
        d.length = Some(MachExpr::Symbol(Id::EMPTY, Range::default()));
        assert_eq!(d.operand_length(&view), None);
        assert!(d.length_deps(&view).contains_dependencies());
    }
}
