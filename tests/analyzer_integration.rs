// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Integration coverage through the public analyzer API.

use std::collections::HashMap;

use hlasmforge::analyzer::{
    Analyzer, AnalyzerOptions, AnalyzerOptionsBuilder, LibraryProvider, Step,
};
use hlasmforge::core::diagnostics::Severity;
use hlasmforge::core::symbol::SymbolValue;
use hlasmforge::lsp::diagnostics::{dedup_diagnostics, diagnostics_to_lsp};
use hlasmforge::processor::Phase;

struct MapProvider(HashMap<String, String>);

impl LibraryProvider for MapProvider {
    fn has_library(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_uppercase())
    }

    fn get_library(&self, name: &str) -> Option<String> {
        self.0.get(&name.to_ascii_uppercase()).cloned()
    }
}

fn provider(libs: &[(&str, &str)]) -> Box<dyn LibraryProvider> {
    Box::new(MapProvider(
        libs.iter()
            .map(|(name, text)| (name.to_ascii_uppercase(), text.to_string()))
            .collect(),
    ))
}

fn abs_symbol(analyzer: &Analyzer, name: &str) -> Option<i32> {
    let id = analyzer.context().ids.find(name)?;
    match analyzer.context().ctx.get_symbol(id)?.value {
        SymbolValue::Absolute(value) => Some(value),
        _ => None,
    }
}

#[test]
fn full_program_analysis_produces_no_diagnostics() {
    let source = "\
MAIN  CSECT
      USING MAIN,12
SAVE  DS    18F
LEN   EQU   *-MAIN
      LTORG
      END
";
    let mut analyzer = Analyzer::new(source, AnalyzerOptions::default());
    analyzer.analyze();
    assert_eq!(analyzer.context().phase(), Phase::Finalized);
    assert!(analyzer.collect_diags().is_empty());
    assert_eq!(abs_symbol(&analyzer, "LEN"), Some(72));
}

#[test]
fn copy_members_resolve_through_the_provider() {
    let options = AnalyzerOptionsBuilder::new()
        .library_provider(provider(&[("EQUS", "TEN EQU 10\n")]))
        .unwrap()
        .build();
    let mut analyzer = Analyzer::new(" COPY EQUS\nTWICE EQU TEN*2\n", options);
    analyzer.analyze();
    assert!(analyzer.collect_diags().is_empty());
    assert_eq!(abs_symbol(&analyzer, "TWICE"), Some(20));
}

#[test]
fn co_analyze_surfaces_the_copy_suspension_point() {
    let mut analyzer = Analyzer::new(" COPY MEM\nA EQU T\n", AnalyzerOptions::default());
    let mut awaited = false;
    loop {
        match analyzer.co_analyze() {
            Step::AwaitingLibrary(member) => {
                assert_eq!(member, "MEM");
                awaited = true;
                analyzer.supply_library("MEM", Some("T EQU 7".to_string()));
            }
            Step::Done => break,
            Step::Working => {}
            Step::Cancelled => panic!("analysis was not cancelled"),
        }
    }
    assert!(awaited);
    assert_eq!(abs_symbol(&analyzer, "A"), Some(7));
}

#[test]
fn cancellation_prevents_finalization() {
    let mut analyzer = Analyzer::new("A EQU 1\nB EQU UNRESOLVED\n", AnalyzerOptions::default());
    assert_eq!(analyzer.co_analyze(), Step::Working);
    analyzer.cancel();
    analyzer.analyze();
    assert_ne!(analyzer.context().phase(), Phase::Finalized);
    // The unresolved reference was never reported: no finalization ran.
    assert!(analyzer.collect_diags().is_empty());
}

#[test]
fn mnote_severities_survive_the_lsp_conversion() {
    let source = " MNOTE 1,'hint'\n MNOTE 3,'info'\n MNOTE 5,'warn'\n MNOTE 9,'err'\n";
    let mut analyzer = Analyzer::new(source, AnalyzerOptions::default());
    analyzer.analyze();
    let diags = dedup_diagnostics(analyzer.collect_diags());
    assert_eq!(diags.len(), 4);
    let severities: Vec<Severity> = diags.iter().map(|diag| diag.severity).collect();
    assert_eq!(
        severities,
        vec![
            Severity::Hint,
            Severity::Info,
            Severity::Warning,
            Severity::Error
        ]
    );
    let values = diagnostics_to_lsp(&diags);
    let lsp: Vec<u64> = values
        .iter()
        .map(|value| value["severity"].as_u64().unwrap())
        .collect();
    assert_eq!(lsp, vec![4, 3, 2, 1]);
}

#[test]
fn nested_copy_members_expand_in_place() {
    let options = AnalyzerOptionsBuilder::new()
        .library_provider(provider(&[
            ("OUTER", " COPY INNER\nB EQU A+1\n"),
            ("INNER", "A EQU 1\n"),
        ]))
        .unwrap()
        .build();
    let mut analyzer = Analyzer::new(" COPY OUTER\nC EQU B+1\n", options);
    analyzer.analyze();
    assert!(analyzer.collect_diags().is_empty());
    assert_eq!(abs_symbol(&analyzer, "C"), Some(3));
    let metrics = analyzer.metrics();
    assert_eq!(metrics.copy_statements, 3);
}

#[test]
fn forward_references_across_copy_boundaries() {
    let options = AnalyzerOptionsBuilder::new()
        .library_provider(provider(&[("TAIL", "BASE EQU 100\n")]))
        .unwrap()
        .build();
    let mut analyzer = Analyzer::new("TOP EQU BASE+1\n COPY TAIL\n", options);
    analyzer.analyze();
    assert!(analyzer.collect_diags().is_empty());
    assert_eq!(abs_symbol(&analyzer, "TOP"), Some(101));
}

#[test]
fn dsect_and_csect_layouts_are_independent() {
    let source = "\
REC   DSECT
RNAME DS    CL8
RADDR DS    CL24
RLEN  EQU   *-REC
PROG  CSECT
BUF   DS    CL(RLEN)
AFTER DS    C
DIST  EQU   AFTER-BUF
";
    let mut analyzer = Analyzer::new(source, AnalyzerOptions::default());
    analyzer.analyze();
    assert!(
        analyzer.collect_diags().is_empty(),
        "diags: {:?}",
        analyzer.collect_diags()
    );
    assert_eq!(abs_symbol(&analyzer, "RLEN"), Some(32));
    assert_eq!(abs_symbol(&analyzer, "DIST"), Some(32));
}
