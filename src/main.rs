// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint: analyze HLASM sources and print diagnostics.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use hlasmforge::analyzer::{Analyzer, AnalyzerOptionsBuilder};
use hlasmforge::core::diagnostics::Severity;
use hlasmforge::lsp::diagnostics::{dedup_diagnostics, diagnostics_to_lsp};

#[derive(Parser)]
#[command(name = "hlasmforge", about = "HLASM ordinary-assembly analyzer")]
struct Cli {
    /// Source files to analyze.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Emit diagnostics as LSP-shaped JSON.
    #[arg(long)]
    json: bool,

    /// Suppress hints and informational diagnostics.
    #[arg(long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(error_count) => {
            if error_count > 0 {
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("hlasmforge: {err}");
            process::exit(2);
        }
    }
}

fn run(cli: &Cli) -> io::Result<usize> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut error_count = 0usize;

    for file in &cli.files {
        let text = fs::read_to_string(file)?;
        let options = AnalyzerOptionsBuilder::new()
            .file_location(file.display().to_string())
            .expect("first assignment")
            .build();
        let mut analyzer = Analyzer::new(&text, options);
        analyzer.analyze();

        let mut diags = dedup_diagnostics(analyzer.collect_diags());
        if cli.quiet {
            diags.retain(|diag| diag.severity >= Severity::Warning);
        }
        error_count += diags
            .iter()
            .filter(|diag| diag.severity == Severity::Error)
            .count();

        if cli.json {
            let values = diagnostics_to_lsp(&diags);
            writeln!(
                out,
                "{}",
                serde_json::json!({
                    "uri": file.display().to_string(),
                    "diagnostics": values,
                })
            )?;
        } else {
            for diag in &diags {
                writeln!(out, "{}: {diag}", file.display())?;
            }
        }
    }

    Ok(error_count)
}
