//! Translates `go build`/`go vet` diagnostics (plain `file:line:col: message`
//! text, Go's toolchain has no stable JSON diagnostic format the way rustc
//! does) back to Moxie source positions, grounded on the teacher's
//! `diagnostic.rs` bridge (`translate_diagnostics`/`RustcDiagnostic` parsing
//! + `SourceMap` lookup), generalized from "parse rustc's JSON, look up a
//! LOGOS span" to "parse a Go compiler text line, look up a Moxie span."
//!
//! Position reversal (spec.md §7) is two hops here, not one: an emitted Go
//! line maps to a [`moxie_base::Span`] in the *preprocessed* Moxie buffer
//! via [`moxie_emit::sourcemap::EmitSourceMap`], and that span is then
//! reverse-mapped through the unit's [`moxie_preprocess::RemapTable`] in
//! case it falls inside a stage-A rewrite.

use crate::pipeline::UnitResult;
use moxie_base::{line_column, Diagnostic, Position, RuleId, Severity};
use std::collections::HashMap;
use std::path::Path;

/// One parsed line of `go build` stderr: `<file>:<line>:<col>: <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GoDiagnostic {
    file: String,
    line: u32,
    column: u32,
    message: String,
}

fn parse_go_line(line: &str) -> Option<GoDiagnostic> {
    let mut parts = line.splitn(4, ':');
    let file = parts.next()?.to_string();
    let line_no: u32 = parts.next()?.trim().parse().ok()?;
    let column: u32 = parts.next()?.trim().parse().ok()?;
    let message = parts.next()?.trim().to_string();
    if file.is_empty() || message.is_empty() {
        return None;
    }
    Some(GoDiagnostic {
        file,
        line: line_no,
        column,
        message,
    })
}

/// Parses every diagnostic-shaped line out of `go build`'s stderr text.
/// Lines that don't match the `file:line:col: message` shape (banners,
/// `go: downloading...` noise) are silently skipped.
fn parse_go_stderr(stderr: &str) -> Vec<GoDiagnostic> {
    stderr.lines().filter_map(parse_go_line).collect()
}

/// Relays `go build` stderr back to the user as Moxie [`Diagnostic`]s,
/// mapping each emitted-file position through the matching unit's
/// [`moxie_emit::sourcemap::EmitSourceMap`] and
/// [`moxie_preprocess::RemapTable`] when one is available. A `.go` emitted
/// path with no matching unit (e.g. an error inside the vendored runtime
/// package) is relayed verbatim with its toolchain-reported position, since
/// there is no Moxie source to map it back to.
pub fn relay(stderr: &str, units: &[UnitResult]) -> Vec<Diagnostic> {
    let by_emitted_path: HashMap<String, &UnitResult> = units
        .iter()
        .map(|u| {
            let emitted = crate::interfaces::output_path_for(&u.rel_path);
            (emitted.to_string_lossy().replace('\\', "/"), u)
        })
        .collect();

    parse_go_stderr(stderr)
        .into_iter()
        .map(|g| translate(g, &by_emitted_path))
        .collect()
}

fn translate(g: GoDiagnostic, by_emitted_path: &HashMap<String, &UnitResult>) -> Diagnostic {
    let normalized = g.file.replace('\\', "/");
    let key = Path::new(&normalized)
        .file_name()
        .map(|_| normalized.clone())
        .unwrap_or(normalized);

    let Some(unit) = by_emitted_path.get(key.as_str()).or_else(|| {
        by_emitted_path
            .iter()
            .find(|(k, _)| key.ends_with(k.as_str()))
            .map(|(_, v)| v)
    }) else {
        return Diagnostic::error(
            Position::new(g.file, 0, g.line, g.column),
            RuleId::ToolchainFailure,
            g.message,
        );
    };

    let Some(emitted) = &unit.emitted else {
        return Diagnostic::error(
            Position::new(unit.rel_path.clone(), 0, g.line, g.column),
            RuleId::ToolchainFailure,
            g.message,
        );
    };

    let Some(span) = emitted.sourcemap.span_for_line(g.line) else {
        return Diagnostic::error(
            Position::new(unit.rel_path.clone(), 0, g.line, g.column),
            RuleId::ToolchainFailure,
            g.message,
        );
    };

    let filename = unit.rel_path.to_string_lossy().into_owned();
    match &unit.remap {
        Some((remap, preprocessed, original)) => {
            let (line, column) = line_column(preprocessed, span.start);
            let synthetic = remap.reverse_offset(span.start).is_some();
            let mut pos = Position::new(filename, span.start, line, column);
            if synthetic {
                pos = pos.as_synthetic();
            }
            let pos = remap.reverse_position(pos, original);
            Diagnostic::error(pos, RuleId::ToolchainFailure, g.message)
        }
        None => {
            let source = unit.emitted.as_ref().map(|e| e.source.as_str()).unwrap_or("");
            let (line, column) = line_column(source, span.start);
            Diagnostic::error(
                Position::new(filename, span.start, line, column),
                RuleId::ToolchainFailure,
                g.message,
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelaySummary {
    pub diagnostics: Vec<Diagnostic>,
}

impl RelaySummary {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_go_error_line() {
        let d = parse_go_line("main.go:12:5: undefined: fmt").unwrap();
        assert_eq!(d.file, "main.go");
        assert_eq!(d.line, 12);
        assert_eq!(d.column, 5);
        assert_eq!(d.message, "undefined: fmt");
    }

    #[test]
    fn skips_non_diagnostic_lines() {
        assert!(parse_go_line("go: downloading example.com/foo v1.0.0").is_none());
        assert!(parse_go_line("").is_none());
    }

    #[test]
    fn parse_go_stderr_skips_blank_and_banner_lines() {
        let stderr = "# example.com/hello\nmain.go:3:2: syntax error\n\n";
        let diags = parse_go_stderr(stderr);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 3);
    }
}
