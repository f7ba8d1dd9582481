//! Per-unit stage A-E pipeline (spec.md §2, §5: "Stages A-E are pure
//! functions of the source unit... independent source units may be
//! transpiled in parallel"). [`run_unit`] is the function `orchestrator`
//! fans out over a `rayon` pool; it never touches the filesystem or any
//! shared mutable state besides its own [`Interner`], matching §5's "Shared
//! resources" table (symbol tables and the remap table are per-unit).

use moxie_base::{Diagnostic, Interner, SourceUnit};
use moxie_emit::lower::EmitResult;
use moxie_preprocess::RemapTable;

/// The outcome of running one source unit through stages A-E.
pub struct UnitResult {
    /// Path of the source unit, relative to the project root.
    pub rel_path: std::path::PathBuf,
    /// Diagnostics accumulated across every stage, sorted by
    /// `(line, column, rule-id)` per §5's ordering guarantee, with any
    /// synthetic (stage-A-introduced) positions already reverse-mapped.
    pub diagnostics: Vec<Diagnostic>,
    /// `Some` iff `diagnostics` contains no error — emission only happens
    /// "if diagnostic count is zero" (§4.D).
    pub emitted: Option<EmitResult>,
    /// Stage A's remap table and the preprocessed/original source text,
    /// retained so `moxie_build`'s toolchain diagnostic relay (§7 "Position
    /// reversal") can translate a `go build` error citing an emitted line
    /// all the way back to original Moxie source, the same way a parse/
    /// validate diagnostic already is above. `None` for passthrough `.go`
    /// units, which have no preprocessing stage.
    pub remap: Option<(RemapTable, String, String)>,
}

impl UnitResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == moxie_base::Severity::Error)
    }
}

/// Runs one source unit through preprocessing, parsing, validation, and
/// (if clean) emission. `.go` files pass through stage A-E untouched
/// (spec.md §6: "the latter is passed through with no rewrites") — they are
/// not Moxie source and carry no Moxie-specific diagnostics.
pub fn run_unit(unit: &SourceUnit) -> UnitResult {
    let is_go_passthrough = unit
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "go")
        .unwrap_or(false);

    if is_go_passthrough {
        return UnitResult {
            rel_path: unit.path.clone(),
            diagnostics: Vec::new(),
            emitted: Some(EmitResult {
                source: unit.text().into_owned(),
                sourcemap: moxie_emit::sourcemap::EmitSourceMap::new(),
            }),
            remap: None,
        };
    }

    let filename = unit.path.to_string_lossy().into_owned();
    let original_source = unit.text().into_owned();

    let (preprocessed, remap, pre_diagnostics) = moxie_preprocess::preprocess(&original_source, &filename);

    let mut interner = Interner::new();
    let (ast, mut diagnostics) = moxie_syntax::parse(&preprocessed, &filename, &mut interner);

    let had_parse_errors = diagnostics
        .iter()
        .any(|d| d.severity == moxie_base::Severity::Error);

    if !had_parse_errors {
        let validation = moxie_validate::validate(&ast, &preprocessed, &filename, &interner);
        diagnostics.extend(validation);
    }
    diagnostics.extend(pre_diagnostics);

    diagnostics = remap.reverse_diagnostics(diagnostics, &original_source);
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let has_errors = diagnostics
        .iter()
        .any(|d| d.severity == moxie_base::Severity::Error);

    let emitted = if has_errors {
        None
    } else {
        Some(moxie_emit::lower::emit(&ast, &interner))
    };

    UnitResult {
        rel_path: unit.path.clone(),
        diagnostics,
        emitted,
        remap: Some((remap, preprocessed, original_source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_world_emits_cleanly() {
        let unit = SourceUnit::new(
            "main.x",
            b"package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"Hello, Moxie!\") }\n".to_vec(),
        );
        let result = run_unit(&unit);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert!(result.emitted.is_some());
    }

    #[test]
    fn const_assignment_is_rejected() {
        let unit = SourceUnit::new(
            "bad.x",
            b"package main\nconst Max = 100\nfunc f() { Max = 200 }\n".to_vec(),
        );
        let result = run_unit(&unit);
        assert!(result.has_errors());
        assert!(result.emitted.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.rule.code() == "E_ASSIGN_TO_CONST"));
    }

    #[test]
    fn go_files_pass_through_unchanged() {
        let unit = SourceUnit::new("vendor.go", b"package main\n".to_vec());
        let result = run_unit(&unit);
        assert!(!result.has_errors());
        assert_eq!(result.emitted.unwrap().source, "package main\n");
    }
}
