//! # moxie-base
//!
//! Pure structural atoms shared by every stage of the Moxie pipeline:
//! source spans and resolved positions, string interning, and the
//! diagnostic/error taxonomy from spec.md §7.
//!
//! Nothing in this crate depends on any other Moxie crate; it exists so that
//! `moxie_syntax`, `moxie_preprocess`, `moxie_validate`, `moxie_emit`, and
//! `moxie_build` can all speak the same vocabulary of positions and
//! diagnostics without depending on each other.

mod error;
mod intern;
mod span;

pub use error::{Diagnostic, MoxieError, RuleId, Severity};
pub use intern::{Interner, Symbol, SymbolEq};
pub use span::{line_column, Position, Span};

/// A loaded compilation input: `{path, bytes}` per spec.md §3.
///
/// This is the canonical identity of a user-visible file as produced by a
/// [`crate`]-external source reader (spec.md §6) and consumed by stage A.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: std::path::PathBuf,
    pub bytes: Vec<u8>,
}

impl SourceUnit {
    pub fn new(path: impl Into<std::path::PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Lossy UTF-8 view of the unit's bytes, for stages that work on `&str`.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unit_text_decodes_utf8() {
        let unit = SourceUnit::new("a.x", b"package main".to_vec());
        assert_eq!(unit.text(), "package main");
    }
}
