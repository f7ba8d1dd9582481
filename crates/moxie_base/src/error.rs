//! Diagnostic taxonomy and the wire/print diagnostic type.
//!
//! [`RuleId`] enumerates every `E_*`/`W_*` code from spec.md §7. [`Diagnostic`]
//! is what every stage ultimately produces; it formats per the §6 contract:
//! `<filename>:<line>:<column>: <severity>: <message> [<rule-id>]`.
//!
//! [`MoxieError`] is the `thiserror` enum used internally by fallible
//! operations (I/O, subprocess failures) that need `?`-propagation rather
//! than accumulation; its [`MoxieError::rule_id`] lets callers fold it into
//! a [`Diagnostic`] uniformly.

use crate::span::Position;
use std::fmt;

/// One of the stable error/warning codes named in spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleId {
    IoRead,
    IoWrite,
    Syntax,
    UnexpectedEof,
    AstInternal,
    ImplicitReference,
    MissingAmpersand,
    AssignToConst,
    PlatformIntType,
    FfiShape,
    CoercionType,
    EndianName,
    ChanDirection,
    NoMake,
    NarrowingLen,
    ToolchainFailure,
}

impl RuleId {
    /// The exact `[E_...]`/`[W_...]` token that appears in a formatted diagnostic.
    pub fn code(self) -> &'static str {
        match self {
            RuleId::IoRead => "E_IO_READ",
            RuleId::IoWrite => "E_IO_WRITE",
            RuleId::Syntax => "E_SYNTAX",
            RuleId::UnexpectedEof => "E_UNEXPECTED_EOF",
            RuleId::AstInternal => "E_AST_INTERNAL",
            RuleId::ImplicitReference => "E_IMPLICIT_REFERENCE",
            RuleId::MissingAmpersand => "E_MISSING_AMPERSAND",
            RuleId::AssignToConst => "E_ASSIGN_TO_CONST",
            RuleId::PlatformIntType => "E_PLATFORM_INT_TYPE",
            RuleId::FfiShape => "E_FFI_SHAPE",
            RuleId::CoercionType => "E_COERCION_TYPE",
            RuleId::EndianName => "E_ENDIAN_NAME",
            RuleId::ChanDirection => "E_CHAN_DIRECTION",
            RuleId::NoMake => "E_NO_MAKE",
            RuleId::NarrowingLen => "E_NARROWING_LEN",
            RuleId::ToolchainFailure => "E_TOOLCHAIN_FAILURE",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Diagnostic severity. A successful run emits no [`Severity::Error`] lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single located diagnostic, the unit every stage ultimately produces.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Position,
    pub message: String,
    pub rule: RuleId,
}

impl Diagnostic {
    pub fn error(position: Position, rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            position,
            message: message.into(),
            rule,
        }
    }

    pub fn warning(position: Position, rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            position,
            message: message.into(),
            rule,
        }
    }

    /// Stable sort key for §5's ordering guarantee: `(line, column, rule-id)`.
    pub fn sort_key(&self) -> (u32, u32, &'static str) {
        (self.position.line, self.position.column, self.rule.code())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {} [{}]",
            self.position, self.severity, self.message, self.rule
        )
    }
}

/// Structured error type for fallible internal operations.
///
/// Library code threads this with `?`; the CLI boundary (`moxie_cli`) is the
/// only place `anyhow` is used, to wrap this alongside ad hoc context.
#[derive(Debug, thiserror::Error)]
pub enum MoxieError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toolchain invocation failed: {0}")]
    Toolchain(String),
    #[error("{0}")]
    Diagnostics(String),
}

impl MoxieError {
    pub fn rule_id(&self) -> RuleId {
        match self {
            MoxieError::Io { .. } => RuleId::IoRead,
            MoxieError::Toolchain(_) => RuleId::ToolchainFailure,
            MoxieError::Diagnostics(_) => RuleId::Syntax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new("a.x", 0, 3, 5)
    }

    #[test]
    fn diagnostic_display_matches_wire_format() {
        let d = Diagnostic::error(pos(), RuleId::AssignToConst, "cannot assign to const 'Max'");
        assert_eq!(
            d.to_string(),
            "a.x:3:5: error: cannot assign to const 'Max' [E_ASSIGN_TO_CONST]"
        );
    }

    #[test]
    fn sort_key_orders_by_line_then_column_then_rule() {
        let a = Diagnostic::error(Position::new("a.x", 0, 1, 5), RuleId::NoMake, "x");
        let b = Diagnostic::error(Position::new("a.x", 0, 1, 2), RuleId::NoMake, "x");
        assert!(b.sort_key() < a.sort_key());
    }

    #[test]
    fn moxie_error_maps_to_rule_id() {
        let err = MoxieError::Toolchain("exit 1".into());
        assert_eq!(err.rule_id(), RuleId::ToolchainFailure);
    }
}
