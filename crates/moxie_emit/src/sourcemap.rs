//! Emitted-line -> source-span table, grounded on the teacher's
//! `logicaffeine_compile::sourcemap::SourceMap` (`line_to_span: HashMap<u32, Span>`).
//!
//! The emitter records, for every output line it writes a statement or
//! declaration on, the [`Span`] of the Moxie AST node that produced it. This
//! lets `moxie_build`'s toolchain-diagnostic relay (§7 "Position reversal")
//! translate a `go build` error citing an emitted line back to the Moxie
//! source position that produced it, the same way the teacher's bridge
//! translates rustc diagnostics back to LOGOS source.

use moxie_base::Span;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct EmitSourceMap {
    line_to_span: HashMap<u32, Span>,
}

impl EmitSourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that 1-based emitted line `line` was produced from `span` in
    /// the Moxie source. A line already recorded keeps its first (outermost)
    /// span, matching how a statement's own span is recorded before any
    /// sub-expression on the same line could overwrite it.
    pub fn record(&mut self, line: u32, span: Span) {
        self.line_to_span.entry(line).or_insert(span);
    }

    pub fn span_for_line(&self, line: u32) -> Option<Span> {
        self.line_to_span.get(&line).copied()
    }

    pub fn len(&self) -> usize {
        self.line_to_span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_to_span.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_looks_up_line_spans() {
        let mut map = EmitSourceMap::new();
        map.record(3, Span::new(10, 20));
        assert_eq!(map.span_for_line(3), Some(Span::new(10, 20)));
        assert_eq!(map.span_for_line(4), None);
    }

    #[test]
    fn first_recorded_span_for_a_line_wins() {
        let mut map = EmitSourceMap::new();
        map.record(3, Span::new(10, 20));
        map.record(3, Span::new(30, 40));
        assert_eq!(map.span_for_line(3), Some(Span::new(10, 20)));
    }
}
