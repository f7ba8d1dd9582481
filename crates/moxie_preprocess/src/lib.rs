//! # moxie-preprocess
//!
//! Stage A of the pipeline (spec.md §4.A): a text-level normalizer that
//! rewrites the two syntactic sugars the grammar cannot accept directly —
//! channel literals (`&chan T{...}`, `&chan<- T{...}`, `&<-chan T{...}`) and
//! endian-tagged coercions (`(*[]T, LittleEndian)(...)` and friends) — into
//! plain-identifier surrogates that `moxie_syntax`'s lexer tokenizes as
//! ordinary identifiers and whose parser already knows how to reconstitute
//! into the right AST node (§4.C).
//!
//! This is a single left-to-right, finite-state scan over the byte buffer —
//! the same hand-rolled-scanner style the teacher uses for its `LineLexer`
//! stage 1 (`logicaffeine_language::lexer::LineLexer`), not a regex engine
//! and not a parser: per §4.A it "MUST NOT recurse into nested brace
//! structure." Each rewritten span is recorded in the returned [`RemapTable`]
//! so a diagnostic citing a synthetic position can be reverse-mapped to the
//! user's original source before it reaches them (§7 "Position reversal").
//!
//! R7 (§4.D, `E_ENDIAN_NAME`) is also detected here rather than later: a
//! coercion-shaped head (`(*[]T, <ident>)(`) whose endian identifier isn't
//! one of `LittleEndian`/`BigEndian`/`NativeEndian` is recognized structurally
//! by [`match_endian_coercion_head`] even though it can't be rewritten into a
//! valid surrogate, so [`preprocess`] emits the diagnostic directly instead
//! of silently leaving the text untouched (which would otherwise surface as
//! a confusing downstream `E_SYNTAX` on the stray comma).

use moxie_base::{Diagnostic, Position, RuleId, Span};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChanDir {
    Both,
    SendOnly,
    RecvOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Native,
    Little,
    Big,
}

/// One `{original-span, synthetic-span}` pair recorded for a single rewrite.
///
/// `tag` is purely diagnostic (shows up in `Debug` output); reverse mapping
/// only needs the two spans.
#[derive(Debug, Clone)]
pub struct RemapEntry {
    pub original: Span,
    pub synthetic: Span,
    pub tag: &'static str,
}

/// The position-remap table produced alongside the preprocessed buffer.
///
/// Entries are pushed in left-to-right scan order, so `synthetic.start` is
/// already monotonically increasing — [`RemapTable::reverse_offset`] can
/// binary-search rather than scan linearly once the table grows large.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: Vec<RemapEntry>,
}

impl RemapTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Maps a byte offset in the *preprocessed* buffer back to the
    /// corresponding offset in the *original* buffer, if it falls inside a
    /// rewritten span. Offsets past the end of the original span clamp to
    /// its last byte, since a synthetic identifier is usually shorter or
    /// longer than the surface form it replaces.
    pub fn reverse_offset(&self, synthetic_offset: usize) -> Option<usize> {
        let idx = self
            .entries
            .partition_point(|e| e.synthetic.start <= synthetic_offset)
            .checked_sub(1)?;
        let entry = &self.entries[idx];
        if synthetic_offset < entry.synthetic.start || synthetic_offset >= entry.synthetic.end.max(entry.synthetic.start + 1) {
            return None;
        }
        let delta = synthetic_offset - entry.synthetic.start;
        let max_delta = entry.original.len().saturating_sub(1);
        Some(entry.original.start + delta.min(max_delta))
    }

    /// Reverse-maps a single position. A no-op for non-synthetic positions.
    pub fn reverse_position(&self, pos: Position, original_source: &str) -> Position {
        if !pos.synthetic {
            return pos;
        }
        match self.reverse_offset(pos.byte_offset) {
            Some(orig_offset) => {
                let (line, column) = moxie_base::line_column(original_source, orig_offset);
                Position::new(pos.filename, orig_offset, line, column)
            }
            None => pos,
        }
    }

    /// Rewrites any surrogate identifier prefix appearing in a diagnostic
    /// message back to the Moxie surface syntax it stands for. Idempotent on
    /// messages that don't mention a surrogate.
    pub fn restore_text(message: &str) -> String {
        const REPLACEMENTS: &[(&str, &str)] = &[
            ("__moxie_chan_both", "&chan"),
            ("__moxie_chan_send", "&chan<-"),
            ("__moxie_chan_recv", "&<-chan"),
            ("__moxie_le", "(*[]T, LittleEndian)"),
            ("__moxie_be", "(*[]T, BigEndian)"),
        ];
        let mut out = message.to_string();
        for (from, to) in REPLACEMENTS {
            if out.contains(from) {
                out = out.replace(from, to);
            }
        }
        out
    }

    /// Reverse-maps a full diagnostic list: positions that fall inside a
    /// rewritten span are translated back to the original source, and any
    /// surrogate substring in the message is restored to its surface form.
    pub fn reverse_diagnostics(&self, diags: Vec<Diagnostic>, original_source: &str) -> Vec<Diagnostic> {
        diags
            .into_iter()
            .map(|mut d| {
                d.position = self.reverse_position(d.position, original_source);
                d.message = Self::restore_text(&d.message);
                d
            })
            .collect()
    }
}

/// Runs the stage-A rewrite over `source`, returning the preprocessed text
/// (fed to `moxie_syntax::parse`), the [`RemapTable`] needed to reverse any
/// diagnostic citing a synthetic position, and any `E_ENDIAN_NAME`
/// diagnostics found along the way (§4.D R7). `filename` is only used to
/// stamp those diagnostics' positions; offsets are in `source` itself, so
/// none of them are synthetic.
pub fn preprocess(source: &str, filename: impl AsRef<Path>) -> (String, RemapTable, Vec<Diagnostic>) {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut entries = Vec::new();
    let mut diagnostics = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'&' {
            if let Some((consumed_end, dir, type_text)) = match_chan_literal_head(source, i) {
                let tag = match dir {
                    ChanDir::Both => "__moxie_chan_both",
                    ChanDir::SendOnly => "__moxie_chan_send",
                    ChanDir::RecvOnly => "__moxie_chan_recv",
                };
                let surrogate = format!("{tag}[{type_text}]{{");
                push_rewrite(&mut out, &mut entries, Span::new(i, consumed_end), surrogate, "chan_literal");
                i = consumed_end;
                continue;
            }
        }
        if bytes[i] == b'(' && source[i..].starts_with("(*[]") {
            if let Some((consumed_end, type_text, endian)) = match_endian_coercion_head(source, i) {
                match endian {
                    EndianTag::Known(e) => {
                        let surrogate = match e {
                            Endian::Little => format!("__moxie_le[{type_text}]("),
                            Endian::Big => format!("__moxie_be[{type_text}]("),
                            Endian::Native => format!("(*[]{type_text})("),
                        };
                        let tag = match e {
                            Endian::Native => "endian_coercion_native",
                            _ => "endian_coercion",
                        };
                        push_rewrite(&mut out, &mut entries, Span::new(i, consumed_end), surrogate, tag);
                    }
                    EndianTag::Unknown { span, text } => {
                        let (line, column) = moxie_base::line_column(source, span.start);
                        let pos = Position::new(filename.as_ref().to_path_buf(), span.start, line, column);
                        diagnostics.push(Diagnostic::error(
                            pos,
                            RuleId::EndianName,
                            format!(
                                "'{text}' is not a valid endian tag; use LittleEndian, BigEndian, or NativeEndian"
                            ),
                        ));
                        // Rewritten as a plain (unchecked) coercion so the rest of
                        // the statement still parses instead of cascading into an
                        // unrelated E_SYNTAX on the stray comma.
                        let surrogate = format!("(*[]{type_text})(");
                        push_rewrite(&mut out, &mut entries, Span::new(i, consumed_end), surrogate, "endian_coercion_invalid_name");
                    }
                }
                i = consumed_end;
                continue;
            }
        }
        let ch_len = utf8_char_len(bytes[i]);
        let end = (i + ch_len).min(bytes.len());
        out.push_str(&source[i..end]);
        i = end;
    }

    (out, RemapTable { entries }, diagnostics)
}

fn push_rewrite(out: &mut String, entries: &mut Vec<RemapEntry>, original: Span, surrogate: String, tag: &'static str) {
    let synth_start = out.len();
    out.push_str(&surrogate);
    let synth_end = out.len();
    entries.push(RemapEntry {
        original,
        synthetic: Span::new(synth_start, synth_end),
        tag,
    });
}

fn utf8_char_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else if first_byte & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// Matches `&chan <T>{`, `&chan<- <T>{`, or `&<-chan <T>{` starting at `i`.
/// Returns the byte offset just past the consumed `{` (exclusive) along with
/// the direction and the trimmed type text, or `None` if `i` doesn't start
/// one of these three heads.
fn match_chan_literal_head(source: &str, i: usize) -> Option<(usize, ChanDir, String)> {
    let rest = &source[i..];
    let (after_marker, dir) = if rest.starts_with("&<-chan") {
        (i + "&<-chan".len(), ChanDir::RecvOnly)
    } else if rest.starts_with("&chan<-") {
        (i + "&chan<-".len(), ChanDir::SendOnly)
    } else if rest.starts_with("&chan") {
        let after = i + "&chan".len();
        if matches!(source.as_bytes().get(after), Some(b) if is_ident_continue(*b)) {
            return None;
        }
        (after, ChanDir::Both)
    } else {
        return None;
    };
    let (brace_idx, type_text) = scan_until(source, after_marker, b'{')?;
    if type_text.is_empty() {
        return None;
    }
    Some((brace_idx + 1, dir, type_text.to_string()))
}

/// The endian identifier found in a coercion-shaped head, resolved against
/// the three names §4.A/§6 recognize.
enum EndianTag {
    Known(Endian),
    /// Shape matched (`(*[]T, <ident>) (`) but `<ident>` wasn't one of
    /// `LittleEndian`/`BigEndian`/`NativeEndian` — §4.D R7.
    Unknown { span: Span, text: String },
}

/// Matches `(*[]<T>, LittleEndian)(`, `...BigEndian)(`, `...NativeEndian)(`,
/// or `...<\other identifier>)(` starting at `i` (which must already be known
/// to start with `(*[]`). Returns the offset just past the consumed final
/// `(` (exclusive), the trimmed element type text, and the resolved endian
/// tag. Returns `None` only when the surrounding shape itself doesn't match
/// (no comma, no identifier, no closing `)(`) — an unrecognized but
/// well-shaped identifier is still reported via [`EndianTag::Unknown`]
/// rather than declining the match, so R7 can fire (§4.D).
fn match_endian_coercion_head(source: &str, i: usize) -> Option<(usize, String, EndianTag)> {
    let bytes = source.as_bytes();
    let type_start = i + "(*[]".len();
    let (comma_idx, type_text) = scan_until(source, type_start, b',')?;
    if type_text.is_empty() {
        return None;
    }
    let mut j = comma_idx + 1;
    j = skip_inline_ws(bytes, j);
    let ident_start = j;
    while j < bytes.len() && is_ident_continue(bytes[j]) {
        j += 1;
    }
    if j == ident_start {
        return None;
    }
    let ident_text = &source[ident_start..j];
    let endian = match ident_text {
        "LittleEndian" => EndianTag::Known(Endian::Little),
        "BigEndian" => EndianTag::Known(Endian::Big),
        "NativeEndian" => EndianTag::Known(Endian::Native),
        _ => EndianTag::Unknown { span: Span::new(ident_start, j), text: ident_text.to_string() },
    };
    j = skip_inline_ws(bytes, j);
    if bytes.get(j) != Some(&b')') {
        return None;
    }
    j += 1;
    j = skip_inline_ws(bytes, j);
    if bytes.get(j) != Some(&b'(') {
        return None;
    }
    j += 1;
    Some((j, type_text.to_string(), endian))
}

/// Scans forward from `start` for `stop`, bailing (returning `None`) if a
/// statement separator or EOF is reached first — the scan never crosses a
/// plausible statement boundary, which is how it avoids recursing into
/// unrelated brace/paren structure.
fn scan_until(source: &str, start: usize, stop: u8) -> Option<(usize, &str)> {
    let bytes = source.as_bytes();
    let mut j = start;
    while j < bytes.len() {
        let b = bytes[j];
        if b == stop {
            return Some((j, source[start..j].trim()));
        }
        if b == b'\n' || b == b';' {
            return None;
        }
        j += 1;
    }
    None
}

fn skip_inline_ws(bytes: &[u8], mut j: usize) -> usize {
    while matches!(bytes.get(j), Some(b' ') | Some(b'\t')) {
        j += 1;
    }
    j
}

fn is_ident_continue(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric() || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_both_direction_channel_literal() {
        let (out, table, diags) = preprocess("ch := &chan int32{cap: 10}", "a.x");
        assert_eq!(out, "ch := __moxie_chan_both[int32]{cap: 10}");
        assert_eq!(table.len(), 1);
        assert!(diags.is_empty());
    }

    #[test]
    fn rewrites_send_only_channel_literal() {
        let (out, _table, _diags) = preprocess("ch := &chan<- int32{cap: 1}", "a.x");
        assert_eq!(out, "ch := __moxie_chan_send[int32]{cap: 1}");
    }

    #[test]
    fn rewrites_recv_only_channel_literal() {
        let (out, _table, _diags) = preprocess("ch := &<-chan int32{cap: 1}", "a.x");
        assert_eq!(out, "ch := __moxie_chan_recv[int32]{cap: 1}");
    }

    #[test]
    fn rewrites_little_endian_coercion() {
        let (out, _table, _diags) = preprocess("u := (*[]uint32, LittleEndian)(bytes)", "a.x");
        assert_eq!(out, "u := __moxie_le[uint32](bytes)");
    }

    #[test]
    fn rewrites_big_endian_coercion() {
        let (out, _table, _diags) = preprocess("u := (*[]uint32, BigEndian)(bytes)", "a.x");
        assert_eq!(out, "u := __moxie_be[uint32](bytes)");
    }

    #[test]
    fn rewrites_native_endian_coercion_to_plain_form() {
        let (out, _table, _diags) = preprocess("u := (*[]uint32, NativeEndian)(bytes)", "a.x");
        assert_eq!(out, "u := (*[]uint32)(bytes)");
    }

    #[test]
    fn unknown_endian_name_raises_e_endian_name_and_still_parses() {
        let (out, _table, diags) = preprocess("u := (*[]uint32, MiddleEndian)(bytes)", "a.x");
        assert_eq!(out, "u := (*[]uint32)(bytes)");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule.code(), "E_ENDIAN_NAME");
        assert!(diags[0].message.contains("MiddleEndian"));
        assert!(!diags[0].position.synthetic);
    }

    #[test]
    fn unknown_endian_name_position_points_at_the_bad_identifier() {
        let src = "u := (*[]uint32, MiddleEndian)(bytes)";
        let (_out, _table, diags) = preprocess(src, "a.x");
        let ident_offset = src.find("MiddleEndian").unwrap();
        assert_eq!(diags[0].position.byte_offset, ident_offset);
    }

    #[test]
    fn leaves_ordinary_address_of_expressions_untouched() {
        let (out, table, diags) = preprocess("p := &x\nq := &chanList", "a.x");
        assert_eq!(out, "p := &x\nq := &chanList");
        assert!(table.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn leaves_native_coercion_without_tag_untouched() {
        let (out, table, diags) = preprocess("u := (*[]uint32)(bytes)", "a.x");
        assert_eq!(out, "u := (*[]uint32)(bytes)");
        assert!(table.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn does_not_recurse_into_nested_braces() {
        // The literal body (after the opening brace) is left completely
        // untouched, nested braces and all -- stage A only rewrites the head.
        let (out, _table, _diags) = preprocess("&chan int32{cap: f(struct{}{})}", "a.x");
        assert_eq!(out, "__moxie_chan_both[int32]{cap: f(struct{}{})}");
    }

    #[test]
    fn reverse_offset_maps_synthetic_span_back_to_original() {
        let (out, table, _diags) = preprocess("ch := &chan int32{cap: 10}", "a.x");
        let synth_start = out.find("__moxie_chan_both").unwrap();
        let orig = table.reverse_offset(synth_start).unwrap();
        assert_eq!(orig, "ch := ".len());
    }

    #[test]
    fn restore_text_rewrites_surrogate_prefix_in_message() {
        let msg = "cannot use __moxie_chan_both[int32] here";
        assert_eq!(RemapTable::restore_text(msg), "cannot use &chan[int32] here");
    }

    #[test]
    fn reverse_diagnostics_clears_synthetic_flag_effects() {
        let original = "ch := &chan int32{cap: 10}";
        let (out, table, _diags) = preprocess(original, "a.x");
        let synth_start = out.find("__moxie_chan_both").unwrap() as usize;
        let (line, column) = moxie_base::line_column(&out, synth_start);
        let pos = Position::new("a.x", synth_start, line, column).as_synthetic();
        let diag = Diagnostic::error(pos, moxie_base::RuleId::Syntax, "bad __moxie_chan_both[int32] literal");
        let fixed = table.reverse_diagnostics(vec![diag], original);
        assert_eq!(fixed[0].position.byte_offset, "ch := ".len());
        assert!(fixed[0].message.contains("&chan"));
    }
}
