//! Brace-based, single-pass lexer.
//!
//! Unlike the teacher's two-stage `LineLexer` (which first splits on
//! indentation because natural-language paragraphs carry no brace
//! structure), Moxie source is fully brace-delimited, so one left-to-right
//! scan over the byte buffer produces the whole token stream — no
//! indentation stack, no lookahead across lines.
//!
//! Automatic semicolon insertion follows Go's rule: a newline following an
//! identifier, literal, `break`/`continue`/`fallthrough`/`return`, `++`/`--`,
//! or a closing `)`/`]`/`}` is rewritten to an explicit [`Op::Semicolon`]
//! token. This keeps the parser's statement/declaration lists free of
//! special-casing for line breaks.

use crate::token::{Keyword, LitKind, Op, Token, TokenKind};
use moxie_base::{Diagnostic, Interner, RuleId, Span};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// `true` once a token has been emitted that triggers semicolon
    /// insertion before the next newline.
    insert_semi: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Lexes `source` into a token stream, interning identifiers through `interner`.
///
/// Never aborts early: lexical errors are pushed to the returned diagnostic
/// list and scanning continues from the next plausible token boundary, per
/// the pipeline-wide "accumulate, don't abort" convention.
pub fn lex(source: &str, interner: &mut Interner) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        insert_semi: false,
        diagnostics: Vec::new(),
    };
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token(interner);
        let is_eof = tok.is_eof();
        tokens.push(tok);
        if is_eof {
            break;
        }
    }
    (tokens, lexer.diagnostics)
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn error(&mut self, span: Span, rule: RuleId, message: impl Into<String>) {
        let (line, column) = moxie_base::line_column(self.source, span.start);
        let position = moxie_base::Position::new(std::path::PathBuf::new(), span.start, line, column);
        self.diagnostics.push(Diagnostic::error(position, rule, message));
    }

    /// Skips whitespace, comments, and `\r` (CRLF normalization happens here:
    /// a `\r` is consumed silently and never reaches the column counter).
    /// Emits a synthetic `;` when a newline falls where Go's ASI rule fires.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            match self.peek() {
                Some(b'\r') => {
                    self.pos += 1;
                }
                Some(b'\n') => {
                    self.pos += 1;
                    if self.insert_semi {
                        self.insert_semi = false;
                        return Some(Token::new(TokenKind::Op(Op::Semicolon), Span::new(self.pos - 1, self.pos)));
                    }
                }
                Some(b' ') | Some(b'\t') => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut closed = false;
                    let mut saw_newline = false;
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            saw_newline = true;
                        }
                        if b == b'*' && self.peek_at(1) == Some(b'/') {
                            self.pos += 2;
                            closed = true;
                            break;
                        }
                        self.pos += 1;
                    }
                    if !closed {
                        self.error(Span::new(start, self.pos), RuleId::Syntax, "unterminated block comment");
                    } else if saw_newline && self.insert_semi {
                        self.insert_semi = false;
                        return Some(Token::new(TokenKind::Op(Op::Semicolon), Span::new(start, start + 1)));
                    }
                }
                _ => return None,
            }
        }
    }

    fn next_token(&mut self, interner: &mut Interner) -> Token {
        if let Some(semi) = self.skip_trivia() {
            return semi;
        }
        let start = self.pos;
        let Some(b) = self.peek() else {
            let was_insert = self.insert_semi;
            self.insert_semi = false;
            if was_insert {
                return Token::new(TokenKind::Op(Op::Semicolon), Span::new(start, start));
            }
            return Token::new(TokenKind::Eof, Span::new(start, start));
        };

        if is_ident_start(b) {
            return self.lex_ident_or_keyword(interner, start);
        }
        if b.is_ascii_digit() {
            return self.lex_number(start, interner);
        }
        if b == b'"' || b == b'`' {
            return self.lex_string(start, interner);
        }
        if b == b'\'' {
            return self.lex_rune(start, interner);
        }
        self.lex_operator(start)
    }

    fn lex_ident_or_keyword(&mut self, interner: &mut Interner, start: usize) -> Token {
        while matches!(self.peek(), Some(b) if is_ident_continue(b)) {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        let span = Span::new(start, self.pos);
        if let Some(kw) = Keyword::lookup(text) {
            // Go's ASI rule fires after only these four keywords, never
            // after e.g. `if`/`for`/`func`/`else` (a newline there is mid-construct).
            self.insert_semi = matches!(
                kw,
                Keyword::Break | Keyword::Continue | Keyword::Fallthrough | Keyword::Return
            );
            return Token::new(TokenKind::Keyword(kw), span);
        }
        self.insert_semi = true;
        let sym = interner.intern(text);
        Token::new(TokenKind::Ident(sym), span)
    }

    fn lex_number(&mut self, start: usize, interner: &mut Interner) -> Token {
        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'_') {
            self.pos += 1;
        }
        let mut kind = LitKind::Int;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b) if b.is_ascii_digit()) {
            kind = LitKind::Float;
            self.pos += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            kind = LitKind::Float;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if self.peek() == Some(b'i') {
            kind = LitKind::Imaginary;
            self.pos += 1;
        }
        let span = Span::new(start, self.pos);
        self.insert_semi = true;
        let text = interner.intern(&self.source[start..self.pos]);
        Token::new(TokenKind::Literal { kind, text }, span)
    }

    fn lex_string(&mut self, start: usize, interner: &mut Interner) -> Token {
        let quote = self.advance().unwrap();
        let raw = quote == b'`';
        loop {
            match self.peek() {
                None => {
                    self.error(Span::new(start, self.pos), RuleId::UnexpectedEof, "unterminated string literal");
                    break;
                }
                Some(b'\\') if !raw => {
                    self.pos += 1;
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        let span = Span::new(start, self.pos);
        self.insert_semi = true;
        let text = interner.intern(&self.source[start..self.pos]);
        Token::new(TokenKind::Literal { kind: LitKind::String, text }, span)
    }

    fn lex_rune(&mut self, start: usize, interner: &mut Interner) -> Token {
        self.pos += 1;
        loop {
            match self.peek() {
                None => {
                    self.error(Span::new(start, self.pos), RuleId::UnexpectedEof, "unterminated rune literal");
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    if self.peek().is_some() {
                        self.pos += 1;
                    }
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        let span = Span::new(start, self.pos);
        self.insert_semi = true;
        let text = interner.intern(&self.source[start..self.pos]);
        Token::new(TokenKind::Literal { kind: LitKind::Rune, text }, span)
    }

    fn lex_operator(&mut self, start: usize) -> Token {
        // Longest-match-first over multi-byte operators.
        const THREE: &[(&str, Op)] = &[("<<=", Op::ShlAssign), ("&^=", Op::AndNotAssign), (">>=", Op::ShrAssign)];
        const TWO: &[(&str, Op)] = &[
            (":=", Op::Define),
            ("==", Op::Eq),
            ("!=", Op::NotEq),
            ("<=", Op::LtEq),
            (">=", Op::GtEq),
            ("&&", Op::LogicalAnd),
            ("||", Op::LogicalOr),
            ("<-", Op::Arrow),
            ("++", Op::Inc),
            ("--", Op::Dec),
            ("+=", Op::PlusAssign),
            ("-=", Op::MinusAssign),
            ("*=", Op::StarAssign),
            ("/=", Op::SlashAssign),
            ("%=", Op::PercentAssign),
            ("&=", Op::AmpAssign),
            ("|=", Op::PipeAssign),
            ("^=", Op::CaretAssign),
            ("<<", Op::Shl),
            (">>", Op::Shr),
            ("&^", Op::AndNot),
        ];
        let rest = &self.source[self.pos..];
        if rest.starts_with("...") {
            self.pos += 3;
            return self.finish_op(start, Op::Ellipsis);
        }
        for (text, op) in THREE {
            if rest.starts_with(text) {
                self.pos += 3;
                return self.finish_op(start, *op);
            }
        }
        for (text, op) in TWO {
            if rest.starts_with(text) {
                self.pos += 2;
                return self.finish_op(start, *op);
            }
        }
        let b = self.advance().unwrap();
        let op = match b {
            b'(' => Op::LParen,
            b')' => {
                self.insert_semi = true;
                Op::RParen
            }
            b'{' => Op::LBrace,
            b'}' => {
                self.insert_semi = true;
                Op::RBrace
            }
            b'[' => Op::LBracket,
            b']' => {
                self.insert_semi = true;
                Op::RBracket
            }
            b',' => Op::Comma,
            b';' => Op::Semicolon,
            b':' => Op::Colon,
            b'.' => Op::Dot,
            b'=' => Op::Assign,
            b'+' => Op::Plus,
            b'-' => Op::Minus,
            b'*' => Op::Star,
            b'/' => Op::Slash,
            b'%' => Op::Percent,
            b'&' => Op::Amp,
            b'|' => Op::Pipe,
            b'^' => Op::Caret,
            b'<' => Op::Lt,
            b'>' => Op::Gt,
            b'!' => Op::Not,
            b'~' => Op::Tilde,
            other => {
                let span = Span::new(start, self.pos);
                self.error(span, RuleId::Syntax, format!("unexpected byte 0x{other:02x}"));
                return Token::new(TokenKind::Op(Op::Semicolon), span);
            }
        };
        let span = Span::new(start, self.pos);
        if !matches!(op, Op::RParen | Op::RBrace | Op::RBracket) {
            self.insert_semi = false;
        }
        Token::new(TokenKind::Op(op), span)
    }

    fn finish_op(&mut self, start: usize, op: Op) -> Token {
        self.insert_semi = false;
        Token::new(TokenKind::Op(op), Span::new(start, self.pos))
    }
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic() || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_kinds(src: &str) -> Vec<TokenKind> {
        let mut interner = Interner::new();
        let (tokens, diags) = lex(src, &mut interner);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_package_clause() {
        let kinds = lex_kinds("package main");
        assert!(matches!(kinds[0], TokenKind::Keyword(Keyword::Package)));
        assert!(matches!(kinds[1], TokenKind::Ident(_)));
    }

    #[test]
    fn inserts_semicolon_after_identifier_newline() {
        let kinds = lex_kinds("x\ny");
        assert!(matches!(kinds[0], TokenKind::Ident(_)));
        assert!(matches!(kinds[1], TokenKind::Op(Op::Semicolon)));
        assert!(matches!(kinds[2], TokenKind::Ident(_)));
    }

    #[test]
    fn does_not_insert_semicolon_after_operator_newline() {
        let kinds = lex_kinds("x +\ny");
        assert!(matches!(kinds[0], TokenKind::Ident(_)));
        assert!(matches!(kinds[1], TokenKind::Op(Op::Plus)));
        assert!(matches!(kinds[2], TokenKind::Ident(_)));
    }

    #[test]
    fn inserts_semicolon_after_closing_brace_newline() {
        let kinds = lex_kinds("}\nx");
        assert!(matches!(kinds[0], TokenKind::Op(Op::RBrace)));
        assert!(matches!(kinds[1], TokenKind::Op(Op::Semicolon)));
    }

    #[test]
    fn recognizes_three_index_slice_operator_shape() {
        let kinds = lex_kinds("a[1:2:3]");
        assert!(kinds.contains(&TokenKind::Op(Op::Colon)));
    }

    #[test]
    fn recognizes_arrow_and_define() {
        let kinds = lex_kinds("x := <-ch");
        assert!(kinds.contains(&TokenKind::Op(Op::Define)));
        assert!(kinds.contains(&TokenKind::Op(Op::Arrow)));
    }

    #[test]
    fn line_comment_does_not_suppress_semicolon_insertion() {
        let kinds = lex_kinds("x // trailing\ny");
        assert!(matches!(kinds[0], TokenKind::Ident(_)));
        assert!(matches!(kinds[1], TokenKind::Op(Op::Semicolon)));
    }

    #[test]
    fn unterminated_string_reports_diagnostic() {
        let mut interner = Interner::new();
        let (_tokens, diags) = lex("\"abc", &mut interner);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule.code(), "E_UNEXPECTED_EOF");
    }
}
