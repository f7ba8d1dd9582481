//! Recursive-descent parser: tokens in, AST out.
//!
//! Moxie's grammar is LL(1) after one token of lookahead almost everywhere;
//! the one place it isn't (`F[T]` could be a generic instantiation or an
//! index expression, `(expr)` could be a coercion or a parenthesized
//! expression) is resolved by a small speculative parse with backtracking
//! (see [`Parser::try_parse`]), never a generated table.
//!
//! There is no intermediate concrete parse tree: the recursive-descent
//! functions build [`crate::ast`] nodes directly. On a local syntax error,
//! parsing emits a `Bad*` node and resynchronizes at the next statement
//! boundary rather than aborting; the parser itself never panics.

use crate::ast::*;
use crate::token::{Keyword, LitKind, Op, Token, TokenKind};
use moxie_base::{Diagnostic, Interner, RuleId, Span, Symbol};
use std::path::{Path, PathBuf};

/// Parses one preprocessed source unit into a [`File`] plus accumulated
/// diagnostics. Never aborts early: on a local syntax error, parsing
/// resynchronizes at the next `;` or declaration keyword and keeps going,
/// so later errors in the same unit are still reported.
pub fn parse(source: &str, filename: impl AsRef<Path>, interner: &mut Interner) -> (File, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = crate::lexer::lex(source, interner);
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        filename: filename.as_ref().to_path_buf(),
        interner,
        diagnostics: Vec::new(),
    };
    let file = parser.parse_file();
    diagnostics.append(&mut parser.diagnostics);
    (file, diagnostics)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    filename: PathBuf,
    interner: &'a mut Interner,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    // ---- token cursor helpers -------------------------------------------------

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn cur_kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn cur_span(&self) -> Span {
        self.cur().span
    }

    fn at_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_op(&self, op: Op) -> bool {
        matches!(self.cur_kind(), TokenKind::Op(o) if *o == op)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.cur_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn position_at(&self, offset: usize) -> moxie_base::Position {
        let (line, column) = moxie_base::line_column(self.source, offset);
        moxie_base::Position::new(self.filename.clone(), offset, line, column)
    }

    fn error(&mut self, span: Span, rule: RuleId, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(self.position_at(span.start), rule, message));
    }

    fn expect_op(&mut self, op: Op, what: &str) -> Span {
        if self.at_op(op) {
            self.bump().span
        } else {
            let span = self.cur_span();
            self.error(span, RuleId::Syntax, format!("expected {what}"));
            span
        }
    }

    fn expect_ident(&mut self, what: &str) -> (Symbol, Span) {
        let span = self.cur_span();
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            self.bump();
            (sym, span)
        } else {
            self.error(span, RuleId::Syntax, format!("expected {what}"));
            (Symbol::EMPTY, span)
        }
    }

    fn ident_text(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    /// Consumes statement separators. Go-style ASI means most statements are
    /// already semicolon-terminated by the lexer; this also tolerates a
    /// missing trailing separator before a closing brace.
    fn eat_semis(&mut self) {
        while self.eat_op(Op::Semicolon) {}
    }

    /// Runs `f` speculatively: on `None`, rewinds the cursor and drops any
    /// diagnostics `f` pushed. Used only where the grammar is genuinely
    /// ambiguous on one token of lookahead (generic instantiation vs index).
    fn try_parse<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let save_pos = self.pos;
        let save_diag = self.diagnostics.len();
        let result = f(self);
        if result.is_none() {
            self.pos = save_pos;
            self.diagnostics.truncate(save_diag);
        }
        result
    }

    /// Skips forward to the next `;` or a token that plausibly starts a new
    /// top-level declaration, so one bad statement doesn't poison the rest
    /// of the file.
    fn resync(&mut self) {
        loop {
            if self.at_eof() {
                return;
            }
            if self.eat_op(Op::Semicolon) {
                return;
            }
            if self.at_kw(Keyword::Func)
                || self.at_kw(Keyword::Const)
                || self.at_kw(Keyword::Var)
                || self.at_kw(Keyword::Type)
                || self.at_kw(Keyword::Import)
                || self.at_op(Op::RBrace)
            {
                return;
            }
            self.bump();
        }
    }

    // ---- file / declarations ---------------------------------------------------

    fn parse_file(&mut self) -> File {
        let start = self.cur_span();
        self.eat_semis();
        let package = if self.eat_kw(Keyword::Package) {
            let (name, _) = self.expect_ident("package name");
            name
        } else {
            self.error(self.cur_span(), RuleId::Syntax, "expected 'package' clause");
            Symbol::EMPTY
        };
        self.eat_semis();
        let mut decls = Vec::new();
        while !self.at_eof() {
            let decl = self.parse_top_level_decl();
            decls.push(decl);
            self.eat_semis();
        }
        let end = self.tokens.last().map(|t| t.span).unwrap_or(start);
        File {
            package,
            decls,
            span: start.merge(end),
        }
    }

    fn parse_top_level_decl(&mut self) -> Decl {
        let span = self.cur_span();
        if self.at_kw(Keyword::Import) {
            return self.parse_import_decl();
        }
        if self.at_kw(Keyword::Const) {
            return self.parse_const_decl();
        }
        if self.at_kw(Keyword::Var) {
            return self.parse_var_decl();
        }
        if self.at_kw(Keyword::Type) {
            return self.parse_type_decl();
        }
        if self.at_kw(Keyword::Func) {
            return self.parse_func_decl();
        }
        self.error(span, RuleId::Syntax, "expected a declaration");
        self.resync();
        Decl::Bad { span }
    }

    fn parse_group<T>(&mut self, mut one: impl FnMut(&mut Self) -> T) -> Vec<T> {
        if self.eat_op(Op::LParen) {
            let mut specs = Vec::new();
            self.eat_semis();
            while !self.at_op(Op::RParen) && !self.at_eof() {
                specs.push(one(self));
                self.eat_semis();
            }
            self.expect_op(Op::RParen, "')'");
            specs
        } else {
            vec![one(self)]
        }
    }

    fn parse_import_decl(&mut self) -> Decl {
        let start = self.bump().span; // 'import'
        let specs = self.parse_group(|p| p.parse_import_spec());
        let end_span = specs.last().map(|s: &ImportSpec| s.span).unwrap_or(start);
        Decl::Import {
            specs,
            span: start.merge(end_span),
        }
    }

    fn parse_import_spec(&mut self) -> ImportSpec {
        let start = self.cur_span();
        let alias = if let TokenKind::Ident(sym) = *self.cur_kind() {
            self.bump();
            Some(sym)
        } else if self.eat_op(Op::Dot) {
            Some(self.interner.intern("."))
        } else {
            None
        };
        let path_span = self.cur_span();
        let path = if let TokenKind::Literal { kind: LitKind::String, text } = *self.cur_kind() {
            self.bump();
            text
        } else {
            self.error(path_span, RuleId::Syntax, "expected an import path string");
            Symbol::EMPTY
        };
        ImportSpec {
            path,
            alias,
            span: start.merge(path_span),
        }
    }

    fn parse_const_decl(&mut self) -> Decl {
        let start = self.bump().span; // 'const'
        let specs = self.parse_group(|p| p.parse_const_spec());
        let end_span = specs.last().map(|s: &ConstSpec| s.span).unwrap_or(start);
        Decl::Const {
            specs,
            span: start.merge(end_span),
        }
    }

    fn parse_const_spec(&mut self) -> ConstSpec {
        let start = self.cur_span();
        let names = self.parse_ident_list();
        let ty = if !self.at_op(Op::Assign) && !self.at_op(Op::Semicolon) && !self.at_op(Op::RParen) {
            Some(self.parse_type())
        } else {
            None
        };
        let values = if self.eat_op(Op::Assign) { self.parse_expr_list() } else { Vec::new() };
        let end = values.last().map(|e| e.span()).or(ty.as_ref().map(|t| t.span())).unwrap_or(start);
        ConstSpec {
            names,
            ty,
            values,
            span: start.merge(end),
        }
    }

    fn parse_var_decl(&mut self) -> Decl {
        let start = self.bump().span; // 'var'
        let specs = self.parse_group(|p| p.parse_var_spec());
        let end_span = specs.last().map(|s: &VarSpec| s.span).unwrap_or(start);
        Decl::Var {
            specs,
            span: start.merge(end_span),
        }
    }

    fn parse_var_spec(&mut self) -> VarSpec {
        let start = self.cur_span();
        let names = self.parse_ident_list();
        let ty = if !self.at_op(Op::Assign) && !self.at_op(Op::Semicolon) && !self.at_op(Op::RParen) {
            Some(self.parse_type())
        } else {
            None
        };
        let values = if self.eat_op(Op::Assign) { self.parse_expr_list() } else { Vec::new() };
        let end = values.last().map(|e| e.span()).or(ty.as_ref().map(|t| t.span())).unwrap_or(start);
        VarSpec {
            names,
            ty,
            values,
            span: start.merge(end),
        }
    }

    fn parse_ident_list(&mut self) -> Vec<Symbol> {
        let mut names = vec![self.expect_ident("identifier").0];
        while self.eat_op(Op::Comma) {
            names.push(self.expect_ident("identifier").0);
        }
        names
    }

    fn parse_type_decl(&mut self) -> Decl {
        let start = self.bump().span; // 'type'
        let specs = self.parse_group(|p| p.parse_type_spec());
        let end_span = specs.last().map(|s: &TypeSpec| s.span).unwrap_or(start);
        Decl::Type {
            specs,
            span: start.merge(end_span),
        }
    }

    fn parse_type_spec(&mut self) -> TypeSpec {
        let start = self.cur_span();
        let (name, _) = self.expect_ident("type name");
        let type_params = if self.at_op(Op::LBracket) { self.parse_type_param_list() } else { Vec::new() };
        let assign = if self.at_op(Op::Assign) { Some(self.bump().span) } else { None };
        let ty = self.parse_type();
        TypeSpec {
            name,
            type_params,
            assign,
            span: start.merge(ty.span()),
            ty,
        }
    }

    fn parse_type_param_list(&mut self) -> Vec<TypeParam> {
        self.expect_op(Op::LBracket, "'['");
        let mut params = Vec::new();
        while !self.at_op(Op::RBracket) && !self.at_eof() {
            let start = self.cur_span();
            let mut names = vec![self.expect_ident("type parameter").0];
            while self.eat_op(Op::Comma) && !self.at_op(Op::RBracket) {
                // A comma could separate names sharing a constraint, or the
                // next param entirely; look for a following constraint type.
                names.push(self.expect_ident("type parameter").0);
            }
            let constraint = if !self.at_op(Op::RBracket) && !self.at_op(Op::Comma) {
                Some(Box::new(self.parse_type()))
            } else {
                None
            };
            let span = start.merge(constraint.as_ref().map(|c| c.span()).unwrap_or(start));
            for name in names {
                params.push(TypeParam {
                    name,
                    constraint: constraint.clone(),
                    span,
                });
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RBracket, "']'");
        params
    }

    fn parse_func_decl(&mut self) -> Decl {
        let start = self.bump().span; // 'func'
        let receiver = if self.at_op(Op::LParen) { Some(self.parse_receiver()) } else { None };
        let (name, _) = self.expect_ident("function name");
        let type_params = if self.at_op(Op::LBracket) { self.parse_type_param_list() } else { Vec::new() };
        let sig = self.parse_func_sig_rest(type_params, start);
        let body = if self.at_op(Op::LBrace) { Some(self.parse_block()) } else { None };
        let end = body.as_ref().map(|b| b.span).unwrap_or(sig.span);
        Decl::Func {
            name,
            receiver,
            sig,
            body,
            span: start.merge(end),
        }
    }

    fn parse_receiver(&mut self) -> Field {
        let start = self.expect_op(Op::LParen, "'('");
        let mut names = Vec::new();
        // `(r Type)` or `(Type)`. A leading identifier followed by another
        // type-starting token is a receiver name; otherwise it's the type.
        let save = self.pos;
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            self.bump();
            if !self.at_op(Op::RParen) {
                names.push(sym);
            } else {
                self.pos = save;
            }
        }
        let ty = Box::new(self.parse_type());
        let end = self.expect_op(Op::RParen, "')'");
        Field {
            names,
            ty,
            span: start.merge(end),
        }
    }

    fn parse_func_sig_rest(&mut self, type_params: Vec<TypeParam>, start: Span) -> FuncSig {
        let (params, variadic) = self.parse_param_list();
        let results = self.parse_result_list();
        let end = results.last().map(|f| f.span).unwrap_or(start);
        FuncSig {
            type_params,
            params,
            results,
            variadic,
            span: start.merge(end),
        }
    }

    fn parse_func_sig(&mut self) -> FuncSig {
        let start = self.cur_span();
        self.parse_func_sig_rest(Vec::new(), start)
    }

    /// Parses `(p1, p2 T1, p3 T2, ...)`. Go's rule is "either every
    /// parameter in the list has a name, or none do": a bare identifier
    /// directly followed by `,` or `)` can't be classified until a later
    /// entry in the group either supplies a shared type (making it a name)
    /// or turns out to be a type itself (making every deferred identifier
    /// its own unnamed parameter). `pending_names` carries that deferred
    /// decision across entries.
    fn parse_param_list(&mut self) -> (Vec<Field>, bool) {
        self.expect_op(Op::LParen, "'('");
        let mut fields = Vec::new();
        let mut variadic = false;
        let mut pending_names: Vec<(Symbol, Span)> = Vec::new();

        while !self.at_op(Op::RParen) && !self.at_eof() {
            let start = self.cur_span();
            let ellipsis = self.eat_op(Op::Ellipsis);
            if !ellipsis {
                if let TokenKind::Ident(sym) = *self.cur_kind() {
                    let save = self.pos;
                    self.bump();
                    if self.at_op(Op::Comma) || self.at_op(Op::RParen) {
                        pending_names.push((sym, start));
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                        continue;
                    }
                    self.pos = save;
                }
            }
            let mut names = Vec::new();
            if !ellipsis {
                if let TokenKind::Ident(sym) = *self.cur_kind() {
                    let save = self.pos;
                    self.bump();
                    if !self.at_op(Op::Comma) && !self.at_op(Op::RParen) {
                        names.push(sym);
                    } else {
                        self.pos = save;
                    }
                }
            }
            let elem_ellipsis = ellipsis || self.eat_op(Op::Ellipsis);
            let ty = Box::new(self.parse_type());
            if elem_ellipsis {
                variadic = true;
            }
            if names.is_empty() && !pending_names.is_empty() {
                for (sym, nspan) in pending_names.drain(..) {
                    fields.push(Field {
                        names: Vec::new(),
                        span: nspan,
                        ty: Box::new(Type::Identifier { name: sym, span: nspan }),
                    });
                }
                fields.push(Field {
                    names: Vec::new(),
                    span: start.merge(ty.span()),
                    ty,
                });
            } else {
                let mut all_names: Vec<Symbol> = pending_names.drain(..).map(|(s, _)| s).collect();
                all_names.extend(names);
                fields.push(Field {
                    span: start.merge(ty.span()),
                    names: all_names,
                    ty,
                });
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        for (sym, span) in pending_names.drain(..) {
            fields.push(Field {
                names: Vec::new(),
                span,
                ty: Box::new(Type::Identifier { name: sym, span }),
            });
        }
        self.expect_op(Op::RParen, "')'");
        (fields, variadic)
    }

    fn parse_result_list(&mut self) -> Vec<Field> {
        if self.at_op(Op::LParen) {
            self.parse_param_list().0
        } else if self.starts_type() {
            let ty = Box::new(self.parse_type());
            vec![Field {
                names: Vec::new(),
                span: ty.span(),
                ty,
            }]
        } else {
            Vec::new()
        }
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.cur_kind(),
            TokenKind::Ident(_)
                | TokenKind::Op(Op::Star)
                | TokenKind::Op(Op::LBracket)
                | TokenKind::Op(Op::Arrow)
                | TokenKind::Op(Op::LParen)
                | TokenKind::Keyword(Keyword::Map)
                | TokenKind::Keyword(Keyword::Chan)
                | TokenKind::Keyword(Keyword::Struct)
                | TokenKind::Keyword(Keyword::Interface)
                | TokenKind::Keyword(Keyword::Func)
        )
    }

    // ---- types -------------------------------------------------------------

    fn parse_type(&mut self) -> Type {
        let start = self.cur_span();
        match self.cur_kind().clone() {
            TokenKind::Op(Op::Star) => {
                self.bump();
                self.parse_pointer_or_container(start, true)
            }
            TokenKind::Op(Op::LBracket) => {
                self.bump();
                if self.eat_op(Op::RBracket) {
                    let elem = Box::new(self.parse_type());
                    Type::Slice {
                        span: start.merge(elem.span()),
                        elem,
                        pointer: false,
                    }
                } else {
                    let len = Box::new(self.parse_expr());
                    self.expect_op(Op::RBracket, "']'");
                    let elem = Box::new(self.parse_type());
                    Type::Array {
                        span: start.merge(elem.span()),
                        len,
                        elem,
                    }
                }
            }
            TokenKind::Keyword(Keyword::Map) => {
                self.bump();
                self.expect_op(Op::LBracket, "'['");
                let key = Box::new(self.parse_type());
                self.expect_op(Op::RBracket, "']'");
                let value = Box::new(self.parse_type());
                Type::Map {
                    span: start.merge(value.span()),
                    key,
                    value,
                    pointer: false,
                }
            }
            TokenKind::Keyword(Keyword::Chan) => {
                self.bump();
                let direction = if self.eat_op(Op::Arrow) { ChanDirection::SendOnly } else { ChanDirection::Both };
                let elem = Box::new(self.parse_type());
                Type::Channel {
                    span: start.merge(elem.span()),
                    elem,
                    pointer: false,
                    direction,
                }
            }
            TokenKind::Op(Op::Arrow) => {
                self.bump();
                self.eat_kw(Keyword::Chan);
                let elem = Box::new(self.parse_type());
                Type::Channel {
                    span: start.merge(elem.span()),
                    elem,
                    pointer: false,
                    direction: ChanDirection::RecvOnly,
                }
            }
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_type(start),
            TokenKind::Keyword(Keyword::Interface) => self.parse_interface_type(start),
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let sig = self.parse_func_sig();
                Type::Function {
                    span: start.merge(sig.span),
                    sig,
                }
            }
            TokenKind::Op(Op::LParen) => {
                self.bump();
                let inner = Box::new(self.parse_type());
                let end = self.expect_op(Op::RParen, "')'");
                Type::Parenthesized {
                    span: start.merge(end),
                    inner,
                }
            }
            TokenKind::Ident(sym) => {
                self.bump();
                let text = self.ident_text(sym).to_string();
                let mut span = start;
                // Package-qualified type `pkg.Name`: collapse to the final name.
                let mut name = sym;
                if self.eat_op(Op::Dot) {
                    let (n, s) = self.expect_ident("type name");
                    name = n;
                    span = span.merge(s);
                }
                // Tolerate (but do not structurally model) generic type
                // arguments at a use site, e.g. `List[int32]`.
                if self.at_op(Op::LBracket) {
                    if let Some(end) = self.try_parse(|p| {
                        p.bump();
                        loop {
                            p.parse_type();
                            if !p.eat_op(Op::Comma) {
                                break;
                            }
                        }
                        if p.at_op(Op::RBracket) {
                            Some(p.bump().span)
                        } else {
                            None
                        }
                    }) {
                        span = span.merge(end);
                    }
                }
                if let Some(kind) = BasicTypeKind::lookup(&text) {
                    Type::Basic { kind, span }
                } else {
                    Type::Identifier { name, span }
                }
            }
            _ => {
                self.error(start, RuleId::Syntax, "expected a type");
                Type::Bad { span: start }
            }
        }
    }

    fn parse_pointer_or_container(&mut self, start: Span, pointer: bool) -> Type {
        match self.cur_kind().clone() {
            TokenKind::Op(Op::LBracket) => {
                self.bump();
                if self.eat_op(Op::RBracket) {
                    let elem = Box::new(self.parse_type());
                    Type::Slice {
                        span: start.merge(elem.span()),
                        elem,
                        pointer,
                    }
                } else {
                    // `*[N]T`: pointer-to-array, not a Moxie container; the
                    // array itself never carries the pointer flag.
                    let len = Box::new(self.parse_expr());
                    self.expect_op(Op::RBracket, "']'");
                    let elem = Box::new(self.parse_type());
                    let array = Type::Array {
                        span: start.merge(elem.span()),
                        len,
                        elem,
                    };
                    if pointer {
                        Type::Pointer {
                            span: start.merge(array.span()),
                            elem: Box::new(array),
                        }
                    } else {
                        array
                    }
                }
            }
            TokenKind::Keyword(Keyword::Map) => {
                self.bump();
                self.expect_op(Op::LBracket, "'['");
                let key = Box::new(self.parse_type());
                self.expect_op(Op::RBracket, "']'");
                let value = Box::new(self.parse_type());
                Type::Map {
                    span: start.merge(value.span()),
                    key,
                    value,
                    pointer,
                }
            }
            TokenKind::Keyword(Keyword::Chan) => {
                self.bump();
                let direction = if self.eat_op(Op::Arrow) { ChanDirection::SendOnly } else { ChanDirection::Both };
                let elem = Box::new(self.parse_type());
                Type::Channel {
                    span: start.merge(elem.span()),
                    elem,
                    pointer,
                    direction,
                }
            }
            TokenKind::Op(Op::Arrow) => {
                self.bump();
                self.eat_kw(Keyword::Chan);
                let elem = Box::new(self.parse_type());
                Type::Channel {
                    span: start.merge(elem.span()),
                    elem,
                    pointer,
                    direction: ChanDirection::RecvOnly,
                }
            }
            _ => {
                let elem = Box::new(self.parse_type());
                Type::Pointer {
                    span: start.merge(elem.span()),
                    elem,
                }
            }
        }
    }

    fn parse_struct_type(&mut self, start: Span) -> Type {
        self.bump(); // 'struct'
        self.expect_op(Op::LBrace, "'{'");
        let mut fields = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            fields.push(self.parse_field_decl());
            self.eat_semis();
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Type::Struct {
            span: start.merge(end),
            fields,
        }
    }

    fn parse_field_decl(&mut self) -> Field {
        let start = self.cur_span();
        // Embedded field: bare type, no name.
        let save = self.pos;
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            self.bump();
            if self.at_op(Op::Semicolon) || self.at_op(Op::RBrace) || self.at_op(Op::Dot) {
                let mut span = start;
                if self.eat_op(Op::Dot) {
                    let (_, s) = self.expect_ident("type name");
                    span = span.merge(s);
                }
                return Field {
                    names: Vec::new(),
                    span,
                    ty: Box::new(Type::Identifier { name: sym, span }),
                };
            }
            self.pos = save;
        }
        let names = self.parse_ident_list();
        let ty = Box::new(self.parse_type());
        Field {
            span: start.merge(ty.span()),
            names,
            ty,
        }
    }

    fn parse_interface_type(&mut self, start: Span) -> Type {
        self.bump(); // 'interface'
        self.expect_op(Op::LBrace, "'{'");
        let mut methods = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            let mstart = self.cur_span();
            let (name, _) = self.expect_ident("method or embedded interface name");
            let ty = if self.at_op(Op::LParen) {
                let sig = self.parse_func_sig();
                Box::new(Type::Function { span: sig.span, sig })
            } else {
                Box::new(Type::Identifier { name, span: mstart })
            };
            methods.push(Field {
                names: vec![name],
                span: mstart.merge(ty.span()),
                ty,
            });
            self.eat_semis();
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Type::Interface {
            span: start.merge(end),
            methods,
        }
    }

    // ---- statements ---------------------------------------------------------

    fn parse_block(&mut self) -> Block {
        let start = self.expect_op(Op::LBrace, "'{'");
        let mut stmts = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt());
            self.eat_semis();
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Block {
            stmts,
            span: start.merge(end),
        }
    }

    fn parse_stmt(&mut self) -> Stmt {
        let start = self.cur_span();
        match self.cur_kind().clone() {
            TokenKind::Op(Op::Semicolon) => {
                self.bump();
                Stmt::Empty { span: start }
            }
            TokenKind::Op(Op::LBrace) => {
                let block = self.parse_block();
                Stmt::Block {
                    span: block.span,
                    stmts: block.stmts,
                }
            }
            TokenKind::Keyword(Keyword::Const | Keyword::Var | Keyword::Type) => {
                let decl = self.parse_top_level_decl();
                Stmt::Decl {
                    span: start.merge(decl.span()),
                    decl: Box::new(decl),
                }
            }
            TokenKind::Keyword(Keyword::Go) => {
                self.bump();
                let call = Box::new(self.parse_expr());
                Stmt::Go {
                    span: start.merge(call.span()),
                    call,
                }
            }
            TokenKind::Keyword(Keyword::Defer) => {
                self.bump();
                let call = Box::new(self.parse_expr());
                Stmt::Defer {
                    span: start.merge(call.span()),
                    call,
                }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let results = if self.at_op(Op::Semicolon) || self.at_op(Op::RBrace) {
                    Vec::new()
                } else {
                    self.parse_expr_list()
                };
                let end = results.last().map(|e| e.span()).unwrap_or(start);
                Stmt::Return {
                    span: start.merge(end),
                    results,
                }
            }
            TokenKind::Keyword(kw @ (Keyword::Break | Keyword::Continue | Keyword::Fallthrough | Keyword::Goto)) => {
                self.bump();
                let kind = match kw {
                    Keyword::Break => BranchKind::Break,
                    Keyword::Continue => BranchKind::Continue,
                    Keyword::Fallthrough => BranchKind::Fallthrough,
                    _ => BranchKind::Goto,
                };
                let label = if matches!(kind, BranchKind::Break | BranchKind::Continue | BranchKind::Goto)
                    && matches!(self.cur_kind(), TokenKind::Ident(_))
                {
                    Some(self.expect_ident("label").0)
                } else {
                    None
                };
                Stmt::Branch {
                    span: start,
                    kind,
                    label,
                }
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_stmt(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_stmt(),
            TokenKind::Keyword(Keyword::Select) => self.parse_select_stmt(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_stmt(),
            _ => self.parse_simple_stmt_or_label(),
        }
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // 'if'
        let (init, cond) = self.parse_if_header();
        let then_branch = self.parse_block();
        let else_branch = if self.eat_kw(Keyword::Else) {
            if self.at_kw(Keyword::If) {
                Some(Box::new(self.parse_if_stmt()))
            } else {
                let block = self.parse_block();
                Some(Box::new(Stmt::Block {
                    span: block.span,
                    stmts: block.stmts,
                }))
            }
        } else {
            None
        };
        let end = else_branch.as_ref().map(|s| s.span()).unwrap_or(then_branch.span);
        Stmt::If {
            span: start.merge(end),
            init,
            cond: Box::new(cond),
            then_branch,
            else_branch,
        }
    }

    /// Parses the `[SimpleStmt ;] Expr` header shared by `if`/`switch`.
    fn parse_if_header(&mut self) -> (Option<Box<Stmt>>, Expr) {
        let first = self.parse_simple_stmt_expr_only();
        if self.eat_op(Op::Semicolon) {
            let cond = self.parse_expr();
            (Some(Box::new(first)), cond)
        } else {
            match first {
                Stmt::Expr { expr, .. } => (None, *expr),
                other => {
                    // A header that was actually an assignment/define with no
                    // following condition is a syntax error; recover with a
                    // bad condition so the block still parses.
                    let span = other.span();
                    self.error(span, RuleId::Syntax, "expected a condition expression");
                    (Some(Box::new(other)), Expr::Bad { span })
                }
            }
        }
    }

    /// Parses one simple statement (expr/send/incdec/assign) without
    /// consuming a trailing separator; used for `if`/`for`/`switch` headers.
    fn parse_simple_stmt_expr_only(&mut self) -> Stmt {
        self.parse_simple_stmt_inner()
    }

    fn parse_switch_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // 'switch'
        // Type switch: `switch [init;] [x :=] y.(type) { ... }`.
        if let Some(stmt) = self.try_parse(|p| p.try_parse_type_switch_header(start)) {
            return stmt;
        }
        let (init, tag) = if self.at_op(Op::LBrace) {
            (None, None)
        } else {
            let (i, t) = self.parse_if_header();
            (i, Some(Box::new(t)))
        };
        self.expect_op(Op::LBrace, "'{'");
        let mut cases = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            cases.push(self.parse_case_clause());
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Stmt::Switch {
            span: start.merge(end),
            init,
            tag,
            cases,
        }
    }

    /// Speculatively parses a type-switch header: `[init ;] [bind :=] expr
    /// . ( type )`. The init-clause and the guard's own `bind :=` are each
    /// optional and independent, so this tries, in order: a bind with no
    /// init, then an init followed optionally by its own bind, then bails
    /// to the caller's ordinary `switch` parse via [`Parser::try_parse`].
    fn try_parse_type_switch_header(&mut self, start: Span) -> Option<Stmt> {
        let mut init = None;
        let mut bind = self.try_parse_guard_bind();

        if bind.is_none() {
            let save = self.pos;
            let first = self.parse_simple_stmt_expr_only();
            if self.eat_op(Op::Semicolon) {
                init = Some(Box::new(first));
                bind = self.try_parse_guard_bind();
            } else {
                self.pos = save;
            }
        }

        let subject = self.parse_expr();
        self.expect_op(Op::Dot, "'.'");
        self.expect_op(Op::LParen, "'('");
        if !self.at_kw(Keyword::Type) {
            return None;
        }
        self.bump(); // 'type'
        self.expect_op(Op::RParen, "')'");
        self.expect_op(Op::LBrace, "'{'");
        let mut cases = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            cases.push(self.parse_type_case_clause());
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Some(Stmt::TypeSwitch {
            span: start.merge(end),
            init,
            bind,
            subject: Box::new(subject),
            cases,
        })
    }

    fn try_parse_guard_bind(&mut self) -> Option<Symbol> {
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            let save = self.pos;
            self.bump();
            if self.eat_op(Op::Define) {
                return Some(sym);
            }
            self.pos = save;
        }
        None
    }

    fn parse_case_clause(&mut self) -> CaseClause {
        let start = self.cur_span();
        let values = if self.eat_kw(Keyword::Case) {
            self.parse_expr_list()
        } else {
            self.expect_op_kw_default();
            Vec::new()
        };
        self.expect_op(Op::Colon, "':'");
        let mut body = Vec::new();
        self.eat_semis();
        while !self.at_kw(Keyword::Case) && !self.at_kw(Keyword::Default) && !self.at_op(Op::RBrace) && !self.at_eof() {
            body.push(self.parse_stmt());
            self.eat_semis();
        }
        let end = body.last().map(|s| s.span()).unwrap_or(start);
        CaseClause {
            values,
            body,
            span: start.merge(end),
        }
    }

    fn parse_type_case_clause(&mut self) -> TypeCaseClause {
        let start = self.cur_span();
        let types = if self.eat_kw(Keyword::Case) {
            let mut types = vec![self.parse_type()];
            while self.eat_op(Op::Comma) {
                types.push(self.parse_type());
            }
            types
        } else {
            self.expect_op_kw_default();
            Vec::new()
        };
        self.expect_op(Op::Colon, "':'");
        let mut body = Vec::new();
        self.eat_semis();
        while !self.at_kw(Keyword::Case) && !self.at_kw(Keyword::Default) && !self.at_op(Op::RBrace) && !self.at_eof() {
            body.push(self.parse_stmt());
            self.eat_semis();
        }
        let end = body.last().map(|s| s.span()).unwrap_or(start);
        TypeCaseClause {
            types,
            body,
            span: start.merge(end),
        }
    }

    fn expect_op_kw_default(&mut self) {
        if !self.eat_kw(Keyword::Default) {
            let span = self.cur_span();
            self.error(span, RuleId::Syntax, "expected 'case' or 'default'");
        }
    }

    fn parse_select_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // 'select'
        self.expect_op(Op::LBrace, "'{'");
        let mut cases = Vec::new();
        self.eat_semis();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            cases.push(self.parse_comm_clause());
        }
        let end = self.expect_op(Op::RBrace, "'}'");
        Stmt::Select {
            span: start.merge(end),
            cases,
        }
    }

    fn parse_comm_clause(&mut self) -> CommClause {
        let start = self.cur_span();
        let (direction, chan, value, bind, define) = if self.eat_kw(Keyword::Case) {
            self.parse_comm_case()
        } else {
            self.expect_op_kw_default();
            (None, None, None, Vec::new(), false)
        };
        self.expect_op(Op::Colon, "':'");
        let mut body = Vec::new();
        self.eat_semis();
        while !self.at_kw(Keyword::Case) && !self.at_kw(Keyword::Default) && !self.at_op(Op::RBrace) && !self.at_eof() {
            body.push(self.parse_stmt());
            self.eat_semis();
        }
        let end = body.last().map(|s| s.span()).unwrap_or(start);
        CommClause {
            direction,
            chan,
            value,
            bind,
            define,
            body,
            span: start.merge(end),
        }
    }

    #[allow(clippy::type_complexity)]
    fn parse_comm_case(&mut self) -> (Option<CommDirection>, Option<Expr>, Option<Expr>, Vec<Symbol>, bool) {
        // Receive form: `[v [, ok]] := <-ch` or `[v [, ok]] = <-ch`; send
        // form: `ch <- v`.
        let save = self.pos;
        let mut bind = Vec::new();
        let mut define = false;
        if let TokenKind::Ident(_) = self.cur_kind() {
            loop {
                if let TokenKind::Ident(sym) = *self.cur_kind() {
                    bind.push(sym);
                    self.bump();
                } else {
                    break;
                }
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
            if self.eat_op(Op::Define) {
                define = true;
            } else if self.eat_op(Op::Assign) {
                define = false;
            } else {
                bind.clear();
                self.pos = save;
            }
        }
        if (!bind.is_empty() || define) && self.at_op(Op::Arrow) {
            self.bump();
            let value = self.parse_expr();
            return (Some(CommDirection::Recv), None, Some(value), bind, define);
        }
        if !bind.is_empty() {
            self.pos = save;
        }
        let expr = self.parse_expr();
        if self.eat_op(Op::Arrow) {
            let value = self.parse_expr();
            (Some(CommDirection::Send), Some(expr), Some(value), Vec::new(), false)
        } else {
            (None, Some(expr), None, Vec::new(), false)
        }
    }

    fn parse_for_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // 'for'
        if self.at_op(Op::LBrace) {
            let body = self.parse_block();
            return Stmt::For {
                span: start.merge(body.span),
                init: None,
                cond: None,
                post: None,
                body,
            };
        }
        if let Some(range_stmt) = self.try_parse(|p| p.try_parse_range(start)) {
            return range_stmt;
        }
        // `for cond { }` or `for [init]; [cond]; [post] { }`.
        if !self.at_op(Op::Semicolon) && self.peek_is_range_free() {
            let cond = self.parse_expr();
            let body = self.parse_block();
            return Stmt::For {
                span: start.merge(body.span),
                init: None,
                cond: Some(Box::new(cond)),
                post: None,
                body,
            };
        }
        let init = if self.at_op(Op::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt_expr_only()))
        };
        self.expect_op(Op::Semicolon, "';'");
        let cond = if self.at_op(Op::Semicolon) { None } else { Some(Box::new(self.parse_expr())) };
        self.expect_op(Op::Semicolon, "';'");
        let post = if self.at_op(Op::LBrace) { None } else { Some(Box::new(self.parse_simple_stmt_expr_only())) };
        let body = self.parse_block();
        Stmt::For {
            span: start.merge(body.span),
            init,
            cond,
            post,
            body,
        }
    }

    /// `true` when the upcoming tokens look like a bare `for cond { }`
    /// rather than a three-clause header (no top-level `;` before `{`).
    fn peek_is_range_free(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        while i < self.tokens.len() {
            match &self.tokens[i].kind {
                TokenKind::Op(Op::LParen) | TokenKind::Op(Op::LBracket) => depth += 1,
                TokenKind::Op(Op::RParen) | TokenKind::Op(Op::RBracket) => depth -= 1,
                TokenKind::Op(Op::Semicolon) if depth == 0 => return false,
                TokenKind::Op(Op::LBrace) if depth == 0 => return true,
                TokenKind::Eof => return true,
                _ => {}
            }
            i += 1;
        }
        true
    }

    fn try_parse_range(&mut self, start: Span) -> Option<Stmt> {
        let mut key = None;
        let mut value = None;
        let mut define = false;
        if !self.at_kw(Keyword::Range) {
            // `k, v := range expr` or `k, v = range expr`.
            let mut exprs = vec![self.parse_unary_for_lvalue()?];
            while self.eat_op(Op::Comma) {
                exprs.push(self.parse_unary_for_lvalue()?);
            }
            if self.eat_op(Op::Define) {
                define = true;
            } else if !self.eat_op(Op::Assign) {
                return None;
            }
            let mut it = exprs.into_iter();
            key = it.next();
            value = it.next();
        }
        if !self.eat_kw(Keyword::Range) {
            return None;
        }
        let expr = self.parse_expr();
        let body = self.parse_block();
        Some(Stmt::Range {
            span: start.merge(body.span),
            key: key.map(Box::new),
            value: value.map(Box::new),
            define,
            expr: Box::new(expr),
            body,
        })
    }

    /// Parses a single identifier-or-blank lvalue for a range clause header
    /// without committing to the full assignment grammar.
    fn parse_unary_for_lvalue(&mut self) -> Option<Expr> {
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            let span = self.cur_span();
            self.bump();
            Some(Expr::Ident { name: sym, span })
        } else {
            None
        }
    }

    fn parse_simple_stmt_or_label(&mut self) -> Stmt {
        let start = self.cur_span();
        // Labeled statement: `ident ':' stmt`, distinguished from `ident :=`
        // by lookahead (`:=` is lexed as one token, `Define`, never `:` `=`).
        if let TokenKind::Ident(sym) = *self.cur_kind() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Op(Op::Colon))) {
                self.bump();
                self.bump();
                let stmt = Box::new(self.parse_stmt());
                return Stmt::Labeled {
                    span: start.merge(stmt.span()),
                    label: sym,
                    stmt,
                };
            }
        }
        self.parse_simple_stmt_inner()
    }

    fn parse_simple_stmt_inner(&mut self) -> Stmt {
        let start = self.cur_span();
        let first = self.parse_expr();
        if self.at_op(Op::Arrow) {
            self.bump();
            let value = self.parse_expr();
            return Stmt::Send {
                span: start.merge(value.span()),
                chan: Box::new(first),
                value,
            };
        }
        if self.at_op(Op::Inc) || self.at_op(Op::Dec) {
            let op = if self.eat_op(Op::Inc) { IncDecOp::Inc } else { self.bump(); IncDecOp::Dec };
            return Stmt::IncDec {
                span: start.merge(first.span()),
                expr: Box::new(first),
                op,
            };
        }
        if let Some(op) = self.assign_op() {
            self.bump();
            // Compound assigns are always single-target in Go's (and
            // Moxie's) grammar; only `=`/`:=` below support a comma list.
            let lhs = vec![first];
            let rhs = self.parse_expr_list();
            let end = rhs.last().map(|e| e.span()).unwrap_or(start);
            return Stmt::Assign {
                span: start.merge(end),
                lhs,
                op,
                rhs,
            };
        }
        if self.at_op(Op::Comma) {
            let mut lhs = vec![first];
            while self.eat_op(Op::Comma) {
                lhs.push(self.parse_expr());
            }
            let op = if let Some(op) = self.assign_op() {
                self.bump();
                op
            } else {
                let span = self.cur_span();
                self.error(span, RuleId::Syntax, "expected '=' or ':=' after expression list");
                AssignOp::Assign
            };
            let rhs = self.parse_expr_list();
            let end = rhs.last().map(|e| e.span()).unwrap_or(start);
            return Stmt::Assign {
                span: start.merge(end),
                lhs,
                op,
                rhs,
            };
        }
        Stmt::Expr {
            span: first.span(),
            expr: Box::new(first),
        }
    }

    fn assign_op(&self) -> Option<AssignOp> {
        let TokenKind::Op(op) = self.cur_kind() else { return None };
        Some(match op {
            Op::Assign => AssignOp::Assign,
            Op::Define => AssignOp::Define,
            Op::PlusAssign => AssignOp::AddAssign,
            Op::MinusAssign => AssignOp::SubAssign,
            Op::StarAssign => AssignOp::MulAssign,
            Op::SlashAssign => AssignOp::QuoAssign,
            Op::PercentAssign => AssignOp::RemAssign,
            Op::AmpAssign => AssignOp::AndAssign,
            Op::PipeAssign => AssignOp::OrAssign,
            Op::CaretAssign => AssignOp::XorAssign,
            Op::ShlAssign => AssignOp::ShlAssign,
            Op::ShrAssign => AssignOp::ShrAssign,
            Op::AndNotAssign => AssignOp::AndNotAssign,
            _ => return None,
        })
    }

    // ---- expressions --------------------------------------------------------

    fn parse_expr_list(&mut self) -> Vec<Expr> {
        let mut exprs = vec![self.parse_expr()];
        while self.eat_op(Op::Comma) {
            exprs.push(self.parse_expr());
        }
        exprs
    }

    fn parse_expr(&mut self) -> Expr {
        self.parse_binary(1)
    }

    fn binop_info(op: Op) -> Option<(BinaryOp, u8)> {
        Some(match op {
            Op::LogicalOr => (BinaryOp::LogicalOr, 1),
            Op::LogicalAnd => (BinaryOp::LogicalAnd, 2),
            Op::Eq => (BinaryOp::Eq, 3),
            Op::NotEq => (BinaryOp::NotEq, 3),
            Op::Lt => (BinaryOp::Lt, 3),
            Op::LtEq => (BinaryOp::LtEq, 3),
            Op::Gt => (BinaryOp::Gt, 3),
            Op::GtEq => (BinaryOp::GtEq, 3),
            Op::Plus => (BinaryOp::Add, 4),
            Op::Minus => (BinaryOp::Sub, 4),
            Op::Pipe => (BinaryOp::Or, 4),
            Op::Caret => (BinaryOp::Xor, 4),
            Op::Star => (BinaryOp::Mul, 5),
            Op::Slash => (BinaryOp::Quo, 5),
            Op::Percent => (BinaryOp::Rem, 5),
            Op::Shl => (BinaryOp::Shl, 5),
            Op::Shr => (BinaryOp::Shr, 5),
            Op::Amp => (BinaryOp::And, 5),
            Op::AndNot => (BinaryOp::AndNot, 5),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let TokenKind::Op(op) = *self.cur_kind() else { break };
            let Some((binop, prec)) = Self::binop_info(op) else { break };
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1);
            lhs = Expr::Binary {
                span: lhs.span().merge(rhs.span()),
                op: binop,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        let start = self.cur_span();
        match self.cur_kind().clone() {
            TokenKind::Op(op @ (Op::Plus | Op::Minus | Op::Not | Op::Caret)) => {
                self.bump();
                let expr = Box::new(self.parse_unary());
                Expr::Unary {
                    span: start.merge(expr.span()),
                    op: match op {
                        Op::Plus => UnaryOp::Plus,
                        Op::Minus => UnaryOp::Minus,
                        Op::Not => UnaryOp::Not,
                        _ => UnaryOp::Caret,
                    },
                    expr,
                }
            }
            TokenKind::Op(Op::Arrow) => {
                self.bump();
                let expr = Box::new(self.parse_unary());
                Expr::Unary {
                    span: start.merge(expr.span()),
                    op: UnaryOp::Recv,
                    expr,
                }
            }
            TokenKind::Op(Op::Star) => {
                self.bump();
                let expr = Box::new(self.parse_unary());
                Expr::Star {
                    span: start.merge(expr.span()),
                    expr,
                }
            }
            TokenKind::Op(Op::Amp) => self.parse_amp_expr(start),
            _ => self.parse_postfix_from_primary(),
        }
    }

    /// `&x` (address-of) vs `&[]T{...}` / `&map[K]V{...}` (container
    /// literals: composite literals of slice/map type must be introduced by
    /// `&`). Channel literals never reach here: the preprocessor rewrites
    /// `&chan ...` to a plain-identifier surrogate before this parser ever
    /// sees it (see `parse_primary`'s `__moxie_chan_*` handling).
    fn parse_amp_expr(&mut self, start: Span) -> Expr {
        self.bump(); // '&'
        if self.at_op(Op::LBracket) {
            let save = self.pos;
            self.bump();
            if self.eat_op(Op::RBracket) {
                let elem = Box::new(self.parse_type());
                self.expect_op(Op::LBrace, "'{'");
                let elements = self.parse_composite_elements();
                let end = self.expect_op(Op::RBrace, "'}'");
                return Expr::SliceLit {
                    span: start.merge(end),
                    elem,
                    elements,
                };
            }
            self.pos = save;
        }
        if self.at_kw(Keyword::Map) {
            self.bump();
            self.expect_op(Op::LBracket, "'['");
            let key = Box::new(self.parse_type());
            self.expect_op(Op::RBracket, "']'");
            let value = Box::new(self.parse_type());
            self.expect_op(Op::LBrace, "'{'");
            let elements = self.parse_composite_elements();
            let end = self.expect_op(Op::RBrace, "'}'");
            return Expr::MapLit {
                span: start.merge(end),
                key,
                value,
                elements,
            };
        }
        let expr = Box::new(self.parse_unary());
        Expr::Unary {
            span: start.merge(expr.span()),
            op: UnaryOp::Amp,
            expr,
        }
    }

    fn parse_composite_elements(&mut self) -> Vec<Expr> {
        let mut elements = Vec::new();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            let start = self.cur_span();
            let first = self.parse_expr();
            if self.eat_op(Op::Colon) {
                let value = Box::new(self.parse_expr());
                elements.push(Expr::KeyValue {
                    span: start.merge(value.span()),
                    key: Box::new(first),
                    value,
                });
            } else {
                elements.push(first);
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        elements
    }

    fn parse_postfix_from_primary(&mut self) -> Expr {
        let primary = self.parse_primary();
        self.parse_postfix(primary)
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.cur_span();
        match self.cur_kind().clone() {
            TokenKind::Op(Op::LParen) => self.parse_paren_or_coercion(start),
            TokenKind::Literal { kind, text } => {
                self.bump();
                Expr::BasicLit { span: start, kind, text }
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let sig = self.parse_func_sig();
                let body = self.parse_block();
                Expr::FuncLit {
                    span: start.merge(body.span),
                    sig,
                    body,
                }
            }
            TokenKind::Keyword(Keyword::Dlopen) => {
                self.bump();
                self.expect_op(Op::LParen, "'('");
                let args = self.parse_call_args();
                let end = self.expect_op(Op::RParen, "')'");
                Expr::FfiCall {
                    span: start.merge(end),
                    kind: FfiKind::Dlopen,
                    sig: None,
                    args,
                }
            }
            TokenKind::Keyword(Keyword::Dlclose) => {
                self.bump();
                self.expect_op(Op::LParen, "'('");
                let args = self.parse_call_args();
                let end = self.expect_op(Op::RParen, "')'");
                Expr::FfiCall {
                    span: start.merge(end),
                    kind: FfiKind::Dlclose,
                    sig: None,
                    args,
                }
            }
            TokenKind::Keyword(Keyword::Dlsym) => {
                self.bump();
                self.expect_op(Op::LBracket, "'['");
                let sig = self.parse_type();
                self.expect_op(Op::RBracket, "']'");
                self.expect_op(Op::LParen, "'('");
                let args = self.parse_call_args();
                let end = self.expect_op(Op::RParen, "')'");
                Expr::FfiCall {
                    span: start.merge(end),
                    kind: FfiKind::Dlsym,
                    sig: Some(Box::new(sig)),
                    args,
                }
            }
            TokenKind::Keyword(kw @ (Keyword::Clone | Keyword::Free | Keyword::Grow | Keyword::Clear)) => {
                // Builtins: ordinary call syntax over a reserved-word callee.
                self.bump();
                let name = match kw {
                    Keyword::Clone => "clone",
                    Keyword::Free => "free",
                    Keyword::Grow => "grow",
                    _ => "clear",
                };
                Expr::Ident {
                    span: start,
                    name: self.interner.intern(name),
                }
            }
            TokenKind::Ident(sym) => {
                self.bump();
                let text = self.ident_text(sym).to_string();
                if let Some(direction) = chan_surrogate_direction(&text) {
                    return self.parse_chan_lit_surrogate(start, direction);
                }
                if let Some(endian) = endian_surrogate(&text) {
                    return self.parse_endian_coercion_surrogate(start, endian);
                }
                Expr::Ident { span: start, name: sym }
            }
            TokenKind::Op(Op::LBracket) => {
                // A composite literal of slice/array type used without `&`,
                // e.g. the element type of an outer literal: `[]T{...}` is
                // only legal as a struct field type context per R1 — as an
                // expression this is always `E_IMPLICIT_REFERENCE`, but we
                // still parse it so the validator (not the parser) reports
                // the rule violation.
                let ty = Box::new(self.parse_type());
                self.expect_op(Op::LBrace, "'{'");
                let elements = self.parse_composite_elements();
                let end = self.expect_op(Op::RBrace, "'}'");
                Expr::CompositeLit {
                    span: start.merge(end),
                    ty: Some(ty),
                    elements,
                }
            }
            _ => {
                self.error(start, RuleId::Syntax, "expected an expression");
                self.bump();
                Expr::Bad { span: start }
            }
        }
    }

    fn parse_chan_lit_surrogate(&mut self, start: Span, direction: ChanDirection) -> Expr {
        self.expect_op(Op::LBracket, "'['");
        let elem = Box::new(self.parse_type());
        self.expect_op(Op::RBracket, "']'");
        self.expect_op(Op::LBrace, "'{'");
        let elements = self.parse_composite_elements();
        let end = self.expect_op(Op::RBrace, "'}'");
        let interner = &*self.interner;
        let cap = elements.into_iter().find_map(|e| match e {
            Expr::KeyValue { key, value, .. } => match *key {
                Expr::Ident { name, .. } if name.is(interner, "cap") => Some(value),
                _ => None,
            },
            _ => None,
        });
        Expr::ChanLit {
            span: start.merge(end),
            elem,
            cap,
            direction,
        }
    }

    fn parse_endian_coercion_surrogate(&mut self, start: Span, endian: Endian) -> Expr {
        self.expect_op(Op::LBracket, "'['");
        let elem_ty = self.parse_type();
        self.expect_op(Op::RBracket, "']'");
        self.expect_op(Op::LParen, "'('");
        let expr = Box::new(self.parse_expr());
        let end = self.expect_op(Op::RParen, "')'");
        let target = Box::new(Type::Slice {
            span: elem_ty.span(),
            elem: Box::new(elem_ty),
            pointer: true,
        });
        Expr::TypeCoercion {
            span: start.merge(end),
            target,
            endian: Some(endian),
            expr,
        }
    }

    /// `(expr)`, or the native-endian zero-copy coercion `(*[]To)(src)`:
    /// the only parenthesized-type production in the grammar, recognized by
    /// its unambiguous `(` `*` `[` `]` prefix — no backtracking needed.
    fn parse_paren_or_coercion(&mut self, start: Span) -> Expr {
        let is_coercion = matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Op(Op::Star)))
            && matches!(self.tokens.get(self.pos + 2).map(|t| &t.kind), Some(TokenKind::Op(Op::LBracket)))
            && matches!(self.tokens.get(self.pos + 3).map(|t| &t.kind), Some(TokenKind::Op(Op::RBracket)));
        if is_coercion {
            self.bump(); // '('
            let target = Box::new(self.parse_type());
            self.expect_op(Op::RParen, "')'");
            self.expect_op(Op::LParen, "'('");
            let expr = Box::new(self.parse_expr());
            let end = self.expect_op(Op::RParen, "')'");
            return Expr::TypeCoercion {
                span: start.merge(end),
                target,
                endian: None,
                expr,
            };
        }
        self.bump(); // '('
        let inner = Box::new(self.parse_expr());
        let end = self.expect_op(Op::RParen, "')'");
        Expr::Paren {
            span: start.merge(end),
            inner,
        }
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        while !self.at_op(Op::RParen) && !self.at_eof() {
            args.push(self.parse_expr());
            self.eat_op(Op::Ellipsis);
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        args
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Expr {
        loop {
            match self.cur_kind().clone() {
                TokenKind::Op(Op::Dot) => {
                    // `.( type )` belongs to a type-switch guard, never to an
                    // ordinary expression; leave it for the caller parsing
                    // that header (see `try_parse_type_switch_header`).
                    if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Op(Op::LParen)))
                        && matches!(self.tokens.get(self.pos + 2).map(|t| &t.kind), Some(TokenKind::Keyword(Keyword::Type)))
                    {
                        break;
                    }
                    self.bump();
                    if self.eat_op(Op::LParen) {
                        let ty = Box::new(self.parse_type());
                        let end = self.expect_op(Op::RParen, "')'");
                        expr = Expr::TypeAssertion {
                            span: expr.span().merge(end),
                            expr: Box::new(expr),
                            ty,
                        };
                    } else {
                        let (sel, span) = self.expect_ident("selector");
                        expr = Expr::Selector {
                            span: expr.span().merge(span),
                            expr: Box::new(expr),
                            sel,
                        };
                    }
                }
                TokenKind::Op(Op::LParen) => {
                    self.bump();
                    let args = self.parse_call_args();
                    let has_ellipsis = args_had_ellipsis(self, &args);
                    let end = self.expect_op(Op::RParen, "')'");
                    expr = Expr::Call {
                        span: expr.span().merge(end),
                        func: Box::new(expr),
                        args,
                        ellipsis: has_ellipsis,
                    };
                }
                TokenKind::Op(Op::LBracket) => {
                    expr = self.parse_bracket_postfix(expr);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_bracket_postfix(&mut self, base: Expr) -> Expr {
        let start_bracket = self.pos;
        if let Some(expr) = self.try_parse(|p| {
            p.bump(); // '['
            let mut indices = vec![p.parse_type()];
            while p.eat_op(Op::Comma) {
                indices.push(p.parse_type());
            }
            if !p.eat_op(Op::RBracket) {
                return None;
            }
            if !p.at_op(Op::LParen) {
                return None;
            }
            let end = p.tokens[p.pos.saturating_sub(1)].span;
            Some(Expr::IndexList {
                span: base.span().merge(end),
                expr: Box::new(base.clone()),
                indices,
            })
        }) {
            return expr;
        }
        self.pos = start_bracket;
        self.bump(); // '['
        let low = if self.at_op(Op::Colon) { None } else { Some(Box::new(self.parse_expr())) };
        if self.eat_op(Op::Colon) {
            let high = if self.at_op(Op::RBracket) || self.at_op(Op::Colon) { None } else { Some(Box::new(self.parse_expr())) };
            if self.eat_op(Op::Colon) {
                let max = Box::new(self.parse_expr());
                let end = self.expect_op(Op::RBracket, "']'");
                return Expr::Slice {
                    span: base.span().merge(end),
                    expr: Box::new(base),
                    low,
                    high,
                    max: Some(max),
                    three_index: true,
                };
            }
            let end = self.expect_op(Op::RBracket, "']'");
            return Expr::Slice {
                span: base.span().merge(end),
                expr: Box::new(base),
                low,
                high,
                max: None,
                three_index: false,
            };
        }
        let end = self.expect_op(Op::RBracket, "']'");
        Expr::Index {
            span: base.span().merge(end),
            expr: Box::new(base),
            index: low.unwrap_or_else(|| {
                Box::new(Expr::Bad {
                    span: Span::new(end.start, end.end),
                })
            }),
        }
    }
}

/// `true` if the element just before the closing `)` was consumed with a
/// trailing `...` (variadic spread at a call site, e.g. `f(xs...)`).
fn args_had_ellipsis(parser: &Parser<'_>, args: &[Expr]) -> bool {
    if args.is_empty() {
        return false;
    }
    matches!(
        parser.tokens.get(parser.pos.wrapping_sub(1)).map(|t| &t.kind),
        Some(TokenKind::Op(Op::Ellipsis))
    )
}

fn chan_surrogate_direction(name: &str) -> Option<ChanDirection> {
    Some(match name {
        "__moxie_chan_both" => ChanDirection::Both,
        "__moxie_chan_send" => ChanDirection::SendOnly,
        "__moxie_chan_recv" => ChanDirection::RecvOnly,
        _ => return None,
    })
}

fn endian_surrogate(name: &str) -> Option<Endian> {
    Some(match name {
        "__moxie_le" => Endian::Little,
        "__moxie_be" => Endian::Big,
        _ => return None,
    })
}

use moxie_base::SymbolEq;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_src(src: &str) -> (File, Vec<Diagnostic>, Interner) {
        let mut interner = Interner::new();
        let (file, diags) = parse(src, "a.x", &mut interner);
        (file, diags, interner)
    }

    #[test]
    fn parses_hello_world() {
        let (file, diags, interner) = parse_src(
            "package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"Hello, Moxie!\") }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(interner.resolve(file.package), "main");
        assert_eq!(file.decls.len(), 2);
        assert!(matches!(file.decls[0], Decl::Import { .. }));
        assert!(matches!(file.decls[1], Decl::Func { .. }));
    }

    #[test]
    fn parses_slice_literal() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() *[]int32 { return &[]int32{1,2,3} }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), sig, .. } = &file.decls[0] else { panic!() };
        assert!(matches!(sig.results[0].ty.as_ref(), Type::Slice { pointer: true, .. }));
        let Stmt::Return { results, .. } = &block.stmts[0] else { panic!() };
        assert!(matches!(results[0], Expr::SliceLit { .. }));
    }

    #[test]
    fn parses_channel_literal_surrogate() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() { ch := __moxie_chan_both[int32]{cap: 10} }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), .. } = &file.decls[0] else { panic!() };
        let Stmt::Assign { rhs, .. } = &block.stmts[0] else { panic!() };
        assert!(matches!(rhs[0], Expr::ChanLit { direction: ChanDirection::Both, .. }));
    }

    #[test]
    fn parses_endian_coercion_surrogate() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() { u := __moxie_be[uint32](bytes) }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), .. } = &file.decls[0] else { panic!() };
        let Stmt::Assign { rhs, .. } = &block.stmts[0] else { panic!() };
        assert!(matches!(rhs[0], Expr::TypeCoercion { endian: Some(Endian::Big), .. }));
    }

    #[test]
    fn parses_native_coercion_without_surrogate() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() { u := (*[]uint32)(bytes) }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), .. } = &file.decls[0] else { panic!() };
        let Stmt::Assign { rhs, .. } = &block.stmts[0] else { panic!() };
        assert!(matches!(rhs[0], Expr::TypeCoercion { endian: None, .. }));
    }

    #[test]
    fn parses_ffi_call_chain() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() { lib := dlopen(\"libc.so.6\", RTLD_LAZY); strlen := dlsym[func(*byte) int64](lib, \"strlen\") }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), .. } = &file.decls[0] else { panic!() };
        let Stmt::Assign { rhs, .. } = &block.stmts[0] else { panic!() };
        assert!(matches!(rhs[0], Expr::FfiCall { kind: FfiKind::Dlopen, .. }));
        let Stmt::Assign { rhs, .. } = &block.stmts[1] else { panic!() };
        assert!(matches!(rhs[0], Expr::FfiCall { kind: FfiKind::Dlsym, .. }));
    }

    #[test]
    fn parses_const_decl_and_assignment() {
        let (file, diags, _interner) = parse_src(
            "package x\nconst Max = 100\nfunc f() { Max = 200 }\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert!(matches!(file.decls[0], Decl::Const { .. }));
    }

    #[test]
    fn parses_for_range_and_select() {
        let (file, diags, _interner) = parse_src(
            "package x\nfunc f() {\nfor i, v := range xs {\n_ = i\n_ = v\n}\nselect {\ncase v := <-ch:\n_ = v\ndefault:\n}\n}\n",
        );
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Func { body: Some(block), .. } = &file.decls[0] else { panic!() };
        assert!(matches!(block.stmts[0], Stmt::Range { .. }));
        assert!(matches!(block.stmts[1], Stmt::Select { .. }));
    }

    #[test]
    fn recovers_from_bad_top_level_token() {
        let (file, diags, _interner) = parse_src("package x\n@@@\nfunc g() {}\n");
        assert!(!diags.is_empty());
        assert!(file.decls.iter().any(|d| matches!(d, Decl::Func { .. })));
    }
}
