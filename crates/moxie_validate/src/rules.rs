//! Stage D: the rule table of spec.md §4.D (R1–R10).
//!
//! The validator never aborts — every rule accumulates into the returned
//! diagnostic list, mirroring the parser's `Bad*`-node recovery discipline
//! one stage up. A symbol table is built in a first pass over top-level
//! declarations (so a function may forward-reference a `const`/`type`/`func`
//! declared later in the same unit) before the second pass walks bodies and
//! runs the rule checks.
//!
//! Three rules (R6, R8, R10) need information a pure syntax-directed check
//! can't fully provide without a type checker, which is out of this core's
//! scope (spec.md §1 Non-goals lists optimization and a VM, not a type
//! system, but §4.D's own rule text — "byte-size... must be compatible",
//! "sending on a receive-only channel", "implicit narrowing" — presumes one
//! exists). Each is implemented as the best static approximation reachable
//! without one, documented at its call site and in `DESIGN.md`.

use crate::symtab::{DeclKind, ScopeId, SymbolTable};
use moxie_base::{Diagnostic, Interner, Position, RuleId, Span, SymbolEq};
use moxie_syntax::ast::{
    BasicTypeKind, Block, ChanDirection, CommClause, CommDirection, Decl, Expr, FfiKind, Field, File, FuncSig, Stmt,
    Type, TypeCaseClause, UnaryOp,
};
use std::path::{Path, PathBuf};

/// Runs every rule over one source unit's AST, returning accumulated
/// diagnostics. `source`/`filename` resolve an AST node's byte-offset
/// [`Span`] to a human-facing [`Position`] (the AST itself carries no
/// line/column, only offsets — the same division of labor the parser uses).
pub fn validate(file: &File, source: &str, filename: impl AsRef<Path>, interner: &Interner) -> Vec<Diagnostic> {
    let mut cx = Context {
        source,
        filename: filename.as_ref().to_path_buf(),
        interner,
        symtab: SymbolTable::new(),
        diags: Vec::new(),
        chan_dir_table: std::collections::HashMap::new(),
    };
    let file_scope = cx.symtab.push_scope(cx.symtab.root());

    for decl in &file.decls {
        cx.register_top_level(decl, file_scope);
    }
    for decl in &file.decls {
        cx.check_top_level(decl, file_scope);
    }

    cx.diags.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    cx.diags
}

/// Best-effort declared-type info kept alongside a symbol-table entry,
/// beyond what `symtab::DeclEntry` tracks, used only by the rules (R8, R10)
/// that need it. Keyed by the same `Symbol` the declaration binds, scoped
/// identically — a parallel map rather than a `symtab::DeclEntry` field, so
/// `moxie_validate::symtab` stays a plain scope/const table useful beyond
/// this one rule set.
struct Context<'a> {
    source: &'a str,
    filename: PathBuf,
    interner: &'a Interner,
    symtab: SymbolTable,
    diags: Vec<Diagnostic>,
    chan_dir_table: std::collections::HashMap<(ScopeId, moxie_base::Symbol), ChanDirection>,
}

impl<'a> Context<'a> {
    fn pos(&self, offset: usize) -> Position {
        let (line, column) = moxie_base::line_column(self.source, offset);
        Position::new(self.filename.clone(), offset, line, column)
    }

    fn error(&mut self, span: Span, rule: RuleId, message: impl Into<String>) {
        self.diags.push(Diagnostic::error(self.pos(span.start), rule, message));
    }

    // ---- Pass 1: declarations only ----------------------------------------

    fn register_top_level(&mut self, decl: &Decl, scope: ScopeId) {
        match decl {
            Decl::Import { specs, .. } => {
                for spec in specs {
                    if let Some(alias) = spec.alias {
                        self.symtab.declare(scope, alias, DeclKind::Import, false, spec.span);
                    }
                }
            }
            Decl::Const { specs, .. } => {
                for spec in specs {
                    for &name in &spec.names {
                        self.symtab.declare(scope, name, DeclKind::Const, true, spec.span);
                    }
                }
            }
            Decl::Var { specs, .. } => {
                for spec in specs {
                    let direction = spec.ty.as_ref().and_then(|ty| self.chan_direction_of_type(ty));
                    for &name in &spec.names {
                        let id = self.symtab.declare(scope, name, DeclKind::Var, false, spec.span);
                        if let Some(dir) = direction {
                            self.symtab.set_chan_direction(id, dir);
                        }
                    }
                }
            }
            Decl::Type { specs, .. } => {
                for spec in specs {
                    self.symtab.declare(scope, spec.name, DeclKind::Type, false, spec.span);
                }
            }
            Decl::Func { name, span, .. } => {
                self.symtab.declare(scope, *name, DeclKind::Func, false, *span);
            }
            Decl::Bad { .. } => {}
        }
    }

    // ---- Pass 2: checks + body walk ----------------------------------------

    fn check_top_level(&mut self, decl: &Decl, scope: ScopeId) {
        match decl {
            Decl::Import { .. } => {}
            Decl::Const { specs, .. } => {
                for spec in specs {
                    if let Some(ty) = &spec.ty {
                        self.check_type(ty, false);
                    }
                    for value in &spec.values {
                        self.check_expr(value, scope);
                    }
                    self.check_narrowing(spec.ty.as_ref(), &spec.values);
                }
            }
            Decl::Var { specs, .. } => {
                for spec in specs {
                    if let Some(ty) = &spec.ty {
                        self.check_type(ty, false);
                    }
                    for value in &spec.values {
                        self.check_expr(value, scope);
                    }
                    self.check_narrowing(spec.ty.as_ref(), &spec.values);
                }
            }
            Decl::Type { specs, .. } => {
                for spec in specs {
                    self.check_type(&spec.ty, false);
                }
            }
            Decl::Func { receiver, sig, body, .. } => {
                self.check_func_sig(sig, false);
                let fn_scope = self.symtab.push_scope(scope);
                if let Some(recv) = receiver {
                    self.check_type(&recv.ty, false);
                    self.declare_field(recv, fn_scope);
                }
                self.declare_params(sig, fn_scope);
                if let Some(body) = body {
                    self.check_block(body, fn_scope);
                }
            }
            Decl::Bad { .. } => {}
        }
    }

    fn check_func_sig(&mut self, sig: &FuncSig, field_context: bool) {
        for tp in &sig.type_params {
            if let Some(c) = &tp.constraint {
                self.check_type(c, field_context);
            }
        }
        for p in &sig.params {
            self.check_type(&p.ty, field_context);
        }
        for r in &sig.results {
            self.check_type(&r.ty, field_context);
        }
    }

    fn declare_field(&mut self, field: &Field, scope: ScopeId) {
        let direction = self.chan_direction_of_type(&field.ty);
        for &name in &field.names {
            let id = self.symtab.declare(scope, name, DeclKind::Var, false, field.span);
            if let Some(dir) = direction {
                self.symtab.set_chan_direction(id, dir);
            }
        }
    }

    /// The direction an explicit `*chan<- T`/`*<-chan T`/`*chan T` declared
    /// type carries, if any (§4.D R8). Only the pointer (explicit-container)
    /// form counts — a bare `chan T` is itself flagged separately by R1 and
    /// has no business also feeding direction tracking.
    fn chan_direction_of_type(&self, ty: &Type) -> Option<ChanDirection> {
        match ty {
            Type::Channel { pointer: true, direction, .. } => Some(*direction),
            Type::Parenthesized { inner, .. } => self.chan_direction_of_type(inner),
            _ => None,
        }
    }

    fn declare_params(&mut self, sig: &FuncSig, scope: ScopeId) {
        for p in &sig.params {
            self.declare_field(p, scope);
        }
    }

    // ---- R1 + R4: type-position checks ----------------------------------------

    /// Walks a type node, flagging R1 (bare container outside struct-field
    /// context) and R4 (`int`/`uint` used as a type). `field_context` is
    /// `true` only for the immediate type of a struct field; it does not
    /// propagate into that type's own sub-elements (a field of slice-of-slice
    /// type still needs its inner element explicitly pointered), matching
    /// §3's "outside struct field type context" reading literally — the
    /// *outer* occurrence is the one in field context, not arbitrarily deep
    /// nested ones.
    fn check_type(&mut self, ty: &Type, field_context: bool) {
        match ty {
            Type::Identifier { name, span } => {
                let text = self.interner.resolve(*name);
                if text == "int" || text == "uint" {
                    self.error(
                        *span,
                        RuleId::PlatformIntType,
                        format!("'{text}' is not a valid Moxie type; use int32/int64/uint32/uint64"),
                    );
                }
            }
            Type::Basic { .. } | Type::Bad { .. } => {}
            Type::Pointer { elem, .. } => self.check_type(elem, false),
            Type::Slice { elem, pointer, span } => {
                if !*pointer && !field_context {
                    self.error(*span, RuleId::ImplicitReference, "slice type must be written '*[]T' outside a struct field");
                }
                self.check_type(elem, false);
            }
            Type::Array { elem, .. } => self.check_type(elem, false),
            Type::Map { key, value, pointer, span } => {
                if !*pointer && !field_context {
                    self.error(*span, RuleId::ImplicitReference, "map type must be written '*map[K]V' outside a struct field");
                }
                self.check_type(key, false);
                self.check_type(value, false);
            }
            Type::Channel { elem, pointer, span, .. } => {
                if !*pointer && !field_context {
                    self.error(*span, RuleId::ImplicitReference, "channel type must be written '*chan T' outside a struct field");
                }
                self.check_type(elem, false);
            }
            Type::Struct { fields, .. } => {
                for f in fields {
                    self.check_type(&f.ty, true);
                }
            }
            Type::Interface { methods, .. } => {
                for m in methods {
                    self.check_type(&m.ty, false);
                }
            }
            Type::Function { sig, .. } => self.check_func_sig(sig, false),
            Type::Parenthesized { inner, .. } => self.check_type(inner, field_context),
        }
    }

    fn basic_kind_of(&self, ty: &Type) -> Option<BasicTypeKind> {
        match ty {
            Type::Basic { kind, .. } => Some(*kind),
            Type::Identifier { name, .. } => BasicTypeKind::lookup(self.interner.resolve(*name)),
            Type::Parenthesized { inner, .. } => self.basic_kind_of(inner),
            _ => None,
        }
    }

    fn elem_type_of<'t>(&self, ty: &'t Type) -> Option<&'t Type> {
        match ty {
            Type::Slice { elem, .. } => Some(elem),
            Type::Parenthesized { inner, .. } => self.elem_type_of(inner),
            _ => None,
        }
    }

    // ---- R6: coercion element types ----------------------------------------

    fn check_coercion_target(&mut self, target: &Type, span: Span) {
        let Some(elem) = self.elem_type_of(target) else {
            self.error(span, RuleId::CoercionType, "coercion target must be a '*[]T' slice type");
            return;
        };
        match self.basic_kind_of(elem) {
            Some(kind) if kind.is_fixed_width_numeric() => {}
            _ => self.error(
                span,
                RuleId::CoercionType,
                "coercion target element type must be a fixed-width numeric type",
            ),
        }
    }

    // ---- R5: FFI call shape ----------------------------------------

    fn check_ffi_shape(&mut self, kind: FfiKind, sig: &Option<Box<Type>>, args: &[Expr], span: Span) {
        match kind {
            FfiKind::Dlopen => {
                if args.len() != 2 {
                    self.error(span, RuleId::FfiShape, "dlopen expects (name, flags)");
                }
            }
            FfiKind::Dlclose => {
                if args.len() != 1 {
                    self.error(span, RuleId::FfiShape, "dlclose expects (lib)");
                }
            }
            FfiKind::Dlsym => {
                match sig.as_deref() {
                    Some(Type::Function { .. }) => {}
                    _ => self.error(span, RuleId::FfiShape, "dlsym[Sig] requires Sig to be a function type"),
                }
                if args.len() != 2 {
                    self.error(span, RuleId::FfiShape, "dlsym expects (lib, name)");
                }
            }
        }
    }

    // ---- R10: len/cap narrowing (static approximation) ----------------------------------------

    /// Flags the direct pattern `var x int8 = len(s)` / `const x int8 = cap(s)`
    /// — a declared fixed-width integer type narrower than 64 bits whose
    /// initializer is literally a `len`/`cap` call. `len`/`cap` results
    /// threaded through intermediate bindings or expressions aren't tracked;
    /// that would need a type checker, out of this core's scope.
    fn check_narrowing(&mut self, ty: Option<&Type>, values: &[Expr]) {
        let Some(ty) = ty else { return };
        let Some(kind) = self.basic_kind_of(ty) else { return };
        if !kind.is_fixed_width_numeric() {
            return;
        }
        let Some(width) = kind.byte_width() else { return };
        if width >= 8 {
            return;
        }
        for value in values {
            if self.is_len_or_cap_call(value) {
                self.error(
                    value.span(),
                    RuleId::NarrowingLen,
                    "len/cap is 64-bit; narrowing to a smaller integer type requires an explicit conversion",
                );
            }
        }
    }

    fn is_len_or_cap_call(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Call { func, .. } if matches!(
            &**func,
            Expr::Ident { name, .. } if name.is(self.interner, "len") || name.is(self.interner, "cap")
        ))
    }

    // ---- statements ----------------------------------------

    fn check_block(&mut self, block: &Block, parent: ScopeId) {
        let scope = self.symtab.push_scope(parent);
        for stmt in &block.stmts {
            self.check_stmt(stmt, scope);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, scope: ScopeId) {
        match stmt {
            Stmt::Empty { .. } | Stmt::Bad { .. } | Stmt::Branch { .. } => {}
            Stmt::Labeled { stmt, .. } => self.check_stmt(stmt, scope),
            Stmt::Expr { expr, .. } => self.check_expr(expr, scope),
            Stmt::Send { chan, value, span } => {
                self.check_expr(chan, scope);
                self.check_expr(value, scope);
                if self.direction_of(chan, scope) == Some(ChanDirection::RecvOnly) {
                    self.error(*span, RuleId::ChanDirection, "cannot send on a receive-only channel");
                }
            }
            Stmt::IncDec { expr, span, .. } => {
                self.check_expr(expr, scope);
                self.check_const_root(expr, scope, *span);
            }
            Stmt::Assign { lhs, op, rhs, .. } => {
                for r in rhs {
                    self.check_expr(r, scope);
                }
                if op.is_define_like() {
                    for (i, l) in lhs.iter().enumerate() {
                        if let Expr::Ident { name, span } = l {
                            let chan_dir = rhs.get(i).and_then(|r| self.chan_lit_direction(r));
                            self.symtab.declare(scope, *name, DeclKind::Var, false, *span);
                            if let Some(dir) = chan_dir {
                                self.record_chan_direction(*name, scope, dir);
                            }
                        } else {
                            self.check_expr(l, scope);
                        }
                    }
                } else {
                    for l in lhs {
                        self.check_expr(l, scope);
                        self.check_const_root(l, scope, l.span());
                    }
                }
            }
            Stmt::Go { call, .. } | Stmt::Defer { call, .. } => self.check_expr(call, scope),
            Stmt::Return { results, .. } => {
                for r in results {
                    self.check_expr(r, scope);
                }
            }
            Stmt::Block { stmts, .. } => {
                let inner = self.symtab.push_scope(scope);
                for s in stmts {
                    self.check_stmt(s, inner);
                }
            }
            Stmt::If { init, cond, then_branch, else_branch, .. } => {
                let s = self.symtab.push_scope(scope);
                if let Some(i) = init {
                    self.check_stmt(i, s);
                }
                self.check_expr(cond, s);
                self.check_block(then_branch, s);
                if let Some(e) = else_branch {
                    self.check_stmt(e, s);
                }
            }
            Stmt::Switch { init, tag, cases, .. } => {
                let s = self.symtab.push_scope(scope);
                if let Some(i) = init {
                    self.check_stmt(i, s);
                }
                if let Some(t) = tag {
                    self.check_expr(t, s);
                }
                for case in cases {
                    let cs = self.symtab.push_scope(s);
                    for v in &case.values {
                        self.check_expr(v, cs);
                    }
                    for st in &case.body {
                        self.check_stmt(st, cs);
                    }
                }
            }
            Stmt::TypeSwitch { init, bind, subject, cases, .. } => {
                let s = self.symtab.push_scope(scope);
                if let Some(i) = init {
                    self.check_stmt(i, s);
                }
                self.check_expr(subject, s);
                for case in cases {
                    let cs = self.symtab.push_scope(s);
                    if let Some(name) = bind {
                        self.symtab.declare(cs, *name, DeclKind::Var, false, case.span);
                    }
                    self.check_type_case(case, cs);
                }
            }
            Stmt::Select { cases, .. } => {
                for case in cases {
                    let cs = self.symtab.push_scope(scope);
                    self.check_comm_clause(case, cs);
                }
            }
            Stmt::For { init, cond, post, body, .. } => {
                let s = self.symtab.push_scope(scope);
                if let Some(i) = init {
                    self.check_stmt(i, s);
                }
                if let Some(c) = cond {
                    self.check_expr(c, s);
                }
                if let Some(p) = post {
                    self.check_stmt(p, s);
                }
                self.check_block(body, s);
            }
            Stmt::Range { key, value, define, expr, body, .. } => {
                let s = self.symtab.push_scope(scope);
                self.check_expr(expr, s);
                for binding in [key, value].into_iter().flatten() {
                    if *define {
                        if let Expr::Ident { name, span } = binding.as_ref() {
                            self.symtab.declare(s, *name, DeclKind::Var, false, *span);
                        }
                    } else {
                        self.check_expr(binding, s);
                    }
                }
                self.check_block(body, s);
            }
            Stmt::Decl { decl, .. } => {
                self.register_top_level(decl, scope);
                self.check_top_level(decl, scope);
            }
        }
    }

    fn check_type_case(&mut self, case: &TypeCaseClause, scope: ScopeId) {
        for ty in &case.types {
            self.check_type(ty, false);
        }
        for st in &case.body {
            self.check_stmt(st, scope);
        }
    }

    fn check_comm_clause(&mut self, clause: &CommClause, scope: ScopeId) {
        if let Some(chan) = &clause.chan {
            self.check_expr(chan, scope);
            if clause.direction == Some(CommDirection::Send) {
                if let Some(value) = &clause.value {
                    self.check_expr(value, scope);
                }
                if self.direction_of(chan, scope) == Some(ChanDirection::RecvOnly) {
                    self.error(clause.span, RuleId::ChanDirection, "cannot send on a receive-only channel");
                }
            } else if self.direction_of(chan, scope) == Some(ChanDirection::SendOnly) {
                self.error(clause.span, RuleId::ChanDirection, "cannot receive from a send-only channel");
            }
        }
        for &name in &clause.bind {
            if clause.define {
                self.symtab.declare(scope, name, DeclKind::Var, false, clause.span);
            }
        }
        for st in &clause.body {
            self.check_stmt(st, scope);
        }
    }

    // ---- expressions ----------------------------------------

    fn check_expr(&mut self, expr: &Expr, scope: ScopeId) {
        match expr {
            Expr::Bad { .. } | Expr::Ident { .. } | Expr::BasicLit { .. } => {}
            Expr::Paren { inner, .. } => self.check_expr(inner, scope),
            Expr::Selector { expr, .. } => self.check_expr(expr, scope),
            Expr::Index { expr, index, .. } => {
                self.check_expr(expr, scope);
                self.check_expr(index, scope);
            }
            Expr::Slice { expr, low, high, max, .. } => {
                self.check_expr(expr, scope);
                for e in [low, high, max].into_iter().flatten() {
                    self.check_expr(e, scope);
                }
            }
            Expr::Call { func, args, span, .. } => {
                if let Expr::Ident { name, .. } = &**func {
                    if name.is(self.interner, "make") {
                        self.error(*span, RuleId::NoMake, "bare 'make' is not allowed; use '&[]T{}'/'&map[K]V{}' or 'grow'");
                    }
                }
                self.check_expr(func, scope);
                for a in args {
                    self.check_expr(a, scope);
                }
            }
            Expr::Star { expr, .. } => self.check_expr(expr, scope),
            Expr::Unary { op, expr, span } => {
                self.check_expr(expr, scope);
                if *op == UnaryOp::Recv && self.direction_of(expr, scope) == Some(ChanDirection::SendOnly) {
                    self.error(*span, RuleId::ChanDirection, "cannot receive from a send-only channel");
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs, scope);
                self.check_expr(rhs, scope);
            }
            Expr::KeyValue { key, value, .. } => {
                self.check_expr(key, scope);
                self.check_expr(value, scope);
            }
            Expr::CompositeLit { ty, elements, span } => {
                if let Some(t) = ty {
                    self.check_type(t, false);
                    if matches!(**t, Type::Slice { .. } | Type::Map { .. } | Type::Channel { .. }) {
                        self.error(*span, RuleId::MissingAmpersand, "container literal must be introduced by '&'");
                    }
                }
                for e in elements {
                    self.check_expr(e, scope);
                }
            }
            Expr::FuncLit { sig, body, .. } => {
                self.check_func_sig(sig, false);
                let inner = self.symtab.push_scope(scope);
                self.declare_params(sig, inner);
                self.check_block(body, inner);
            }
            Expr::Ellipsis { elem, .. } => {
                if let Some(t) = elem {
                    self.check_type(t, false);
                }
            }
            Expr::IndexList { expr, indices, .. } => {
                self.check_expr(expr, scope);
                for t in indices {
                    self.check_type(t, false);
                }
            }
            Expr::TypeAssertion { expr, ty, .. } => {
                self.check_expr(expr, scope);
                self.check_type(ty, false);
            }
            Expr::ChanLit { elem, cap, .. } => {
                self.check_type(elem, false);
                if let Some(c) = cap {
                    self.check_expr(c, scope);
                }
            }
            Expr::SliceLit { elem, elements, .. } => {
                self.check_type(elem, false);
                for e in elements {
                    self.check_expr(e, scope);
                }
            }
            Expr::MapLit { key, value, elements, .. } => {
                self.check_type(key, false);
                self.check_type(value, false);
                for e in elements {
                    self.check_expr(e, scope);
                }
            }
            Expr::TypeCoercion { target, expr, span, .. } => {
                self.check_type(target, false);
                self.check_expr(expr, scope);
                self.check_coercion_target(target, *span);
            }
            Expr::FfiCall { kind, sig, args, span } => {
                self.check_ffi_shape(*kind, sig, args, *span);
                if let Some(s) = sig {
                    self.check_type(s, false);
                }
                for a in args {
                    self.check_expr(a, scope);
                }
            }
        }
    }

    // ---- R3: const-root resolution ----------------------------------------

    fn resolve_root<'e>(&self, expr: &'e Expr) -> Option<&'e Expr> {
        match expr {
            Expr::Ident { .. } => Some(expr),
            Expr::Selector { expr, .. } => self.resolve_root(expr),
            Expr::Index { expr, .. } => self.resolve_root(expr),
            Expr::Star { expr, .. } => self.resolve_root(expr),
            Expr::Paren { inner, .. } => self.resolve_root(inner),
            _ => None,
        }
    }

    fn check_const_root(&mut self, expr: &Expr, scope: ScopeId, span: Span) {
        let Some(Expr::Ident { name, .. }) = self.resolve_root(expr) else {
            return;
        };
        let Some(id) = self.symtab.lookup(scope, *name) else {
            return;
        };
        if self.symtab.is_const(id) {
            let root_name = self.interner.resolve(*name);
            self.error(span, RuleId::AssignToConst, format!("cannot assign to const '{root_name}'"));
        }
    }

    // ---- R8 support: best-effort channel direction tracking ----------------------------------------

    /// Channel directions are tracked in a side table keyed by `(scope,
    /// name)` rather than on `symtab::DeclEntry`, since direction is only
    /// knowable for the subset of bindings whose declared type or `:=`
    /// initializer is visibly a channel — most declarations never populate
    /// it, and `symtab` itself has no notion of "type" at all. Lookup walks
    /// outward through the same scope chain `SymbolTable::lookup` would, via
    /// `symtab.lookup` sharing the declaration id as the terminal check.
    fn record_chan_direction(&mut self, name: moxie_base::Symbol, scope: ScopeId, direction: ChanDirection) {
        self.chan_dir_table.insert((scope, name), direction);
    }

    fn chan_lit_direction(&self, expr: &Expr) -> Option<ChanDirection> {
        match expr {
            Expr::ChanLit { direction, .. } => Some(*direction),
            Expr::Paren { inner, .. } => self.chan_lit_direction(inner),
            _ => None,
        }
    }

    fn direction_of(&mut self, expr: &Expr, scope: ScopeId) -> Option<ChanDirection> {
        let Some(Expr::Ident { name, .. }) = self.resolve_root(expr) else {
            return None;
        };
        let Some(id) = self.symtab.lookup(scope, *name) else {
            return None;
        };
        if let Some(dir) = self.symtab.chan_direction(id) {
            return Some(dir);
        }
        self.chan_dir_table.get(&(scope, *name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use moxie_base::Interner;

    fn validate_src(src: &str) -> Vec<moxie_base::Diagnostic> {
        let mut interner = Interner::new();
        let (file, mut diags) = moxie_syntax::parse(src, "a.x", &mut interner);
        assert!(
            !diags.iter().any(|d| d.severity == moxie_base::Severity::Error),
            "unexpected parse errors: {diags:?}"
        );
        diags.extend(super::validate(&file, src, "a.x", &interner));
        diags
    }

    #[test]
    fn receiving_on_a_send_only_parameter_is_rejected() {
        let diags = validate_src(
            "func f(ch *chan<- int32) int32 {\n\tx := <-ch\n\treturn x\n}\n",
        );
        assert!(diags.iter().any(|d| d.rule.code() == "E_CHAN_DIRECTION"));
    }

    #[test]
    fn sending_on_a_recv_only_var_is_rejected() {
        let diags = validate_src(
            "func f() {\n\tvar ch *<-chan int32\n\tch <- 1\n}\n",
        );
        assert!(diags.iter().any(|d| d.rule.code() == "E_CHAN_DIRECTION"));
    }

    #[test]
    fn sending_on_a_recv_only_parameter_is_rejected() {
        let diags = validate_src("func f(ch *<-chan int32) {\n\tch <- 1\n}\n");
        assert!(diags.iter().any(|d| d.rule.code() == "E_CHAN_DIRECTION"));
    }

    #[test]
    fn receiving_on_a_bidirectional_declared_type_is_allowed() {
        let diags = validate_src("func f(ch *chan int32) int32 {\n\treturn <-ch\n}\n");
        assert!(!diags.iter().any(|d| d.rule.code() == "E_CHAN_DIRECTION"));
    }

    #[test]
    fn sending_on_a_send_only_literal_binding_is_still_allowed() {
        // Regression guard for the `:=` chan-literal tracking path, kept
        // working alongside the new declared-type path.
        let diags = validate_src("func f() {\n\tch := &chan<- int32{}\n\tch <- 1\n}\n");
        assert!(!diags.iter().any(|d| d.rule.code() == "E_CHAN_DIRECTION"));
    }
}
