//! Two-pass string/byte-slice flavor inference (spec.md §4.E, §9 Design Notes).
//!
//! A Moxie `string` binding normally lowers to the target's (immutable)
//! `string`. But Moxie treats `string` as a mutable byte sequence, so any
//! binding ever subscript-assigned (`s[i] = b`) must lower to `[]byte`
//! instead — every other occurrence of that binding then needs an implicit
//! conversion at read sites. Pass 1 (this module) walks a function body once
//! to decide, per binding, which flavor it ends up needing; pass 2
//! (`lower.rs`) rereads the table while emitting.
//!
//! **Open Question resolution** (`DESIGN.md`): flavor inference is
//! conservative and forward-only across call sites. A string-flavor
//! argument passed to a parameter that is byte-slice-flavor *somewhere in
//! this file* gets an explicit `[]byte(...)` conversion inserted at the call
//! site; the callee's own declared flavor is never changed retroactively by
//! its callers, and flavor never crosses a function boundary backward.

use moxie_base::{Interner, Symbol};
use moxie_syntax::ast::{
    BasicTypeKind, Block, CaseClause, CommClause, Decl, Expr, File, FuncSig, Stmt, TypeCaseClause, Type,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Str,
    ByteSlice,
}

/// Per-function binding-name -> inferred flavor table. Only string-typed
/// bindings are ever present; a name absent from the table is not a
/// string-flavor binding at all (ordinary types don't need flavor tracking).
#[derive(Debug, Default, Clone)]
pub struct FlavorTable {
    bindings: HashMap<Symbol, Flavor>,
}

impl FlavorTable {
    pub fn flavor_of(&self, name: Symbol) -> Option<Flavor> {
        self.bindings.get(&name).copied()
    }

    pub fn is_byte_slice(&self, name: Symbol) -> bool {
        matches!(self.flavor_of(name), Some(Flavor::ByteSlice))
    }

    fn register(&mut self, name: Symbol, flavor: Flavor) {
        // Declaration always wins over a previous escalation from an
        // out-of-order scan; escalation (see `escalate`) only ever upgrades.
        self.bindings.entry(name).or_insert(flavor);
    }

    fn escalate(&mut self, name: Symbol) {
        if let Some(f) = self.bindings.get_mut(&name) {
            *f = Flavor::ByteSlice;
        }
    }
}

/// Whole-file table of each top-level function's parameter flavors, indexed
/// by declaration order, consulted by `lower.rs` for the call-site
/// escalation rule.
#[derive(Debug, Default, Clone)]
pub struct CallSignatures {
    params: HashMap<Symbol, Vec<Option<Flavor>>>,
}

impl CallSignatures {
    pub fn param_flavor(&self, func: Symbol, index: usize) -> Option<Flavor> {
        self.params.get(&func).and_then(|v| v.get(index)).copied().flatten()
    }
}

pub struct FlavorAnalysis {
    pub tables: HashMap<Symbol, FlavorTable>,
    pub signatures: CallSignatures,
}

impl FlavorAnalysis {
    pub fn table_for(&self, func: Symbol) -> Option<&FlavorTable> {
        self.tables.get(&func)
    }
}

/// Runs both passes over every function declared in `file`.
pub fn analyze(file: &File, interner: &Interner) -> FlavorAnalysis {
    let mut signatures = CallSignatures::default();
    for decl in &file.decls {
        if let Decl::Func { name, sig, .. } = decl {
            signatures.params.insert(*name, param_flavors(sig, interner));
        }
    }

    let mut tables = HashMap::new();
    for decl in &file.decls {
        if let Decl::Func { name, sig, body, .. } = decl {
            let mut table = FlavorTable::default();
            for (names_flavor, field) in param_flavors(sig, interner).into_iter().zip(&sig.params) {
                if let Some(flavor) = names_flavor {
                    for &n in &field.names {
                        table.register(n, flavor);
                    }
                }
            }
            if let Some(body) = body {
                register_block(body, interner, &mut table);
                escalate_block(body, interner, &mut table);
            }
            tables.insert(*name, table);
        }
    }

    FlavorAnalysis { tables, signatures }
}

fn param_flavors(sig: &FuncSig, interner: &Interner) -> Vec<Option<Flavor>> {
    sig.params
        .iter()
        .flat_map(|p| {
            let flavor = declared_flavor(&p.ty, interner);
            std::iter::repeat(flavor).take(p.names.len().max(1))
        })
        .collect()
}

fn declared_flavor(ty: &Type, interner: &Interner) -> Option<Flavor> {
    match basic_kind_of(ty, interner)? {
        BasicTypeKind::String => Some(Flavor::Str),
        _ => None,
    }
}

fn basic_kind_of(ty: &Type, interner: &Interner) -> Option<BasicTypeKind> {
    match ty {
        Type::Basic { kind, .. } => Some(*kind),
        Type::Identifier { name, .. } => BasicTypeKind::lookup(interner.resolve(*name)),
        Type::Parenthesized { inner, .. } => basic_kind_of(inner, interner),
        _ => None,
    }
}

// ---- pass 1a: register every string-typed local declaration ----------------------------------------

fn register_block(block: &Block, interner: &Interner, table: &mut FlavorTable) {
    for stmt in &block.stmts {
        register_stmt(stmt, interner, table);
    }
}

fn register_stmt(stmt: &Stmt, interner: &Interner, table: &mut FlavorTable) {
    match stmt {
        Stmt::Decl { decl, .. } => register_decl(decl, interner, table),
        Stmt::Assign { lhs, op, rhs, .. } if op.is_define_like() => {
            for (l, r) in lhs.iter().zip(rhs) {
                if let Expr::Ident { name, .. } = l {
                    if is_string_literal(r) {
                        table.register(*name, Flavor::Str);
                    }
                }
            }
        }
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                register_stmt(s, interner, table);
            }
        }
        Stmt::Labeled { stmt, .. } => register_stmt(stmt, interner, table),
        Stmt::If { init, then_branch, else_branch, .. } => {
            if let Some(i) = init {
                register_stmt(i, interner, table);
            }
            register_block(then_branch, interner, table);
            if let Some(e) = else_branch {
                register_stmt(e, interner, table);
            }
        }
        Stmt::For { init, post, body, .. } => {
            if let Some(i) = init {
                register_stmt(i, interner, table);
            }
            if let Some(p) = post {
                register_stmt(p, interner, table);
            }
            register_block(body, interner, table);
        }
        Stmt::Range { body, .. } => register_block(body, interner, table),
        Stmt::Switch { init, cases, .. } => {
            if let Some(i) = init {
                register_stmt(i, interner, table);
            }
            for case in cases {
                register_case(case, interner, table);
            }
        }
        Stmt::TypeSwitch { init, cases, .. } => {
            if let Some(i) = init {
                register_stmt(i, interner, table);
            }
            for case in cases {
                register_type_case(case, interner, table);
            }
        }
        Stmt::Select { cases, .. } => {
            for case in cases {
                register_comm(case, interner, table);
            }
        }
        _ => {}
    }
}

fn register_decl(decl: &Decl, interner: &Interner, table: &mut FlavorTable) {
    if let Decl::Var { specs, .. } = decl {
        for spec in specs {
            let flavor = spec.ty.as_ref().and_then(|t| declared_flavor(t, interner));
            if let Some(flavor) = flavor {
                for &name in &spec.names {
                    table.register(name, flavor);
                }
            } else if spec.ty.is_none() {
                for (name, value) in spec.names.iter().zip(&spec.values) {
                    if is_string_literal(value) {
                        table.register(*name, Flavor::Str);
                    }
                }
            }
        }
    }
}

fn register_case(case: &CaseClause, interner: &Interner, table: &mut FlavorTable) {
    for s in &case.body {
        register_stmt(s, interner, table);
    }
}

fn register_type_case(case: &TypeCaseClause, interner: &Interner, table: &mut FlavorTable) {
    for s in &case.body {
        register_stmt(s, interner, table);
    }
}

fn register_comm(clause: &CommClause, interner: &Interner, table: &mut FlavorTable) {
    for s in &clause.body {
        register_stmt(s, interner, table);
    }
}

fn is_string_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::BasicLit { kind: moxie_syntax::token::LitKind::String, .. })
}

// ---- pass 1b: escalate any binding ever subscript-assigned ----------------------------------------

fn escalate_block(block: &Block, interner: &Interner, table: &mut FlavorTable) {
    for stmt in &block.stmts {
        escalate_stmt(stmt, interner, table);
    }
}

fn escalate_stmt(stmt: &Stmt, interner: &Interner, table: &mut FlavorTable) {
    match stmt {
        Stmt::Assign { lhs, .. } => {
            for l in lhs {
                if let Expr::Index { expr, .. } = l {
                    if let Expr::Ident { name, .. } = &**expr {
                        table.escalate(*name);
                    }
                }
            }
        }
        Stmt::Labeled { stmt, .. } => escalate_stmt(stmt, interner, table),
        Stmt::Block { stmts, .. } => {
            for s in stmts {
                escalate_stmt(s, interner, table);
            }
        }
        Stmt::If { init, then_branch, else_branch, .. } => {
            if let Some(i) = init {
                escalate_stmt(i, interner, table);
            }
            escalate_block(then_branch, interner, table);
            if let Some(e) = else_branch {
                escalate_stmt(e, interner, table);
            }
        }
        Stmt::For { init, post, body, .. } => {
            if let Some(i) = init {
                escalate_stmt(i, interner, table);
            }
            if let Some(p) = post {
                escalate_stmt(p, interner, table);
            }
            escalate_block(body, interner, table);
        }
        Stmt::Range { body, .. } => escalate_block(body, interner, table),
        Stmt::Switch { init, cases, .. } => {
            if let Some(i) = init {
                escalate_stmt(i, interner, table);
            }
            for case in cases {
                for s in &case.body {
                    escalate_stmt(s, interner, table);
                }
            }
        }
        Stmt::TypeSwitch { init, cases, .. } => {
            if let Some(i) = init {
                escalate_stmt(i, interner, table);
            }
            for case in cases {
                for s in &case.body {
                    escalate_stmt(s, interner, table);
                }
            }
        }
        Stmt::Select { cases, .. } => {
            for case in cases {
                for s in &case.body {
                    escalate_stmt(s, interner, table);
                }
            }
        }
        Stmt::Decl { .. } => {}
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moxie_base::Interner;

    fn analyze_src(src: &str) -> (FlavorAnalysis, Interner, Symbol) {
        let mut interner = Interner::new();
        let (file, diags) = moxie_syntax::parse(src, "t.x", &mut interner);
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags:?}");
        let analysis = analyze(&file, &interner);
        let name = interner.lookup("f").unwrap();
        (analysis, interner, name)
    }

    #[test]
    fn plain_string_param_stays_str_flavor() {
        let (analysis, interner, f) = analyze_src("package x\nfunc f(s string) { _ = s }\n");
        let table = analysis.table_for(f).unwrap();
        let s = interner.lookup("s").unwrap();
        assert_eq!(table.flavor_of(s), Some(Flavor::Str));
        assert!(!table.is_byte_slice(s));
    }

    #[test]
    fn subscript_assignment_escalates_to_byte_slice() {
        let (analysis, interner, f) = analyze_src("package x\nfunc f(s string) { s[0] = 65 }\n");
        let table = analysis.table_for(f).unwrap();
        let s = interner.lookup("s").unwrap();
        assert!(table.is_byte_slice(s));
    }

    #[test]
    fn local_string_literal_binding_tracked() {
        let (analysis, interner, f) = analyze_src("package x\nfunc f() { s := \"hi\"\n s[0] = 72 }\n");
        let table = analysis.table_for(f).unwrap();
        let s = interner.lookup("s").unwrap();
        assert!(table.is_byte_slice(s));
    }

    #[test]
    fn non_string_param_is_not_tracked() {
        let (analysis, interner, f) = analyze_src("package x\nfunc f(n int32) { _ = n }\n");
        let table = analysis.table_for(f).unwrap();
        let n = interner.lookup("n").unwrap();
        assert_eq!(table.flavor_of(n), None);
    }
}
