//! Stage E: lowers a validated Moxie AST to Go source text (spec.md §4.E).
//!
//! Grounded on the teacher's multi-backend `codegen.rs`/`codegen_c.rs` shape
//! (one AST, table-driven per-construct lowering, a small formatter) but
//! generalized from "LOGOS -> Rust/C" to "Moxie -> Go". The validated AST is
//! assumed well-formed (§4.E: "Any internal inconsistency is a panic... not
//! a diagnostic") — this module never returns a `Result`.
//!
//! # Runtime calls
//!
//! Constructs with no direct Go equivalent (`grow`/`clone`/`free`/`clear`,
//! zero-copy coercions, the `dlopen` family, `+` on slices) lower to calls
//! into the vendored runtime package (`moxie_runtime`), imported under the
//! fixed alias [`RUNTIME_ALIAS`]. A single pre-pass (`uses_runtime`) decides
//! whether that import is needed at all, so a program that never touches FFI
//! or coercions emits no unused import.

use crate::flavor::{self, Flavor, FlavorAnalysis};
use crate::sourcemap::EmitSourceMap;
use moxie_base::{Interner, Span, Symbol};
use moxie_syntax::ast::*;
use moxie_syntax::token::LitKind;

/// Import path of the vendored runtime package (`moxie_runtime`'s vendored
/// tree is staged at this path by `moxie_build`; see its `DESIGN.md` entry).
pub const RUNTIME_IMPORT_PATH: &str = "moxie.dev/runtime";
pub const RUNTIME_ALIAS: &str = "moxiert";

pub struct EmitResult {
    pub source: String,
    pub sourcemap: EmitSourceMap,
}

/// Lowers one validated source unit's AST to Go source text.
pub fn emit(file: &File, interner: &Interner) -> EmitResult {
    let analysis = flavor::analyze(file, interner);
    let mut em = Emitter {
        interner,
        analysis: &analysis,
        current_fn: None,
        out: String::new(),
        line: 1,
        sourcemap: EmitSourceMap::new(),
    };
    em.emit_file(file);
    EmitResult { source: em.out, sourcemap: em.sourcemap }
}

struct Emitter<'a> {
    interner: &'a Interner,
    analysis: &'a FlavorAnalysis,
    current_fn: Option<Symbol>,
    out: String,
    line: u32,
    sourcemap: EmitSourceMap,
}

impl<'a> Emitter<'a> {
    fn sym(&self, s: Symbol) -> &str {
        self.interner.resolve(s)
    }

    fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
            }
        }
        self.out.push_str(text);
    }

    fn push_line(&mut self, indent: usize, text: &str, span: Span) {
        self.sourcemap.record(self.line, span);
        self.push(&"\t".repeat(indent));
        self.push(text);
        self.push("\n");
    }

    fn current_table(&self) -> Option<&flavor::FlavorTable> {
        self.current_fn.and_then(|f| self.analysis.table_for(f))
    }

    // ---- file / imports ----------------------------------------

    fn emit_file(&mut self, file: &File) {
        self.push(&format!("package {}\n\n", self.sym(file.package)));

        let mut import_specs: Vec<&ImportSpec> = Vec::new();
        for decl in &file.decls {
            if let Decl::Import { specs, .. } = decl {
                import_specs.extend(specs.iter());
            }
        }
        let needs_runtime = uses_runtime(file, self.interner);
        if !import_specs.is_empty() || needs_runtime {
            self.push("import (\n");
            if needs_runtime {
                self.push(&format!("\t{} \"{}\"\n", RUNTIME_ALIAS, RUNTIME_IMPORT_PATH));
            }
            for spec in &import_specs {
                let path = self.sym(spec.path);
                match spec.alias {
                    Some(alias) => self.push(&format!("\t{} {}\n", self.sym(alias), path)),
                    None => self.push(&format!("\t{}\n", path)),
                }
            }
            self.push(")\n\n");
        }

        for decl in &file.decls {
            if matches!(decl, Decl::Import { .. }) {
                continue;
            }
            self.emit_top_decl(decl);
            self.push("\n");
        }
    }

    // ---- declarations ----------------------------------------

    fn emit_top_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Import { .. } => {}
            Decl::Const { specs, span } => self.emit_const_decl(specs, *span),
            Decl::Var { specs, span } => self.emit_var_decl(specs, *span),
            Decl::Type { specs, span } => self.emit_type_decl(specs, *span),
            Decl::Func { name, receiver, sig, body, span } => {
                self.current_fn = Some(*name);
                self.emit_func_decl(*name, receiver.as_ref(), sig, body.as_ref(), *span);
                self.current_fn = None;
            }
            Decl::Bad { span } => self.push_line(0, "/* bad declaration */", *span),
        }
    }

    fn is_primitive_const(&self, spec: &ConstSpec) -> bool {
        if let Some(ty) = &spec.ty {
            return self.basic_kind_of(ty).is_some();
        }
        spec.values.iter().all(|v| {
            matches!(
                v,
                Expr::BasicLit { .. } | Expr::Unary { .. } | Expr::Binary { .. } | Expr::Ident { .. }
            )
        })
    }

    fn emit_const_decl(&mut self, specs: &[ConstSpec], span: Span) {
        if specs.len() == 1 && self.is_primitive_const(&specs[0]) {
            let spec = &specs[0];
            let names = spec.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
            let ty = spec.ty.as_ref().map(|t| format!(" {}", self.emit_type(t))).unwrap_or_default();
            let values = spec.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
            let line = if values.is_empty() {
                format!("const {names}{ty}")
            } else {
                format!("const {names}{ty} = {values}")
            };
            self.push_line(0, &line, span);
            return;
        }
        self.push_line(0, "const (", span);
        for spec in specs {
            if self.is_primitive_const(spec) {
                let names = spec.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
                let ty = spec.ty.as_ref().map(|t| format!(" {}", self.emit_type(t))).unwrap_or_default();
                let values = spec.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
                let line = if values.is_empty() { format!("{names}{ty}") } else { format!("{names}{ty} = {values}") };
                self.push_line(1, &line, spec.span);
            } else {
                self.emit_non_primitive_const(spec);
            }
        }
        self.push_line(0, ")", span);
    }

    /// Non-primitive const (§4.E): lowered to a package-level `var` plus a
    /// `// moxie:const` marker comment; MMU enforcement is out of scope
    /// (spec.md §1 Non-goals).
    fn emit_non_primitive_const(&mut self, spec: &ConstSpec) {
        let names = spec.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
        self.push_line(1, &format!("// moxie:const {names} (immutability enforced statically only)"), spec.span);
        let ty = spec.ty.as_ref().map(|t| format!(" {}", self.emit_type(t))).unwrap_or_default();
        let values = spec.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
        let line = if values.is_empty() { format!("{names}{ty}") } else { format!("{names}{ty} = {values}") };
        self.push_line(1, &line, spec.span);
    }

    fn emit_var_decl(&mut self, specs: &[VarSpec], span: Span) {
        if specs.len() == 1 {
            self.push_line(0, &self.var_spec_line(&specs[0]), span);
            return;
        }
        self.push_line(0, "var (", span);
        for spec in specs {
            let line = self.var_spec_line(spec);
            self.push_line(1, &line, spec.span);
        }
        self.push_line(0, ")", span);
    }

    fn var_spec_line(&mut self, spec: &VarSpec) -> String {
        let names = spec.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
        let ty = spec.ty.as_ref().map(|t| format!(" {}", self.emit_type(t))).unwrap_or_default();
        let values = spec.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
        if values.is_empty() {
            format!("var {names}{ty}")
        } else {
            format!("var {names}{ty} = {values}")
        }
    }

    fn emit_type_decl(&mut self, specs: &[TypeSpec], span: Span) {
        if specs.len() == 1 {
            let line = self.type_spec_line(&specs[0]);
            self.push_line(0, &line, span);
            return;
        }
        self.push_line(0, "type (", span);
        for spec in specs {
            let line = self.type_spec_line(spec);
            self.push_line(1, &line, spec.span);
        }
        self.push_line(0, ")", span);
    }

    fn type_spec_line(&mut self, spec: &TypeSpec) -> String {
        let name = self.sym(spec.name).to_string();
        let tparams = self.emit_type_params(&spec.type_params);
        let assign = if spec.is_alias() { " =" } else { "" };
        format!("type {name}{tparams}{assign} {}", self.emit_type(&spec.ty))
    }

    fn emit_type_params(&mut self, params: &[TypeParam]) -> String {
        if params.is_empty() {
            return String::new();
        }
        let items = params
            .iter()
            .map(|p| {
                let constraint = p.constraint.as_ref().map(|c| self.emit_type(c)).unwrap_or_else(|| "any".to_string());
                format!("{} {}", self.sym(p.name), constraint)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{items}]")
    }

    fn emit_func_decl(&mut self, name: Symbol, receiver: Option<&Field>, sig: &FuncSig, body: Option<&Block>, span: Span) {
        let recv = receiver
            .map(|r| format!("({}) ", self.field_list_one(r)))
            .unwrap_or_default();
        let tparams = self.emit_type_params(&sig.type_params);
        let params = self.emit_params(sig);
        let results = self.emit_results(sig);
        let header = format!("func {recv}{}{tparams}({params}){results}", self.sym(name));
        match body {
            Some(body) => {
                self.push_line(0, &format!("{header} {{"), span);
                self.emit_block_stmts(body, 1);
                self.push_line(0, "}", body.span);
            }
            None => self.push_line(0, &header, span),
        }
    }

    fn field_list_one(&mut self, field: &Field) -> String {
        let name = field.names.first().map(|n| format!("{} ", self.sym(*n))).unwrap_or_default();
        format!("{name}{}", self.emit_type(&field.ty))
    }

    fn emit_params(&mut self, sig: &FuncSig) -> String {
        let mut parts = Vec::new();
        for (i, field) in sig.params.iter().enumerate() {
            let is_last = i + 1 == sig.params.len();
            let ty = if is_last && sig.variadic {
                format!("...{}", self.emit_type(&field.ty))
            } else {
                self.emit_type(&field.ty)
            };
            if field.names.is_empty() {
                parts.push(ty);
            } else {
                let names = field.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
                parts.push(format!("{names} {ty}"));
            }
        }
        parts.join(", ")
    }

    fn emit_results(&mut self, sig: &FuncSig) -> String {
        if sig.results.is_empty() {
            return String::new();
        }
        if sig.results.len() == 1 && sig.results[0].names.is_empty() {
            return format!(" {}", self.emit_type(&sig.results[0].ty));
        }
        let parts = sig
            .results
            .iter()
            .map(|f| self.field_list_one(f))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ({parts})")
    }

    // ---- types ----------------------------------------

    fn basic_kind_of(&self, ty: &Type) -> Option<BasicTypeKind> {
        match ty {
            Type::Basic { kind, .. } => Some(*kind),
            Type::Identifier { name, .. } => BasicTypeKind::lookup(self.sym(*name)),
            Type::Parenthesized { inner, .. } => self.basic_kind_of(inner),
            _ => None,
        }
    }

    fn emit_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Identifier { name, .. } => self.sym(*name).to_string(),
            Type::Basic { kind, .. } => go_basic_name(*kind).to_string(),
            Type::Pointer { elem, .. } => format!("*{}", self.emit_type(elem)),
            Type::Slice { elem, .. } => format!("[]{}", self.emit_type(elem)),
            Type::Array { len, elem, .. } => format!("[{}]{}", self.emit_expr(len), self.emit_type(elem)),
            Type::Map { key, value, .. } => format!("map[{}]{}", self.emit_type(key), self.emit_type(value)),
            Type::Channel { elem, direction, .. } => {
                let prefix = match direction {
                    ChanDirection::Both => "chan ",
                    ChanDirection::SendOnly => "chan<- ",
                    ChanDirection::RecvOnly => "<-chan ",
                };
                format!("{prefix}{}", self.emit_type(elem))
            }
            Type::Struct { fields, .. } => {
                if fields.is_empty() {
                    return "struct{}".to_string();
                }
                let body = fields
                    .iter()
                    .map(|f| format!("\t{}", self.field_list_all(f)))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("struct {{\n{body}\n}}")
            }
            Type::Interface { methods, .. } => {
                if methods.is_empty() {
                    return "interface{}".to_string();
                }
                let body = methods
                    .iter()
                    .map(|m| format!("\t{}", self.field_list_all(m)))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("interface {{\n{body}\n}}")
            }
            Type::Function { sig, .. } => {
                let params = self.emit_params(sig);
                let results = self.emit_results(sig);
                format!("func({params}){results}")
            }
            Type::Parenthesized { inner, .. } => format!("({})", self.emit_type(inner)),
            Type::Bad { .. } => "/* bad type */".to_string(),
        }
    }

    fn field_list_all(&mut self, field: &Field) -> String {
        let ty = self.emit_type(&field.ty);
        if field.names.is_empty() {
            ty
        } else {
            let names = field.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
            format!("{names} {ty}")
        }
    }

    // ---- expressions ----------------------------------------

    /// Emits `expr` with no flavor conversion applied even if it is a bare
    /// byte-slice-flavor identifier — used for the base of an index/selector
    /// chain, where both flavors behave identically under Go subscript.
    fn emit_expr_raw(&mut self, expr: &Expr) -> String {
        if let Expr::Ident { name, .. } = expr {
            return self.sym(*name).to_string();
        }
        self.emit_expr(expr)
    }

    fn emit_expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Bad { .. } => "/* bad expr */".to_string(),
            Expr::Ident { name, .. } => {
                let text = self.sym(*name).to_string();
                if self.current_table().map(|t| t.is_byte_slice(*name)).unwrap_or(false) {
                    format!("string({text})")
                } else {
                    text
                }
            }
            Expr::BasicLit { text, .. } => self.sym(*text).to_string(),
            Expr::Paren { inner, .. } => format!("({})", self.emit_expr(inner)),
            Expr::Selector { expr, sel, .. } => format!("{}.{}", self.emit_expr_raw(expr), self.sym(*sel)),
            Expr::Index { expr, index, .. } => format!("{}[{}]", self.emit_expr_raw(expr), self.emit_expr(index)),
            Expr::Slice { expr, low, high, max, three_index, .. } => {
                let lo = low.as_ref().map(|e| self.emit_expr(e)).unwrap_or_default();
                let hi = high.as_ref().map(|e| self.emit_expr(e)).unwrap_or_default();
                if *three_index {
                    let mx = max.as_ref().map(|e| self.emit_expr(e)).unwrap_or_default();
                    format!("{}[{lo}:{hi}:{mx}]", self.emit_expr_raw(expr))
                } else {
                    format!("{}[{lo}:{hi}]", self.emit_expr_raw(expr))
                }
            }
            Expr::Call { func, args, ellipsis, .. } => self.emit_call(func, args, *ellipsis),
            Expr::Star { expr, .. } => format!("*{}", self.emit_expr(expr)),
            Expr::Unary { op, expr, .. } => format!("{}{}", unary_text(*op), self.emit_expr(expr)),
            Expr::Binary { op, lhs, rhs, .. } => self.emit_binary(*op, lhs, rhs),
            Expr::KeyValue { key, value, .. } => format!("{}: {}", self.emit_expr(key), self.emit_expr(value)),
            Expr::CompositeLit { ty, elements, .. } => {
                let ty_text = ty.as_ref().map(|t| self.emit_type(t)).unwrap_or_default();
                let elems = elements.iter().map(|e| self.emit_expr(e)).collect::<Vec<_>>().join(", ");
                format!("{ty_text}{{{elems}}}")
            }
            Expr::FuncLit { sig, body, .. } => {
                let params = self.emit_params(sig);
                let results = self.emit_results(sig);
                let mut inner = String::new();
                std::mem::swap(&mut inner, &mut self.out);
                let saved_line = self.line;
                self.emit_block_stmts(body, 1);
                std::mem::swap(&mut inner, &mut self.out);
                self.line = saved_line;
                format!("func({params}){results} {{\n{inner}}}")
            }
            Expr::Ellipsis { elem, .. } => match elem {
                Some(t) => format!("...{}", self.emit_type(t)),
                None => "...".to_string(),
            },
            Expr::IndexList { expr, indices, .. } => {
                let idx = indices.iter().map(|t| self.emit_type(t)).collect::<Vec<_>>().join(", ");
                format!("{}[{idx}]", self.emit_expr(expr))
            }
            Expr::TypeAssertion { expr, ty, .. } => format!("{}.({})", self.emit_expr(expr), self.emit_type(ty)),
            Expr::ChanLit { elem, cap, direction, .. } => {
                let ty = match direction {
                    ChanDirection::Both => format!("chan {}", self.emit_type(elem)),
                    ChanDirection::SendOnly => format!("chan<- {}", self.emit_type(elem)),
                    ChanDirection::RecvOnly => format!("<-chan {}", self.emit_type(elem)),
                };
                match cap {
                    Some(c) => format!("make({ty}, {})", self.emit_expr(c)),
                    None => format!("make({ty})"),
                }
            }
            Expr::SliceLit { elem, elements, .. } => {
                let elems = elements.iter().map(|e| self.emit_expr(e)).collect::<Vec<_>>().join(", ");
                format!("[]{}{{{elems}}}", self.emit_type(elem))
            }
            Expr::MapLit { key, value, elements, .. } => {
                let elems = elements.iter().map(|e| self.emit_expr(e)).collect::<Vec<_>>().join(", ");
                format!("map[{}]{}{{{elems}}}", self.emit_type(key), self.emit_type(value))
            }
            Expr::TypeCoercion { target, endian, expr, .. } => self.emit_coercion(target, *endian, expr),
            Expr::FfiCall { kind, sig, args, .. } => self.emit_ffi_call(*kind, sig.as_deref(), args),
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> String {
        // `+` on slices (§4.E): only the syntactically-detectable case (an
        // operand that is itself a slice literal or coercion) is routed
        // through the runtime `Concat` helper -- without a type checker,
        // this is the best static approximation reachable (see `rules.rs`'s
        // own note on R6/R8/R10 for the same tradeoff one stage earlier).
        if op == BinaryOp::Add && (is_slice_shaped(lhs) || is_slice_shaped(rhs)) {
            return format!("{}.Concat({}, {})", RUNTIME_ALIAS, self.emit_expr(lhs), self.emit_expr(rhs));
        }
        format!("{} {} {}", self.emit_expr(lhs), binary_text(op), self.emit_expr(rhs))
    }

    fn emit_call(&mut self, func: &Expr, args: &[Expr], ellipsis: bool) -> String {
        if let Expr::Ident { name, .. } = func {
            let text = self.sym(*name);
            if let Some(runtime_fn) = runtime_builtin_name(text) {
                let arg_text = args.iter().map(|a| self.emit_expr(a)).collect::<Vec<_>>().join(", ");
                return format!("{RUNTIME_ALIAS}.{runtime_fn}({arg_text})");
            }
            // Forced Str -> ByteSlice conversion at call sites into a
            // byte-slice-flavor parameter (§9 Open Question resolution:
            // conservative, forward-only across call sites).
            let callee = *name;
            let arg_text = args
                .iter()
                .enumerate()
                .map(|(i, a)| self.emit_call_arg(callee, i, a))
                .collect::<Vec<_>>()
                .join(", ");
            let dots = if ellipsis { "..." } else { "" };
            return format!("{text}({arg_text}{dots})");
        }
        let func_text = self.emit_expr(func);
        let arg_text = args.iter().map(|a| self.emit_expr(a)).collect::<Vec<_>>().join(", ");
        let dots = if ellipsis { "..." } else { "" };
        format!("{func_text}({arg_text}{dots})")
    }

    fn emit_call_arg(&mut self, callee: Symbol, index: usize, arg: &Expr) -> String {
        if let Expr::Ident { name, .. } = arg {
            let caller_is_str = self.current_table().map(|t| t.flavor_of(*name)) == Some(Some(Flavor::Str));
            let callee_wants_bytes = self.analysis.signatures.param_flavor(callee, index) == Some(Flavor::ByteSlice);
            if caller_is_str && callee_wants_bytes {
                return format!("[]byte({})", self.sym(*name));
            }
        }
        self.emit_expr(arg)
    }

    fn emit_coercion(&mut self, target: &Type, endian: Option<Endian>, expr: &Expr) -> String {
        let elem = elem_type_of(target).map(|t| self.emit_type(t)).unwrap_or_default();
        let src = self.emit_expr(expr);
        match endian {
            Some(Endian::Little) => format!("{RUNTIME_ALIAS}.CoerceLE[{elem}]({src})"),
            Some(Endian::Big) => format!("{RUNTIME_ALIAS}.CoerceBE[{elem}]({src})"),
            Some(Endian::Native) | None => format!("{RUNTIME_ALIAS}.Coerce[{elem}]({src})"),
        }
    }

    fn emit_ffi_call(&mut self, kind: FfiKind, sig: Option<&Type>, args: &[Expr]) -> String {
        let arg_text = args.iter().map(|a| self.emit_expr(a)).collect::<Vec<_>>().join(", ");
        match kind {
            FfiKind::Dlopen => format!("{RUNTIME_ALIAS}.DlOpen({arg_text})"),
            FfiKind::Dlclose => format!("{RUNTIME_ALIAS}.DlClose({arg_text})"),
            FfiKind::Dlsym => {
                let sig_text = sig.map(|t| self.emit_type(t)).unwrap_or_else(|| "func()".to_string());
                format!("{RUNTIME_ALIAS}.MakeTrampoline[{sig_text}]({RUNTIME_ALIAS}.DlSym({arg_text}))")
            }
        }
    }

    // ---- statements ----------------------------------------

    fn emit_block_stmts(&mut self, block: &Block, indent: usize) {
        for stmt in &block.stmts {
            self.emit_stmt(stmt, indent);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt, indent: usize) {
        match stmt {
            Stmt::Empty { .. } => {}
            Stmt::Bad { span } => self.push_line(indent, "/* bad statement */", *span),
            Stmt::Labeled { label, stmt, span } => {
                self.push_line(indent.saturating_sub(1), &format!("{}:", self.sym(*label)), *span);
                self.emit_stmt(stmt, indent);
            }
            Stmt::Expr { expr, span } => {
                let text = self.emit_expr(expr);
                self.push_line(indent, &text, *span);
            }
            Stmt::Send { chan, value, span } => {
                let line = format!("{} <- {}", self.emit_expr(chan), self.emit_expr(value));
                self.push_line(indent, &line, *span);
            }
            Stmt::IncDec { expr, op, span } => {
                let line = format!("{}{}", self.emit_expr(expr), incdec_text(*op));
                self.push_line(indent, &line, *span);
            }
            Stmt::Assign { lhs, op, rhs, span } => self.emit_assign(lhs, *op, rhs, indent, *span),
            Stmt::Go { call, span } => {
                let line = format!("go {}", self.emit_expr(call));
                self.push_line(indent, &line, *span);
            }
            Stmt::Defer { call, span } => {
                let line = format!("defer {}", self.emit_expr(call));
                self.push_line(indent, &line, *span);
            }
            Stmt::Return { results, span } => {
                if results.is_empty() {
                    self.push_line(indent, "return", *span);
                } else {
                    let vals = results.iter().map(|r| self.emit_expr(r)).collect::<Vec<_>>().join(", ");
                    self.push_line(indent, &format!("return {vals}"), *span);
                }
            }
            Stmt::Branch { kind, label, span } => {
                let label_text = label.map(|l| format!(" {}", self.sym(l))).unwrap_or_default();
                self.push_line(indent, &format!("{}{label_text}", branch_text(*kind)), *span);
            }
            Stmt::Block { stmts, span } => {
                self.push_line(indent, "{", *span);
                for s in stmts {
                    self.emit_stmt(s, indent + 1);
                }
                self.push_line(indent, "}", *span);
            }
            Stmt::If { init, cond, then_branch, else_branch, span } => {
                let prefix = init.as_ref().map(|i| format!("{}; ", self.stmt_inline(i))).unwrap_or_default();
                let cond_text = self.emit_expr(cond);
                self.push_line(indent, &format!("if {prefix}{cond_text} {{"), *span);
                self.emit_block_stmts(then_branch, indent + 1);
                match else_branch {
                    Some(e) => {
                        self.push_line(indent, "} else {", then_branch.span);
                        self.emit_else(e, indent + 1);
                        self.push_line(indent, "}", *span);
                    }
                    None => self.push_line(indent, "}", then_branch.span),
                }
            }
            Stmt::Switch { init, tag, cases, span } => {
                let prefix = init.as_ref().map(|i| format!("{}; ", self.stmt_inline(i))).unwrap_or_default();
                let tag_text = tag.as_ref().map(|t| format!("{} ", self.emit_expr(t))).unwrap_or_default();
                self.push_line(indent, &format!("switch {prefix}{tag_text}{{"), *span);
                for case in cases {
                    self.emit_case(case, indent);
                }
                self.push_line(indent, "}", *span);
            }
            Stmt::TypeSwitch { init, bind, subject, cases, span } => {
                let prefix = init.as_ref().map(|i| format!("{}; ", self.stmt_inline(i))).unwrap_or_default();
                let subject_text = self.emit_expr(subject);
                let bind_text = bind.map(|b| format!("{} := ", self.sym(b))).unwrap_or_default();
                self.push_line(indent, &format!("switch {prefix}{bind_text}{subject_text}.(type) {{"), *span);
                for case in cases {
                    self.emit_type_case(case, indent);
                }
                self.push_line(indent, "}", *span);
            }
            Stmt::Select { cases, span } => {
                self.push_line(indent, "select {", *span);
                for case in cases {
                    self.emit_comm_clause(case, indent);
                }
                self.push_line(indent, "}", *span);
            }
            Stmt::For { init, cond, post, body, span } => {
                let init_text = init.as_ref().map(|i| self.stmt_inline(i)).unwrap_or_default();
                let cond_text = cond.as_ref().map(|c| self.emit_expr(c)).unwrap_or_default();
                let post_text = post.as_ref().map(|p| self.stmt_inline(p)).unwrap_or_default();
                let header = if init.is_none() && post.is_none() {
                    cond_text
                } else {
                    format!("{init_text}; {cond_text}; {post_text}")
                };
                self.push_line(indent, &format!("for {header} {{"), *span);
                self.emit_block_stmts(body, indent + 1);
                self.push_line(indent, "}", body.span);
            }
            Stmt::Range { key, value, define, expr, body, span } => {
                let binder = if *define { ":=" } else { "=" };
                let key_text = key.as_ref().map(|k| self.emit_expr(k));
                let value_text = value.as_ref().map(|v| self.emit_expr(v));
                let lhs = match (key_text, value_text) {
                    (Some(k), Some(v)) => format!("{k}, {v} {binder} "),
                    (Some(k), None) => format!("{k} {binder} "),
                    (None, Some(v)) => format!("_, {v} {binder} "),
                    (None, None) => String::new(),
                };
                let expr_text = self.emit_expr(expr);
                self.push_line(indent, &format!("for {lhs}range {expr_text} {{"), *span);
                self.emit_block_stmts(body, indent + 1);
                self.push_line(indent, "}", body.span);
            }
            Stmt::Decl { decl, span } => {
                let line = self.local_decl_line(decl);
                self.push_line(indent, &line, *span);
            }
        }
    }

    /// Renders an `if`/`for` init or post statement inline (no trailing
    /// newline/semicolon of its own) for embedding in a header line.
    fn stmt_inline(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Assign { lhs, op, rhs, .. } => self.assign_line(lhs, *op, rhs),
            Stmt::IncDec { expr, op, .. } => format!("{}{}", self.emit_expr(expr), incdec_text(*op)),
            Stmt::Expr { expr, .. } => self.emit_expr(expr),
            Stmt::Decl { decl, .. } => self.local_decl_line(decl),
            _ => String::new(),
        }
    }

    fn local_decl_line(&mut self, decl: &Decl) -> String {
        match decl {
            Decl::Var { specs, .. } if specs.len() == 1 => self.var_spec_line(&specs[0]),
            Decl::Const { specs, .. } if specs.len() == 1 => {
                let spec = &specs[0];
                let names = spec.names.iter().map(|n| self.sym(*n).to_string()).collect::<Vec<_>>().join(", ");
                let ty = spec.ty.as_ref().map(|t| format!(" {}", self.emit_type(t))).unwrap_or_default();
                let values = spec.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
                format!("const {names}{ty} = {values}")
            }
            Decl::Type { specs, .. } if specs.len() == 1 => self.type_spec_line(&specs[0]),
            _ => "/* unsupported local grouped declaration */".to_string(),
        }
    }

    fn emit_else(&mut self, stmt: &Stmt, indent: usize) {
        match stmt {
            Stmt::If { .. } => self.emit_stmt(stmt, indent.saturating_sub(1)),
            Stmt::Block { stmts, .. } => {
                for s in stmts {
                    self.emit_stmt(s, indent);
                }
            }
            other => self.emit_stmt(other, indent),
        }
    }

    fn emit_assign(&mut self, lhs: &[Expr], op: AssignOp, rhs: &[Expr], indent: usize, span: Span) {
        let line = self.assign_line(lhs, op, rhs);
        self.push_line(indent, &line, span);
    }

    fn assign_line(&mut self, lhs: &[Expr], op: AssignOp, rhs: &[Expr]) -> String {
        let lhs_text = lhs.iter().map(|l| self.emit_assign_target(l)).collect::<Vec<_>>().join(", ");
        let rhs_text = rhs.iter().map(|r| self.emit_expr(r)).collect::<Vec<_>>().join(", ");
        format!("{lhs_text} {} {rhs_text}", assign_text(op))
    }

    /// An assignment target never gets the `string(...)` read-conversion
    /// (§4.E flavor tracking: the target of a subscript-assignment is what
    /// *drives* byte-slice flavor in the first place), but a non-index bare
    /// ident target is emitted the same as any other reference to it.
    fn emit_assign_target(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Index { expr, index, .. } => format!("{}[{}]", self.emit_expr_raw(expr), self.emit_expr(index)),
            Expr::Ident { name, .. } => self.sym(*name).to_string(),
            other => self.emit_expr(other),
        }
    }

    fn emit_case(&mut self, case: &CaseClause, indent: usize) {
        if case.values.is_empty() {
            self.push_line(indent, "default:", case.span);
        } else {
            let vals = case.values.iter().map(|v| self.emit_expr(v)).collect::<Vec<_>>().join(", ");
            self.push_line(indent, &format!("case {vals}:"), case.span);
        }
        for s in &case.body {
            self.emit_stmt(s, indent + 1);
        }
    }

    fn emit_type_case(&mut self, case: &TypeCaseClause, indent: usize) {
        if case.types.is_empty() {
            self.push_line(indent, "default:", case.span);
        } else {
            let tys = case.types.iter().map(|t| self.emit_type(t)).collect::<Vec<_>>().join(", ");
            self.push_line(indent, &format!("case {tys}:"), case.span);
        }
        for s in &case.body {
            self.emit_stmt(s, indent + 1);
        }
    }

    fn emit_comm_clause(&mut self, clause: &CommClause, indent: usize) {
        let header = match (&clause.direction, &clause.chan) {
            (None, _) => "default:".to_string(),
            (Some(CommDirection::Send), Some(chan)) => {
                let value = clause.value.as_ref().map(|v| self.emit_expr(v)).unwrap_or_default();
                format!("case {} <- {value}:", self.emit_expr(chan))
            }
            (Some(CommDirection::Recv), Some(chan)) => {
                let binder = if clause.define { ":=" } else { "=" };
                let binds = clause.bind.iter().map(|b| self.sym(*b).to_string()).collect::<Vec<_>>().join(", ");
                let lhs = if binds.is_empty() { String::new() } else { format!("{binds} {binder} ") };
                format!("case {lhs}<-{}:", self.emit_expr(chan))
            }
            (Some(_), None) => "default:".to_string(),
        };
        self.push_line(indent, &header, clause.span);
        for s in &clause.body {
            self.emit_stmt(s, indent + 1);
        }
    }
}

// ---- free functions ----------------------------------------

fn elem_type_of(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Slice { elem, .. } => Some(elem),
        Type::Parenthesized { inner, .. } => elem_type_of(inner),
        _ => None,
    }
}

fn is_slice_shaped(expr: &Expr) -> bool {
    matches!(expr, Expr::SliceLit { .. } | Expr::TypeCoercion { .. })
}

fn runtime_builtin_name(ident: &str) -> Option<&'static str> {
    Some(match ident {
        "clone" => "Clone",
        "free" => "Free",
        "grow" => "Grow",
        "clear" => "Clear",
        _ => return None,
    })
}

/// `true` if `file` needs the runtime package import at all.
fn uses_runtime(file: &File, interner: &Interner) -> bool {
    file.decls.iter().any(|d| decl_uses_runtime(d, interner))
}

fn decl_uses_runtime(decl: &Decl, interner: &Interner) -> bool {
    match decl {
        Decl::Const { specs, .. } => specs.iter().any(|s| s.values.iter().any(|e| expr_uses_runtime(e, interner))),
        Decl::Var { specs, .. } => specs.iter().any(|s| s.values.iter().any(|e| expr_uses_runtime(e, interner))),
        Decl::Func { body, .. } => body.as_ref().map(|b| block_uses_runtime(b, interner)).unwrap_or(false),
        _ => false,
    }
}

fn block_uses_runtime(block: &Block, interner: &Interner) -> bool {
    block.stmts.iter().any(|s| stmt_uses_runtime(s, interner))
}

fn stmt_uses_runtime(stmt: &Stmt, interner: &Interner) -> bool {
    match stmt {
        Stmt::Expr { expr, .. } => expr_uses_runtime(expr, interner),
        Stmt::Send { chan, value, .. } => expr_uses_runtime(chan, interner) || expr_uses_runtime(value, interner),
        Stmt::IncDec { expr, .. } => expr_uses_runtime(expr, interner),
        Stmt::Assign { lhs, rhs, .. } => lhs.iter().chain(rhs).any(|e| expr_uses_runtime(e, interner)),
        Stmt::Go { call, .. } | Stmt::Defer { call, .. } => expr_uses_runtime(call, interner),
        Stmt::Return { results, .. } => results.iter().any(|e| expr_uses_runtime(e, interner)),
        Stmt::Block { stmts, .. } => stmts.iter().any(|s| stmt_uses_runtime(s, interner)),
        Stmt::Labeled { stmt, .. } => stmt_uses_runtime(stmt, interner),
        Stmt::If { init, cond, then_branch, else_branch, .. } => {
            init.as_deref().map(|s| stmt_uses_runtime(s, interner)).unwrap_or(false)
                || expr_uses_runtime(cond, interner)
                || block_uses_runtime(then_branch, interner)
                || else_branch.as_deref().map(|s| stmt_uses_runtime(s, interner)).unwrap_or(false)
        }
        Stmt::Switch { cases, .. } => cases.iter().any(|c| c.body.iter().any(|s| stmt_uses_runtime(s, interner))),
        Stmt::TypeSwitch { cases, .. } => cases.iter().any(|c| c.body.iter().any(|s| stmt_uses_runtime(s, interner))),
        Stmt::Select { cases, .. } => cases.iter().any(|c| c.body.iter().any(|s| stmt_uses_runtime(s, interner))),
        Stmt::For { init, cond, post, body, .. } => {
            init.as_deref().map(|s| stmt_uses_runtime(s, interner)).unwrap_or(false)
                || cond.as_ref().map(|e| expr_uses_runtime(e, interner)).unwrap_or(false)
                || post.as_deref().map(|s| stmt_uses_runtime(s, interner)).unwrap_or(false)
                || block_uses_runtime(body, interner)
        }
        Stmt::Range { expr, body, .. } => expr_uses_runtime(expr, interner) || block_uses_runtime(body, interner),
        Stmt::Decl { decl, .. } => decl_uses_runtime(decl, interner),
        _ => false,
    }
}

fn expr_uses_runtime(expr: &Expr, interner: &Interner) -> bool {
    match expr {
        Expr::FfiCall { .. } | Expr::TypeCoercion { .. } => true,
        Expr::Call { func, args, .. } => {
            let is_builtin = matches!(&**func, Expr::Ident { name, .. } if runtime_builtin_name(interner.resolve(*name)).is_some());
            is_builtin || args.iter().any(|a| expr_uses_runtime(a, interner))
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            (*op == BinaryOp::Add && (is_slice_shaped(lhs) || is_slice_shaped(rhs)))
                || expr_uses_runtime(lhs, interner)
                || expr_uses_runtime(rhs, interner)
        }
        Expr::Paren { inner, .. } => expr_uses_runtime(inner, interner),
        Expr::Star { expr: inner, .. } | Expr::Unary { expr: inner, .. } => expr_uses_runtime(inner, interner),
        Expr::Selector { expr, .. } => expr_uses_runtime(expr, interner),
        Expr::Index { expr, index, .. } => expr_uses_runtime(expr, interner) || expr_uses_runtime(index, interner),
        Expr::Slice { expr, low, high, max, .. } => {
            expr_uses_runtime(expr, interner)
                || [low, high, max].into_iter().flatten().any(|e| expr_uses_runtime(e, interner))
        }
        Expr::KeyValue { key, value, .. } => expr_uses_runtime(key, interner) || expr_uses_runtime(value, interner),
        Expr::CompositeLit { elements, .. } | Expr::SliceLit { elements, .. } | Expr::MapLit { elements, .. } => {
            elements.iter().any(|e| expr_uses_runtime(e, interner))
        }
        Expr::ChanLit { cap, .. } => cap.as_deref().map(|e| expr_uses_runtime(e, interner)).unwrap_or(false),
        Expr::FuncLit { body, .. } => block_uses_runtime(body, interner),
        Expr::TypeAssertion { expr, .. } => expr_uses_runtime(expr, interner),
        Expr::IndexList { expr, .. } => expr_uses_runtime(expr, interner),
        _ => false,
    }
}

fn go_basic_name(kind: BasicTypeKind) -> &'static str {
    use BasicTypeKind::*;
    match kind {
        Bool => "bool",
        Int8 => "int8",
        Int16 => "int16",
        Int32 => "int32",
        Int64 => "int64",
        Uint8 => "uint8",
        Uint16 => "uint16",
        Uint32 => "uint32",
        Uint64 => "uint64",
        Float32 => "float32",
        Float64 => "float64",
        Complex64 => "complex64",
        Complex128 => "complex128",
        String => "string",
        Byte => "byte",
        Rune => "rune",
    }
}

fn assign_text(op: AssignOp) -> &'static str {
    use AssignOp::*;
    match op {
        Assign => "=",
        Define => ":=",
        AddAssign => "+=",
        SubAssign => "-=",
        MulAssign => "*=",
        QuoAssign => "/=",
        RemAssign => "%=",
        AndAssign => "&=",
        OrAssign => "|=",
        XorAssign => "^=",
        ShlAssign => "<<=",
        ShrAssign => ">>=",
        AndNotAssign => "&^=",
    }
}

fn unary_text(op: UnaryOp) -> &'static str {
    use UnaryOp::*;
    match op {
        Plus => "+",
        Minus => "-",
        Not => "!",
        Caret => "^",
        Amp => "&",
        Recv => "<-",
    }
}

fn binary_text(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Quo => "/",
        Rem => "%",
        And => "&",
        Or => "|",
        Xor => "^",
        Shl => "<<",
        Shr => ">>",
        AndNot => "&^",
        LogicalAnd => "&&",
        LogicalOr => "||",
        Eq => "==",
        NotEq => "!=",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
    }
}

fn incdec_text(op: IncDecOp) -> &'static str {
    match op {
        IncDecOp::Inc => "++",
        IncDecOp::Dec => "--",
    }
}

fn branch_text(kind: BranchKind) -> &'static str {
    match kind {
        BranchKind::Break => "break",
        BranchKind::Continue => "continue",
        BranchKind::Goto => "goto",
        BranchKind::Fallthrough => "fallthrough",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moxie_base::Interner;

    fn emit_src(src: &str) -> String {
        let mut interner = Interner::new();
        let (file, diags) = moxie_syntax::parse(src, "t.x", &mut interner);
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags:?}");
        emit(&file, &interner).source
    }

    #[test]
    fn hello_world_emits_unchanged() {
        let out = emit_src("package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"Hello, Moxie!\")\n}\n");
        assert!(out.contains("package main"));
        assert!(out.contains("import (\n\t\"fmt\"\n)"));
        assert!(out.contains("fmt.Println(\"Hello, Moxie!\")"));
    }

    #[test]
    fn slice_literal_lowers_to_plain_composite_literal() {
        let out = emit_src("package x\nfunc f() *[]int32 { return &[]int32{1,2,3} }\n");
        assert!(out.contains("func f() []int32 {"));
        assert!(out.contains("return []int32{1, 2, 3}"));
    }

    #[test]
    fn channel_literal_lowers_to_make() {
        let out = emit_src("package x\nfunc f() { ch := &chan int32{cap: 10} }\n");
        assert!(out.contains("ch := make(chan int32, 10)"));
    }

    #[test]
    fn big_endian_coercion_lowers_to_runtime_call() {
        let out = emit_src("package x\nfunc f(bytes *[]byte) *[]uint32 { return (*[]uint32, BigEndian)(bytes) }\n");
        assert!(out.contains("moxiert.CoerceBE[uint32](bytes)"));
        assert!(out.contains("import (\n\tmoxiert \"moxie.dev/runtime\"\n)"));
    }

    #[test]
    fn ffi_calls_lower_to_runtime_and_trampoline() {
        let out = emit_src(
            "package x\nfunc f() { lib := dlopen(\"libc.so.6\", RTLD_LAZY)\n strlen := dlsym[func(*byte) int64](lib, \"strlen\")\n }\n",
        );
        assert!(out.contains("moxiert.DlOpen(\"libc.so.6\", RTLD_LAZY)"));
        assert!(out.contains("moxiert.MakeTrampoline[func(*byte) int64](moxiert.DlSym(lib, \"strlen\"))"));
    }

    #[test]
    fn byte_slice_flavor_binding_gets_string_conversion_at_read_site() {
        let out = emit_src(
            "package x\nimport \"fmt\"\nfunc f() { s := \"hi\"\n s[0] = 72\n fmt.Println(s) }\n",
        );
        assert!(out.contains("s[0] = 72"));
        assert!(out.contains("fmt.Println(string(s))"));
    }

    #[test]
    fn grow_and_clone_builtins_route_through_runtime() {
        let out = emit_src("package x\nfunc f(s *[]int32) { s = grow(s, 4)\n t := clone(s) \n _ = t }\n");
        assert!(out.contains("moxiert.Grow(s, 4)"));
        assert!(out.contains("moxiert.Clone(s)"));
    }

    #[test]
    fn non_primitive_const_lowers_to_var_with_marker_comment() {
        let out = emit_src("package x\nconst M = &map[string]int32{\"a\": 1}\n");
        assert!(out.contains("// moxie:const M"));
        assert!(out.contains("var M = map[string]int32{\"a\": 1}"));
    }

    #[test]
    fn deterministic_emission_is_stable_across_runs() {
        let src = "package x\nfunc f() *[]int32 { return &[]int32{1,2,3} }\n";
        assert_eq!(emit_src(src), emit_src(src));
    }
}
