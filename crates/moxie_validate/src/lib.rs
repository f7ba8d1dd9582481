//! # moxie-validate
//!
//! Stage D of the pipeline (spec.md §4.D): the semantic validator. Operates
//! over the AST `moxie_syntax` builds, enforcing the rules the grammar
//! itself cannot — const mutability (R3), explicit-pointer container
//! discipline (R1/R2), FFI call shape (R5), coercion element types (R6),
//! endianness identifiers (R7), channel direction (R8), the `make`/`int`/
//! `uint` bans (R4/R9), and `len`/`cap` narrowing (R10).
//!
//! [`symtab`] is the scoped declaration table built in a first pass over
//! top-level declarations; [`rules`] is the rule table itself, run in a
//! second pass that also walks function bodies. The validator never aborts
//! early (§4.D: "The validator itself never fails; it accumulates
//! diagnostics") — [`validate`] always returns its full diagnostic list,
//! sorted per §5's `(line, column, rule-id)` ordering guarantee.

pub mod rules;
pub mod symtab;

pub use rules::validate;
pub use symtab::{DeclEntry, DeclId, DeclKind, ScopeId, SymbolTable};
