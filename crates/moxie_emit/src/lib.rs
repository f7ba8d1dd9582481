//! # moxie-emit
//!
//! Stage E of the pipeline (spec.md §4.E): lowers a validated Moxie AST to
//! Go source text. [`flavor`] is the two-pass string/byte-slice flavor
//! inference §9's Design Notes describe; [`lower`] is the emitter proper,
//! consuming a `FlavorAnalysis` to decide how each string-typed binding
//! prints; [`sourcemap`] records emitted-line -> source-span for
//! `moxie_build`'s toolchain diagnostic relay.

pub mod flavor;
pub mod lower;
pub mod sourcemap;

pub use lower::{emit, EmitResult};
