//! # moxie-build
//!
//! Stage F of the pipeline (spec.md §4.F): given a project root and a
//! staging directory, this crate runs every source unit through stages A-E
//! (via [`pipeline`]) in parallel, writes emitted output and a vendored
//! runtime into the staging tree, and invokes the host Go toolchain,
//! relaying its diagnostics back to Moxie source positions.
//!
//! [`interfaces`] defines the three external interfaces spec.md §6 draws
//! the boundary at (source reader, output sink, toolchain invoker) plus
//! filesystem-backed defaults; [`config`] is the `moxie.toml` project
//! manifest; [`orchestrator`] is the driver tying everything together;
//! [`diagnostic_relay`] maps `go build` diagnostics back through the
//! emitter's sourcemap and the preprocessor's remap table.

pub mod config;
pub mod diagnostic_relay;
pub mod interfaces;
pub mod orchestrator;
pub mod pipeline;

pub use config::{Manifest, ManifestError};
pub use orchestrator::{BuildOutcome, Command, Orchestrator};
