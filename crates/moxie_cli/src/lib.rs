//! # moxie-cli
//!
//! The ambient, explicitly non-core driver shell (spec.md §1: "filesystem
//! walking, temp-directory management, process invocation of the host Go
//! compiler... and CLI argument parsing... are thin glue"). This crate owns
//! none of the translation pipeline — it parses arguments with `clap`,
//! scaffolds new projects, and calls into [`moxie_build::Orchestrator`].
//!
//! Grounded on `apps/logicaffeine_cli`'s split between a `cli` module
//! (argument parsing + dispatch) and the library re-exports consumed by
//! `main.rs`.

pub mod cli;

pub use cli::run_cli;
