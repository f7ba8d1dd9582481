//! Moxie CLI (`moxie`) — standalone binary.
//!
//! Thin wrapper around [`moxie_cli::run_cli`]: parses arguments, installs
//! the tracing subscriber, and translates the result into an exit code. All
//! command logic lives in the library crate (`moxie_cli::cli`) for
//! testability, mirroring the teacher's `apps/logicaffeine_cli` split
//! between a near-empty `main.rs` and a fully tested `lib.rs`.

fn main() {
    if let Err(e) = moxie_cli::run_cli() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
