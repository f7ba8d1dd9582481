//! The three external interfaces spec.md §6 carves the core away from:
//! a source reader, an output sink, and a toolchain invoker. Everything
//! else in this crate consumes only these trait objects, so an in-memory
//! test harness can swap in fixtures without touching a filesystem (spec.md
//! §1: "filesystem walking... and process invocation... are thin glue; the
//! core consumes them through two interfaces only").
//!
//! Default filesystem-backed implementations are grounded on the teacher's
//! `find_project_root`/`copy_dir_recursive` directory walking in
//! `apps/logicaffeine_cli/src/project/build.rs`, generalized from a manual
//! recursive walk to `walkdir` (the crate `foundry-compilers` — a sibling
//! pack member — already uses for the identical "walk a project tree"
//! purpose) and from a blocking `Command::output()` call to one that also
//! relays stdio live, matching `moxie_build`'s relay contract (§6: "blocks,
//! relays stdio, and propagates the child's exit status").

use moxie_base::{MoxieError, SourceUnit};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Yields every source unit under a project root, filtered to `.x`/`.go`
/// files (spec.md §6).
pub trait SourceReader {
    fn read_all(&self, root: &Path) -> Result<Vec<SourceUnit>, MoxieError>;
}

/// Accepts transpiled (or passed-through) output, writing it under a
/// staging tree (spec.md §6).
pub trait OutputSink {
    fn write(&self, rel_path: &Path, bytes: &[u8]) -> Result<(), MoxieError>;
}

/// Invokes the host Go toolchain in the staging directory with a given
/// argument vector (spec.md §6).
pub trait ToolchainInvoker {
    fn invoke(&self, staging_dir: &Path, argv: &[String]) -> Result<i32, MoxieError>;
}

/// Maps a relative source path to its emitted output path: `a/b/c.x` ->
/// `a/b/c.go`; `.go` passes through unchanged (spec.md §6).
pub fn output_path_for(rel_path: &Path) -> PathBuf {
    if rel_path.extension().and_then(|e| e.to_str()) == Some("x") {
        rel_path.with_extension("go")
    } else {
        rel_path.to_path_buf()
    }
}

/// Filesystem-backed [`SourceReader`]: recursively walks `root`, yielding
/// every `.x`/`.go` file it finds, sorted by relative path for deterministic
/// fan-out order.
#[derive(Debug, Clone, Default)]
pub struct FsSourceReader;

impl SourceReader for FsSourceReader {
    fn read_all(&self, root: &Path) -> Result<Vec<SourceUnit>, MoxieError> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                matches!(
                    entry.path().extension().and_then(|e| e.to_str()),
                    Some("x") | Some("go")
                )
            })
            .map(|entry| entry.into_path())
            .collect();
        paths.sort();

        let mut units = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = std::fs::read(&path).map_err(|source| MoxieError::Io {
                path: path.clone(),
                source,
            })?;
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            units.push(SourceUnit::new(rel, bytes));
        }
        Ok(units)
    }
}

/// Filesystem-backed [`OutputSink`]: writes under a fixed staging root,
/// creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct FsOutputSink {
    pub staging_dir: PathBuf,
}

impl FsOutputSink {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }
}

impl OutputSink for FsOutputSink {
    fn write(&self, rel_path: &Path, bytes: &[u8]) -> Result<(), MoxieError> {
        let dest = self.staging_dir.join(rel_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MoxieError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&dest, bytes).map_err(|source| MoxieError::Io {
            path: dest,
            source,
        })
    }
}

/// Subprocess-backed [`ToolchainInvoker`]: runs `argv[0]` with the remaining
/// elements as arguments, in `staging_dir`, relaying stdio directly to the
/// parent process (the teacher's `build.rs` captures output instead; this
/// crate relays live since §6 says the invoker "relays stdio", not "captures
/// it", which matters for `run`/`test` where the child's own interactive
/// output must reach the user as it happens).
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker;

impl ToolchainInvoker for ProcessInvoker {
    fn invoke(&self, staging_dir: &Path, argv: &[String]) -> Result<i32, MoxieError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(MoxieError::Toolchain("empty command vector".into()));
        };
        let status = Command::new(program)
            .args(args)
            .current_dir(staging_dir)
            .status()
            .map_err(|e| MoxieError::Toolchain(format!("{program}: {e}")))?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn output_path_rewrites_x_extension_to_go() {
        assert_eq!(output_path_for(Path::new("a/b/c.x")), PathBuf::from("a/b/c.go"));
    }

    #[test]
    fn output_path_passes_through_go_files() {
        assert_eq!(output_path_for(Path::new("a/b/c.go")), PathBuf::from("a/b/c.go"));
    }

    #[test]
    fn fs_reader_finds_x_and_go_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.x"), b"package b").unwrap();
        std::fs::write(tmp.path().join("a.go"), b"package a").unwrap();
        std::fs::write(tmp.path().join("ignore.txt"), b"nope").unwrap();

        let reader = FsSourceReader;
        let units = reader.read_all(tmp.path()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].path, PathBuf::from("a.go"));
        assert_eq!(units[1].path, PathBuf::from("b.x"));
    }

    #[test]
    fn fs_sink_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = FsOutputSink::new(tmp.path());
        sink.write(Path::new("nested/dir/out.go"), b"package main").unwrap();
        assert!(tmp.path().join("nested/dir/out.go").exists());
    }

    #[test]
    fn process_invoker_propagates_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = ProcessInvoker;
        let code = invoker
            .invoke(tmp.path(), &["false".to_string()])
            .unwrap();
        assert_ne!(code, 0);
    }
}
