//! The Go-language runtime support library every emitted Moxie program links
//! against (spec.md §6). This crate implements none of the transpiler logic
//! — it is a vendoring mechanism: the actual library is literal Go source
//! under `go/`, embedded into the binary with [`include_dir`] exactly as the
//! teacher's root crate vendors its own support files, and written out into
//! a build's staging directory by `moxie_build`.
//!
//! The embedded tree is a Go module (`go.mod` declares `moxie.dev/runtime`,
//! matching `moxie_emit::lower::RUNTIME_IMPORT_PATH`) so `moxie_build` can
//! stage it as a `replace`-directive local dependency of the generated
//! project rather than a package subdirectory.

use include_dir::{include_dir, Dir};
use std::io;
use std::path::Path;

/// The embedded runtime source tree (`go.mod` plus every `*.go` file).
pub static RUNTIME_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/go");

/// Writes the embedded runtime tree to `dest`, creating directories as
/// needed. Mirrors the teacher's `copy_dir_recursive` + `copy_runtime_crates`
/// shape, generalized from "copy a sibling crate directory" to "extract an
/// embedded directory," since the vendored tree here lives inside the
/// binary rather than on disk at build time.
pub fn vendor_into(dest: &Path) -> io::Result<()> {
    extract_dir(&RUNTIME_DIR, dest)
}

fn extract_dir(dir: &Dir<'_>, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in dir.entries() {
        match entry {
            include_dir::DirEntry::Dir(sub) => {
                let sub_dest = dest.join(sub.path().file_name().unwrap());
                extract_dir(sub, &sub_dest)?;
            }
            include_dir::DirEntry::File(file) => {
                let file_dest = dest.join(file.path().file_name().unwrap());
                std::fs::write(file_dest, file.contents())?;
            }
        }
    }
    Ok(())
}

/// The Go import path the emitter's runtime calls are qualified under.
/// Kept here (rather than only in `moxie_emit`) so `moxie_build` can assert
/// the two agree without a circular crate dependency.
pub const IMPORT_PATH: &str = "moxie.dev/runtime";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tree_contains_go_mod() {
        assert!(RUNTIME_DIR.get_file("go.mod").is_some());
    }

    #[test]
    fn embedded_tree_contains_ffi_and_slice_sources() {
        assert!(RUNTIME_DIR.get_file("ffi.go").is_some());
        assert!(RUNTIME_DIR.get_file("slice.go").is_some());
        assert!(RUNTIME_DIR.get_file("endian.go").is_some());
    }

    #[test]
    fn vendor_into_writes_every_embedded_file() {
        let tmp = tempfile_dir();
        vendor_into(&tmp).unwrap();
        assert!(tmp.join("go.mod").exists());
        assert!(tmp.join("slice.go").exists());
        std::fs::remove_dir_all(&tmp).unwrap();
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("moxie-runtime-test-{}", std::process::id()));
        p
    }
}
