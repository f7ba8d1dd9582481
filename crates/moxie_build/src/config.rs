//! `moxie.toml` project manifest, grounded on the teacher's `Largo.toml`
//! parser (`apps/logicaffeine_cli/src/project/manifest.rs`): a `serde` +
//! `toml` struct with a `[package]` table and `#[serde(default)]` fields so
//! an almost-empty manifest still loads.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root of a `moxie.toml` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: Package,
    #[serde(default)]
    pub build: BuildSettings,
}

/// `[package]` table: identity and the Go module this project emits into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Package name; also the default binary name.
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Go module path the emitted project's `go.mod` declares
    /// (e.g. `"example.com/hello"`). Distinct from `moxie_runtime`'s
    /// fixed `moxie.dev/runtime` import path.
    #[serde(default = "default_module")]
    pub go_module: String,
    /// Root directory (relative to the manifest) containing `.x`/`.go`
    /// source units. Defaults to `src`.
    #[serde(default = "default_source_root")]
    pub source_root: String,
}

/// `[build]` table: orchestrator knobs (spec.md §5, §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Cap on the rayon thread pool used for the per-unit stage A-E fan-out.
    /// `0` means "let rayon pick" (its own `num_cpus` default).
    #[serde(default)]
    pub parallelism: usize,
    /// Path (relative to the staging directory) the runtime library is
    /// vendored under. Defaults to `runtime`, matching the teacher's
    /// `crates/<name>` vendoring convention generalized to a single subtree.
    #[serde(default = "default_runtime_vendor_path")]
    pub runtime_vendor_path: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            parallelism: 0,
            runtime_vendor_path: default_runtime_vendor_path(),
        }
    }
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_module() -> String {
    "example.com/moxie-project".to_string()
}

fn default_source_root() -> String {
    "src".to_string()
}

fn default_runtime_vendor_path() -> String {
    "runtime".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Manifest {
    /// Loads `moxie.toml` from `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = project_dir.join("moxie.toml");
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ManifestError::Parse { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_manifest_fills_in_defaults() {
        let m: Manifest = toml::from_str(
            r#"
            [package]
            name = "hello"
            "#,
        )
        .unwrap();
        assert_eq!(m.package.name, "hello");
        assert_eq!(m.package.version, "0.1.0");
        assert_eq!(m.package.source_root, "src");
        assert_eq!(m.build.runtime_vendor_path, "runtime");
    }

    #[test]
    fn full_manifest_round_trips_explicit_fields() {
        let m: Manifest = toml::from_str(
            r#"
            [package]
            name = "hello"
            version = "2.0.0"
            go_module = "example.com/hello"
            source_root = "moxie"

            [build]
            parallelism = 4
            runtime_vendor_path = "vendor/moxie_runtime"
            "#,
        )
        .unwrap();
        assert_eq!(m.package.go_module, "example.com/hello");
        assert_eq!(m.build.parallelism, 4);
        assert_eq!(m.build.runtime_vendor_path, "vendor/moxie_runtime");
    }
}
