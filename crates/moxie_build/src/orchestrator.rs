//! Stage F: the build orchestrator (spec.md §4.F). Grounded on the
//! teacher's `compile_project`/`build_with_entry` pipeline shape
//! (`apps/logicaffeine_cli/src/project/build.rs`): load config, run the
//! core compile, stage a generated project, copy runtime dependencies,
//! invoke the host toolchain, relay diagnostics, copy the artifact back.
//! Concurrency is `rayon`, grounded on `logicaffeine_system`'s
//! `concurrency` feature.

use crate::config::Manifest;
use crate::diagnostic_relay;
use crate::interfaces::{FsOutputSink, FsSourceReader, OutputSink, SourceReader};
use crate::pipeline::{self, UnitResult};
use moxie_base::{Diagnostic, MoxieError, Severity};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// The user-facing subcommand the orchestrator was invoked for. `run`/`test`
/// additionally execute the produced artifact (§4.G, `moxie_cli`'s concern);
/// the orchestrator itself only ever stages, vendors, and builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Build,
    Run,
    Test,
    Install,
}

impl Command {
    fn go_argv(self, release: bool) -> Vec<String> {
        let sub = match self {
            Command::Build | Command::Run => "build",
            Command::Test => "test",
            Command::Install => "install",
        };
        let mut argv = vec!["go".to_string(), sub.to_string()];
        if release && sub == "build" {
            argv.push("-ldflags=-s -w".to_string());
        }
        argv
    }
}

/// Everything a single orchestrator run needs.
pub struct Orchestrator {
    pub project_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub manifest: Manifest,
}

/// Outcome of a full stage A-F run.
pub struct BuildOutcome {
    /// All diagnostics across every unit plus any toolchain relay, sorted.
    pub diagnostics: Vec<Diagnostic>,
    /// The host toolchain's exit code, or `None` if the build never reached
    /// stage F (a stage A-E diagnostic was an error).
    pub exit_code: Option<i32>,
    pub staging_dir: PathBuf,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
            && !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

impl Orchestrator {
    pub fn new(project_dir: impl Into<PathBuf>, manifest: Manifest) -> Self {
        let project_dir = project_dir.into();
        let staging_dir = project_dir.join("target").join("moxie-build");
        Self {
            project_dir,
            staging_dir,
            manifest,
        }
    }

    /// Runs the full pipeline: reads every source unit, fans stages A-E out
    /// across a bounded `rayon` pool, joins before stage F (§5's
    /// happens-before barrier), and — only if no unit produced an error —
    /// stages output, vendors the runtime, and invokes the host toolchain.
    ///
    /// The toolchain's stderr is captured (not relayed live) so its
    /// diagnostics can be mapped back to Moxie source positions before
    /// being shown to the user (§7 "Position reversal"); `moxie_cli`'s
    /// `run` subcommand separately executes the produced binary with live
    /// stdio via [`ProcessInvoker`] once this returns a clean build.
    pub fn run(&self, command: Command, release: bool) -> Result<BuildOutcome, MoxieError> {
        let source_root = self.project_dir.join(&self.manifest.package.source_root);
        let reader = FsSourceReader;
        let units = reader.read_all(&source_root)?;

        let pool = self.build_pool()?;
        let results: Vec<UnitResult> = pool.install(|| units.par_iter().map(pipeline::run_unit).collect());

        let mut diagnostics: Vec<Diagnostic> =
            results.iter().flat_map(|r| r.diagnostics.clone()).collect();
        diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            return Ok(BuildOutcome {
                diagnostics,
                exit_code: None,
                staging_dir: self.staging_dir.clone(),
            });
        }

        self.clear_staging_dir()?;
        let sink = FsOutputSink::new(&self.staging_dir);
        for result in &results {
            if let Some(emitted) = &result.emitted {
                let out_path = crate::interfaces::output_path_for(&result.rel_path);
                sink.write(&out_path, emitted.source.as_bytes())?;
            }
        }
        self.write_go_mod()?;
        moxie_runtime::vendor_into(&self.staging_dir.join(&self.manifest.build.runtime_vendor_path))
            .map_err(|e| MoxieError::Io {
                path: self.staging_dir.clone(),
                source: e,
            })?;

        let argv = command.go_argv(release);
        let Some((program, args)) = argv.split_first() else {
            return Err(MoxieError::Toolchain("empty command vector".into()));
        };
        let output = std::process::Command::new(program)
            .args(args)
            .current_dir(&self.staging_dir)
            .output()
            .map_err(|e| MoxieError::Toolchain(format!("{program}: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            diagnostics.extend(diagnostic_relay::relay(&stderr, &results));
            diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        } else if command == Command::Build {
            self.copy_binary_back()?;
        }

        Ok(BuildOutcome {
            diagnostics,
            exit_code: Some(exit_code),
            staging_dir: self.staging_dir.clone(),
        })
    }

    fn build_pool(&self) -> Result<rayon::ThreadPool, MoxieError> {
        let cap = self.manifest.build.parallelism;
        let mut builder = rayon::ThreadPoolBuilder::new();
        if cap > 0 {
            builder = builder.num_threads(cap);
        }
        builder
            .build()
            .map_err(|e| MoxieError::Toolchain(format!("failed to start worker pool: {e}")))
    }

    /// Clears the staging directory before writes begin (§5: "The
    /// orchestrator clears the staging directory before writes begin").
    fn clear_staging_dir(&self) -> Result<(), MoxieError> {
        if self.staging_dir.exists() {
            std::fs::remove_dir_all(&self.staging_dir).map_err(|source| MoxieError::Io {
                path: self.staging_dir.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&self.staging_dir).map_err(|source| MoxieError::Io {
            path: self.staging_dir.clone(),
            source,
        })
    }

    fn write_go_mod(&self) -> Result<(), MoxieError> {
        let content = format!(
            "module {}\n\ngo 1.21\n\nrequire {} v0.0.0\n\nreplace {} => ./{}\n",
            self.manifest.package.go_module,
            moxie_runtime::IMPORT_PATH,
            moxie_runtime::IMPORT_PATH,
            self.manifest.build.runtime_vendor_path,
        );
        let path = self.staging_dir.join("go.mod");
        std::fs::write(&path, content).map_err(|source| MoxieError::Io { path, source })
    }

    fn copy_binary_back(&self) -> Result<(), MoxieError> {
        let name = &self.manifest.package.name;
        let built = self.staging_dir.join(name);
        if !built.exists() {
            return Ok(());
        }
        let dest = self.project_dir.join(name);
        std::fs::copy(&built, &dest).map_err(|source| MoxieError::Io {
            path: dest,
            source,
        })?;
        Ok(())
    }

    pub fn binary_path(&self) -> PathBuf {
        self.project_dir.join(&self.manifest.package.name)
    }
}

/// Prints diagnostics in source order, per spec.md §6's wire format, one per
/// line. Used by `moxie_cli`; kept here so the format is defined next to
/// the type that produces it.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{d}");
    }
}

pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };
    loop {
        if current.join("moxie.toml").exists() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}
