//! Per-architecture pipeline orchestration.
//!
//! Each architecture runs Assembler → Stager → Launcher → Package Builder →
//! Finalizer in its own `<work>/<arch>/` directory. Multi-architecture builds
//! run one scoped thread per architecture; a failure in one never cancels
//! another, but any failure suppresses the manifest.

use crate::arch::Architecture;
use crate::assembler::{Assembler, ExistingEnvironment};
use crate::cleanup::{remove_partial_dir, remove_partial_file};
use crate::command::CommandRunner;
use crate::config::{ExistingArtifactPolicy, PackagingConfig};
use crate::error::{PipelineError, Result};
use crate::finalizer::{PackageArtifact, digest_path_for, finalize, load_existing};
use crate::launcher::{LauncherSpec, write_launcher};
use crate::manifest::collect_manifest;
use crate::output::{BuildSummary, write_stderr_line};
use crate::package::{PackageBuilder, PackagingTools};
use crate::prune::DenyList;
use crate::request::BuildRequest;
use crate::stager::{StagingReport, Stager, human_size};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Name of the environment directory inside an architecture work directory.
pub const ENVIRONMENT_DIR: &str = "bundle-venv";

/// Name of the staging directory inside an architecture work directory.
pub const STAGING_DIR: &str = "staging";

/// Shared, read-only inputs for every architecture run.
pub struct PipelineContext<'a> {
    /// Packaging configuration.
    pub config: &'a PackagingConfig,
    /// Runner for the interpreter and `pip`.
    pub runner: &'a dyn CommandRunner,
    /// Packaging tools.
    pub tools: &'a dyn PackagingTools,
    /// Deny list applied while staging.
    pub deny: &'a DenyList,
    /// Root of the per-architecture work directories.
    pub work_dir: &'a Utf8Path,
    /// Behaviour when an installer already exists.
    pub on_existing: ExistingArtifactPolicy,
    /// Replace leftover environments in the work directory.
    pub force: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

impl PipelineContext<'_> {
    /// Return `<work>/<arch>`.
    #[must_use]
    pub fn arch_dir(&self, arch: Architecture) -> Utf8PathBuf {
        self.work_dir.join(arch.as_str())
    }

    fn progress(&self, stderr: &mut dyn Write, arch: Architecture, message: impl std::fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, format!("[{arch}] {message}"));
        }
    }
}

/// What one architecture run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureRun {
    /// The finished artifact.
    pub artifact: PackageArtifact,
    /// Staging sizes; `None` when an existing artifact was reused.
    pub staging: Option<StagingReport>,
}

impl ArchitectureRun {
    /// Returns `true` when the artifact was reused rather than rebuilt.
    #[must_use]
    pub fn reused(&self) -> bool {
        self.staging.is_none()
    }
}

/// Run the whole pipeline for one architecture.
///
/// # Errors
///
/// Returns the first error raised by any stage. Each stage removes the
/// partial output it owns before its error propagates.
pub fn run_architecture(
    context: &PipelineContext<'_>,
    request: &BuildRequest,
    stderr: &mut dyn Write,
) -> Result<ArchitectureRun> {
    let arch = request.architecture;
    if let Some(artifact) = apply_existing_policy(context, request)? {
        context.progress(stderr, arch, format!("reusing verified {}", artifact.path));
        return Ok(ArchitectureRun {
            artifact,
            staging: None,
        });
    }

    let arch_dir = context.arch_dir(arch);
    let existing = if context.force {
        ExistingEnvironment::Replace
    } else {
        ExistingEnvironment::Refuse
    };

    context.progress(stderr, arch, "Phase 1/4: assembling runtime environment");
    let environment = Assembler::new(context.runner, context.config).assemble(
        request,
        &arch_dir.join(ENVIRONMENT_DIR),
        existing,
    )?;

    context.progress(stderr, arch, "Phase 2/4: staging package root");
    let staging_dir = arch_dir.join(STAGING_DIR);
    let stager = Stager::new(context.config, context.deny.clone());
    let (staging, report) = stager.stage(&environment, &staging_dir)?;
    if let Err(err) = write_launcher(&LauncherSpec::from_config(context.config), &staging.launcher_path) {
        remove_partial_dir(&staging.root);
        return Err(err);
    }
    context.progress(
        stderr,
        arch,
        format!(
            "  source {}, staged {}",
            human_size(report.source_bytes),
            human_size(report.staged_bytes)
        ),
    );

    context.progress(stderr, arch, "Phase 3/4: building installer");
    let built = PackageBuilder::new(context.tools, context.config).build(request, &staging, &staging_dir)?;
    debug!(
        "component {} ({}), installer {}",
        built.component_path,
        human_size(built.component_size),
        human_size(built.size)
    );

    context.progress(stderr, arch, "Phase 4/4: writing checksum");
    let artifact = match finalize(request) {
        Ok(artifact) => artifact,
        Err(err) => {
            remove_partial_file(&request.artifact_path());
            return Err(err);
        }
    };

    Ok(ArchitectureRun {
        artifact,
        staging: Some(report),
    })
}

/// Enforce the existing-artifact policy.
///
/// Returns the artifact to reuse, or `None` when the pipeline should build.
fn apply_existing_policy(
    context: &PipelineContext<'_>,
    request: &BuildRequest,
) -> Result<Option<PackageArtifact>> {
    let path = request.artifact_path();
    let digest = digest_path_for(&path);
    if !path.exists() && !digest.exists() {
        return Ok(None);
    }
    match context.on_existing {
        ExistingArtifactPolicy::Fail => Err(PipelineError::ExistingArtifact { path }),
        ExistingArtifactPolicy::Overwrite => {
            for stale in [&path, &digest] {
                remove_if_present(stale)?;
            }
            Ok(None)
        }
        ExistingArtifactPolicy::Skip => match load_existing(request) {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!("existing artifact cannot be reused, rebuilding: {err}");
                Ok(None)
            }
        },
    }
}

fn remove_if_present(path: &Utf8Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::artifact_write(path, &e)),
    }
}

/// Result of one architecture inside a multi-architecture build.
#[derive(Debug)]
pub struct ArchitectureOutcome {
    /// Target architecture.
    pub architecture: Architecture,
    /// The run's result.
    pub result: Result<ArchitectureRun>,
}

/// Results of a whole build.
#[derive(Debug)]
pub struct BuildReport {
    /// One outcome per requested architecture, in request order.
    pub outcomes: Vec<ArchitectureOutcome>,
    /// Manifest path, when one was written.
    pub manifest: Option<Utf8PathBuf>,
}

impl BuildReport {
    /// Return the number of failed architectures.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Convert the report into an overall result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArchitecturesFailed`] if any run failed.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failures();
        if failed == 0 {
            Ok(self)
        } else {
            Err(PipelineError::ArchitecturesFailed {
                failed,
                total: self.outcomes.len(),
            })
        }
    }
}

/// Run every request concurrently, then write the manifest if asked and if
/// every architecture succeeded.
///
/// Per-architecture errors are reported on `stderr` and collected in the
/// returned report; they never cancel other architectures.
///
/// # Errors
///
/// Returns an error only if writing the manifest fails.
pub fn run_build(
    context: &PipelineContext<'_>,
    requests: &[BuildRequest],
    write_manifest: bool,
    stderr: &mut (dyn Write + Send),
) -> Result<BuildReport> {
    let shared = Mutex::new(stderr);
    let outcomes = std::thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .map(|request| {
                let shared = &shared;
                scope.spawn(move || {
                    let mut lines = LineWriter::new(shared);
                    let result = run_architecture(context, request, &mut lines);
                    lines.flush_partial();
                    ArchitectureOutcome {
                        architecture: request.architecture,
                        result,
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .zip(requests)
            .map(|(handle, request)| {
                handle.join().unwrap_or_else(|_| ArchitectureOutcome {
                    architecture: request.architecture,
                    result: Err(PipelineError::Io(io::Error::other(
                        "architecture worker panicked",
                    ))),
                })
            })
            .collect::<Vec<_>>()
    });

    let stderr = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
    report_outcomes(context, &outcomes, stderr);

    let mut report = BuildReport {
        outcomes,
        manifest: None,
    };
    if write_manifest && report.failures() == 0 {
        if let Some(first) = requests.first() {
            let architectures: Vec<Architecture> = requests.iter().map(|r| r.architecture).collect();
            let manifest = collect_manifest(context.config, &first.version, &architectures, &first.output_dir)?;
            let path = manifest.write_to(&first.output_dir)?;
            if !context.quiet {
                write_stderr_line(stderr, format!("Manifest: {path}"));
            }
            report.manifest = Some(path);
        }
    } else if write_manifest {
        warn!("manifest not written: {} architecture run(s) failed", report.failures());
    }
    Ok(report)
}

fn report_outcomes(
    context: &PipelineContext<'_>,
    outcomes: &[ArchitectureOutcome],
    stderr: &mut (dyn Write + Send),
) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(run) if !context.quiet => {
                write_stderr_line(stderr, "");
                write_stderr_line(
                    stderr,
                    BuildSummary {
                        config: context.config,
                        artifact: &run.artifact,
                        staging: run.staging.as_ref(),
                    }
                    .display_text(),
                );
            }
            Ok(_) => {}
            Err(err) => {
                write_stderr_line(stderr, format!("error: [{}] {err}", outcome.architecture));
            }
        }
    }
}

/// Forwards whole lines to a shared writer so concurrent runs never
/// interleave mid-line.
struct LineWriter<'a, 'b> {
    shared: &'a Mutex<&'b mut (dyn Write + Send)>,
    pending: Vec<u8>,
}

impl<'a, 'b> LineWriter<'a, 'b> {
    fn new(shared: &'a Mutex<&'b mut (dyn Write + Send)>) -> Self {
        Self {
            shared,
            pending: Vec::new(),
        }
    }

    fn forward(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        guard.write_all(bytes)
    }

    fn flush_partial(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let _ = self.forward(&rest);
        }
    }
}

impl Write for LineWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let rest = self.pending.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            self.forward(&complete)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
