//! Staging of the runtime environment into the installed layout.
//!
//! The staging root mirrors the filesystem under the install root: the runtime
//! lands at `<pkg_root>/<vendor>/<app>/` and the launcher at
//! `<pkg_root>/bin/<executable>`, so every staged path maps one-to-one onto
//! its installed path once `pkgbuild` sets the install location.

use crate::assembler::RuntimeEnvironment;
use crate::cleanup::remove_partial_dir;
use crate::config::PackagingConfig;
use crate::error::{PipelineError, Result};
use crate::prune::DenyList;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fs;
use walkdir::WalkDir;

/// Name of the payload directory inside a staging directory.
const PKG_ROOT_DIR: &str = "pkg_root";

/// A staged payload tree ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRoot {
    /// Root handed to `pkgbuild --root`.
    pub root: Utf8PathBuf,
    /// Directory holding the copied runtime.
    pub runtime_dir: Utf8PathBuf,
    /// Path the launcher script is written to.
    pub launcher_path: Utf8PathBuf,
}

/// Byte and entry counts gathered while staging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Total size of regular files in the source environment.
    pub source_bytes: u64,
    /// Total size of regular files copied into the staging root.
    pub staged_bytes: u64,
    /// Number of files copied.
    pub files: u64,
    /// Number of entries skipped by the deny list (subtrees count once).
    pub pruned: u64,
}

/// Copies runtime environments into a fresh staging root.
#[derive(Debug, Clone)]
pub struct Stager<'a> {
    config: &'a PackagingConfig,
    deny: DenyList,
}

impl<'a> Stager<'a> {
    /// Create a stager for the given layout and deny list.
    #[must_use]
    pub fn new(config: &'a PackagingConfig, deny: DenyList) -> Self {
        Self { config, deny }
    }

    /// Compute the staging layout under `staging_dir` without touching disk.
    #[must_use]
    pub fn layout(&self, staging_dir: &Utf8Path) -> StagingRoot {
        let root = staging_dir.join(PKG_ROOT_DIR);
        StagingRoot {
            runtime_dir: root
                .join(&self.config.layout.vendor)
                .join(&self.config.application.name),
            launcher_path: root.join("bin").join(&self.config.application.executable),
            root,
        }
    }

    /// Stage `environment` under `staging_dir`.
    ///
    /// Any previous payload tree is removed first. Directories are visited in
    /// name order and symlinks are followed, so staging an unchanged
    /// environment twice yields identical trees.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StagingCopy`] on any walk or copy failure. The
    /// partial payload tree is deleted before the error is returned.
    pub fn stage(
        &self,
        environment: &RuntimeEnvironment,
        staging_dir: &Utf8Path,
    ) -> Result<(StagingRoot, StagingReport)> {
        let staging = self.layout(staging_dir);
        if staging.root.exists() {
            debug!("removing previous staging root {}", staging.root);
            fs::remove_dir_all(&staging.root)
                .map_err(|e| PipelineError::staging(format!("cannot clear {}", staging.root), e))?;
        }

        let copied = self
            .copy_tree(&environment.root, &staging)
            .and_then(|mut report| {
                report.source_bytes = tree_size(&environment.root)?;
                Ok(report)
            });
        match copied {
            Ok(report) => {
                info!(
                    "staged {} file(s) into {} ({} pruned)",
                    report.files, staging.runtime_dir, report.pruned
                );
                Ok((staging, report))
            }
            Err(err) => {
                remove_partial_dir(&staging.root);
                Err(err)
            }
        }
    }

    fn copy_tree(&self, source: &Utf8Path, staging: &StagingRoot) -> Result<StagingReport> {
        let mut report = StagingReport::default();
        let mut pruned = 0u64;
        let walker = WalkDir::new(source)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                let denied = self.deny.is_denied(&name, entry.file_type().is_dir());
                if denied {
                    pruned += 1;
                }
                !denied
            });

        for entry in walker {
            let entry = entry.map_err(|e| PipelineError::staging("cannot walk environment", e))?;
            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                PipelineError::staging("non UTF-8 path", entry.path().display())
            })?;
            let relative = path
                .strip_prefix(source)
                .map_err(|e| PipelineError::staging(path, e))?;
            let dest = staging.runtime_dir.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)
                    .map_err(|e| PipelineError::staging(format!("cannot create {dest}"), e))?;
            } else {
                let copied = fs::copy(path, &dest).map_err(|e| {
                    PipelineError::staging(format!("cannot copy {path} to {dest}"), e)
                })?;
                report.staged_bytes += copied;
                report.files += 1;
            }
        }
        report.pruned = pruned;
        Ok(report)
    }
}

/// Sum the sizes of regular files under `root`, following symlinks.
///
/// # Errors
///
/// Returns [`PipelineError::StagingCopy`] if the tree cannot be walked.
pub fn tree_size(root: &Utf8Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| PipelineError::staging(format!("cannot size {root}"), e))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .map_err(|e| PipelineError::staging(format!("cannot size {root}"), e))?;
            total += meta.len();
        }
    }
    Ok(total)
}

/// Format a byte count for progress output.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS.get(unit).copied().unwrap_or("GiB"))
    }
}

#[cfg(test)]
#[path = "stager_tests.rs"]
mod tests;
