//! User-facing progress and summary text.
//!
//! Everything here renders to strings or writes best-effort lines to stderr;
//! structured diagnostics go through `log` instead.

use crate::config::{ExistingArtifactPolicy, PackagingConfig};
use crate::finalizer::PackageArtifact;
use crate::prune::DenyList;
use crate::request::BuildRequest;
use crate::stager::{StagingReport, human_size};
use camino::Utf8Path;
use std::io::Write;

/// Write a line to stderr, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress output.
    }
}

/// Summary printed after one architecture's installer is finished.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use pkgsmith::arch::Architecture;
/// use pkgsmith::config::PackagingConfig;
/// use pkgsmith::digest::sha256_bytes;
/// use pkgsmith::finalizer::PackageArtifact;
/// use pkgsmith::output::BuildSummary;
/// use pkgsmith::version::Version;
///
/// let artifact = PackageArtifact {
///     architecture: Architecture::Arm64,
///     version: Version::try_from("2.76.0").expect("valid"),
///     path: Utf8PathBuf::from("/dist/azure-cli-2.76.0-macos-arm64.pkg"),
///     size: 3 * 1024 * 1024,
///     sha256: sha256_bytes(b"pkg"),
/// };
/// let config = PackagingConfig::default();
/// let text = BuildSummary { config: &config, artifact: &artifact, staging: None }.display_text();
/// assert!(text.contains("Executable:  /usr/local/bin/az"));
/// assert!(text.contains("3.0 MiB"));
/// ```
#[derive(Debug)]
pub struct BuildSummary<'a> {
    /// Packaging configuration used for the build.
    pub config: &'a PackagingConfig,
    /// The finished artifact.
    pub artifact: &'a PackageArtifact,
    /// Staging sizes, when the artifact was built in this run.
    pub staging: Option<&'a StagingReport>,
}

impl BuildSummary<'_> {
    /// Format the summary for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let config = self.config;
        let artifact = self.artifact;
        let mut lines = vec![
            format!(
                "Built {} {} for {}",
                config.application.display_name,
                artifact.version,
                artifact.architecture.platform_tag()
            ),
            format!("  Package:     {}", artifact.path),
            format!("  Size:        {}", human_size(artifact.size)),
            format!("  SHA256:      {}", artifact.sha256),
            format!("  Identifier:  {}", config.layout.identifier),
        ];
        if let Some(staging) = self.staging {
            lines.push(format!(
                "  Runtime:     {} staged from {} ({} file(s), {} pruned)",
                human_size(staging.staged_bytes),
                human_size(staging.source_bytes),
                staging.files,
                staging.pruned
            ));
        }
        lines.extend([
            String::new(),
            "Installs to:".to_owned(),
            format!("  Executable:  {}", config.installed_launcher_path()),
            format!("  Runtime:     {}/", config.installed_runtime_dir()),
            String::new(),
            "Next steps:".to_owned(),
            format!(
                "  1. Test locally: sudo installer -pkg {} -target /",
                artifact.file_name()
            ),
            format!("  2. Verify: {} --version", config.application.executable),
            "  3. Publish the installer, its .sha256, and the manifest".to_owned(),
        ]);
        lines.join("\n")
    }
}

/// Resolved plan printed by `--dry-run`.
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Packaging configuration.
    pub config: &'a PackagingConfig,
    /// One request per architecture.
    pub requests: &'a [BuildRequest],
    /// Working directory root, if fixed.
    pub work_dir: Option<&'a Utf8Path>,
    /// Existing-artifact policy.
    pub on_existing: ExistingArtifactPolicy,
    /// Whether a manifest will be written.
    pub manifest: bool,
    /// Deny list the stager will use.
    pub deny: &'a DenyList,
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let config = self.config;
        let mut lines = vec![
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Application: {}", config.application.name),
            format!("Identifier: {}", config.layout.identifier),
            format!(
                "Work directory: {}",
                self.work_dir
                    .map_or_else(|| "(temporary)".to_owned(), ToString::to_string)
            ),
            format!("On existing artifact: {}", self.on_existing),
            format!("Write manifest: {}", self.manifest),
            format!(
                "Deny list v{}: {} pattern(s)",
                self.deny.version(),
                self.deny.rules().len()
            ),
            format!("Launcher: {}", config.installed_launcher_path()),
            format!("Runtime: {}", config.installed_runtime_dir()),
            String::new(),
            "Installers to build:".to_owned(),
        ];
        for request in self.requests {
            lines.push(format!("  - {}", request.artifact_path()));
        }
        lines.join("\n")
    }
}
