//! Error types for the packaging pipeline.
//!
//! Every variant is fatal to the architecture run that raised it. Variants
//! wrapping an external tool carry the tool's diagnostic text verbatim so
//! operators can read the native failure without re-running anything.

use crate::arch::Architecture;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while assembling, staging, packaging, or finalizing.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The architecture selector is not one of the supported targets.
    #[error("invalid architecture \"{value}\"; expected one of: {expected}")]
    InvalidArchitecture {
        /// The rejected selector.
        value: String,
        /// Comma-separated list of accepted selectors.
        expected: String,
    },

    /// The version string cannot be used for artifact naming.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected version string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The dependency source could not report a published version.
    #[error("failed to resolve version of {package}: {reason}")]
    VersionResolution {
        /// Package whose version was requested.
        package: String,
        /// Description of the failure.
        reason: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    Config {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// The isolated runtime environment could not be created.
    #[error("failed to create environment at {path}: {reason}")]
    EnvironmentCreate {
        /// Requested environment root.
        path: Utf8PathBuf,
        /// Diagnostic from the environment tool or filesystem.
        reason: String,
    },

    /// Installing the application or its dependencies failed.
    #[error("dependency installation failed ({step}): {diagnostic}")]
    DependencyInstall {
        /// The installation step that failed.
        step: String,
        /// Raw diagnostic text from the installer.
        diagnostic: String,
    },

    /// Copying the environment into the staging root failed.
    #[error("staging failed: {reason}")]
    StagingCopy {
        /// Description of the copy failure.
        reason: String,
    },

    /// Writing the launcher script failed.
    #[error("failed to write launcher {path}: {reason}")]
    LauncherWrite {
        /// Path of the launcher script.
        path: Utf8PathBuf,
        /// Description of the I/O failure.
        reason: String,
    },

    /// A native packaging tool failed or is unavailable.
    #[error("{tool} failed: {diagnostic}")]
    PackagingTool {
        /// Name of the packaging tool.
        tool: &'static str,
        /// Raw diagnostic text from the tool.
        diagnostic: String,
    },

    /// An artifact, digest, or manifest file could not be written or read.
    #[error("failed to write artifact {path}: {reason}")]
    ArtifactWrite {
        /// Path of the artifact being written.
        path: Utf8PathBuf,
        /// Description of the I/O failure.
        reason: String,
    },

    /// An artifact for this version and architecture already exists.
    #[error("artifact {path} already exists; pass --on-existing overwrite or skip")]
    ExistingArtifact {
        /// Path of the existing artifact.
        path: Utf8PathBuf,
    },

    /// A declared architecture has no artifact or digest file.
    #[error("missing {kind} for {arch}: {path}")]
    MissingArtifact {
        /// Architecture whose output is missing.
        arch: Architecture,
        /// Which file is missing (`installer` or `digest`).
        kind: &'static str,
        /// Expected path of the missing file.
        path: Utf8PathBuf,
    },

    /// A recorded digest does not match the artifact bytes.
    #[error("digest mismatch for {path}: recorded {recorded}, actual {actual}")]
    DigestMismatch {
        /// Path of the artifact.
        path: Utf8PathBuf,
        /// Digest read from the digest file.
        recorded: String,
        /// Digest recomputed from the artifact.
        actual: String,
    },

    /// One or more architecture runs failed during a multi-architecture build.
    #[error("{failed} of {total} architecture build(s) failed")]
    ArchitecturesFailed {
        /// Number of failed runs.
        failed: usize,
        /// Number of requested runs.
        total: usize,
    },

    /// An I/O operation failed outside a component-owned output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Build an [`PipelineError::ArtifactWrite`] from an I/O error.
    pub(crate) fn artifact_write(path: impl Into<Utf8PathBuf>, err: &std::io::Error) -> Self {
        Self::ArtifactWrite {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Build a [`PipelineError::StagingCopy`] from a context string and cause.
    pub(crate) fn staging(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::StagingCopy {
            reason: format!("{context}: {err}"),
        }
    }
}

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
