//! Release manifest for downstream distribution channels.
//!
//! Formula generators (a Homebrew cask, for instance) need the version and,
//! per architecture, the file name, checksum, and download URL. The manifest
//! is folded from finished artifacts only: if any declared architecture lacks
//! its installer or digest, no manifest is written.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "application": "azure-cli",
//!   "identifier": "com.microsoft.azure-cli",
//!   "version": "2.76.0",
//!   "generated_at": "2026-10-17T00:00:00Z",
//!   "artifacts": [
//!     {
//!       "architecture": "arm64",
//!       "platform_tag": "macos-arm64",
//!       "file_name": "azure-cli-2.76.0-macos-arm64.pkg",
//!       "size": 52428800,
//!       "sha256": "…",
//!       "url": "https://example.invalid/2.76.0/azure-cli-2.76.0-macos-arm64.pkg"
//!     }
//!   ]
//! }
//! ```

use crate::arch::Architecture;
use crate::cleanup::remove_partial_file;
use crate::config::PackagingConfig;
use crate::digest::Sha256Digest;
use crate::error::{PipelineError, Result};
use crate::finalizer::{PackageArtifact, digest_path_for, verify_digest_file};
use crate::naming::ArtifactName;
use crate::version::Version;
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;

/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// An RFC 3339 UTC timestamp recording when the manifest was generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedAt(String);

impl GeneratedAt {
    /// Wrap an existing timestamp string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the current UTC time, to the second.
    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }

    /// Return the timestamp as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One architecture's entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArtifact {
    /// Target architecture.
    pub architecture: Architecture,
    /// Platform tag used in the file name.
    pub platform_tag: String,
    /// Installer file name.
    pub file_name: String,
    /// Installer size in bytes.
    pub size: u64,
    /// SHA-256 of the installer.
    pub sha256: Sha256Digest,
    /// Download URL, when a template is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ManifestArtifact {
    /// Describe a finished artifact, rendering its URL from `url_template`.
    #[must_use]
    pub fn from_artifact(artifact: &PackageArtifact, url_template: Option<&str>) -> Self {
        let file_name = artifact.file_name().to_owned();
        Self {
            architecture: artifact.architecture,
            platform_tag: artifact.architecture.platform_tag().to_owned(),
            url: url_template.map(|t| {
                render_download_url(t, &artifact.version, artifact.architecture, &file_name)
            }),
            size: artifact.size,
            sha256: artifact.sha256.clone(),
            file_name,
        }
    }
}

/// The release manifest for one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Manifest schema version.
    pub schema_version: u32,
    /// Application name.
    pub application: String,
    /// Package identifier.
    pub identifier: String,
    /// Application version.
    pub version: Version,
    /// Generation timestamp.
    pub generated_at: GeneratedAt,
    /// One entry per architecture, in architecture order.
    pub artifacts: Vec<ManifestArtifact>,
}

impl BuildManifest {
    /// Fold finished artifacts into a manifest.
    #[must_use]
    pub fn from_artifacts(
        config: &PackagingConfig,
        version: &Version,
        artifacts: &[PackageArtifact],
        generated_at: GeneratedAt,
    ) -> Self {
        let template = config.release.download_url_template.as_deref();
        let mut entries: Vec<ManifestArtifact> = artifacts
            .iter()
            .map(|a| ManifestArtifact::from_artifact(a, template))
            .collect();
        entries.sort_by_key(|e| e.architecture);
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            application: config.application.name.clone(),
            identifier: config.layout.identifier.clone(),
            version: version.clone(),
            generated_at,
            artifacts: entries,
        }
    }

    /// Return the manifest file name for this version.
    #[must_use]
    pub fn file_name(&self) -> String {
        ArtifactName::manifest_filename(&self.application, &self.version)
    }

    /// Write the manifest as pretty JSON into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArtifactWrite`] if serialization or the write
    /// fails. A partially written file is removed.
    pub fn write_to(&self, output_dir: &Utf8Path) -> Result<Utf8PathBuf> {
        let path = output_dir.join(self.file_name());
        let mut json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::ArtifactWrite {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        json.push('\n');
        if let Err(e) = fs::write(&path, json) {
            remove_partial_file(&path);
            return Err(PipelineError::artifact_write(&path, &e));
        }
        info!("wrote manifest {path}");
        Ok(path)
    }
}

/// Expand `{version}`, `{file}`, `{arch}`, and `{platform_tag}` in a URL
/// template.
///
/// # Examples
///
/// ```
/// use pkgsmith::arch::Architecture;
/// use pkgsmith::manifest::render_download_url;
/// use pkgsmith::version::Version;
///
/// let url = render_download_url(
///     "https://github.com/Azure/azure-cli/releases/download/azure-cli-{version}/{file}",
///     &Version::try_from("2.76.0").expect("valid"),
///     Architecture::Arm64,
///     "azure-cli-2.76.0-macos-arm64.pkg",
/// );
/// assert_eq!(
///     url,
///     "https://github.com/Azure/azure-cli/releases/download/azure-cli-2.76.0/azure-cli-2.76.0-macos-arm64.pkg"
/// );
/// ```
#[must_use]
pub fn render_download_url(
    template: &str,
    version: &Version,
    arch: Architecture,
    file_name: &str,
) -> String {
    template
        .replace("{version}", version.as_str())
        .replace("{file}", file_name)
        .replace("{platform_tag}", arch.platform_tag())
        .replace("{arch}", arch.as_str())
}

/// Scan `output_dir` for every declared architecture and fold the results.
///
/// # Errors
///
/// Returns [`PipelineError::MissingArtifact`] if any architecture lacks its
/// installer or digest file, and the errors of
/// [`verify_digest_file`](crate::finalizer::verify_digest_file) if a digest
/// does not match.
pub fn collect_manifest(
    config: &PackagingConfig,
    version: &Version,
    architectures: &[Architecture],
    output_dir: &Utf8Path,
) -> Result<BuildManifest> {
    let mut artifacts = Vec::with_capacity(architectures.len());
    for &arch in architectures {
        let name = ArtifactName::new(&config.application.name, version.clone(), arch);
        let path = output_dir.join(name.filename());
        if !path.is_file() {
            return Err(PipelineError::MissingArtifact {
                arch,
                kind: "installer",
                path,
            });
        }
        let digest_path = digest_path_for(&path);
        if !digest_path.is_file() {
            return Err(PipelineError::MissingArtifact {
                arch,
                kind: "digest",
                path: digest_path,
            });
        }
        let sha256 = verify_digest_file(&path)?;
        let size = fs::metadata(&path)
            .map_err(|e| PipelineError::artifact_write(&path, &e))?
            .len();
        artifacts.push(PackageArtifact {
            architecture: arch,
            version: version.clone(),
            path,
            size,
            sha256,
        });
    }
    Ok(BuildManifest::from_artifacts(
        config,
        version,
        &artifacts,
        GeneratedAt::now(),
    ))
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
