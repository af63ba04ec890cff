//! Artifact finalization: digests beside each installer.

use crate::arch::Architecture;
use crate::cleanup::remove_partial_file;
use crate::digest::{Sha256Digest, checksum_line, compute_sha256, parse_checksum_line};
use crate::error::{PipelineError, Result};
use crate::naming::DIGEST_SUFFIX;
use crate::request::BuildRequest;
use crate::version::Version;
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use std::fs;

/// A finished installer with its integrity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    /// Target architecture.
    pub architecture: Architecture,
    /// Application version.
    pub version: Version,
    /// Installer path.
    pub path: Utf8PathBuf,
    /// Installer size in bytes.
    pub size: u64,
    /// SHA-256 of the installer bytes.
    pub sha256: Sha256Digest,
}

impl PackageArtifact {
    /// Return the digest file path for this artifact.
    #[must_use]
    pub fn digest_path(&self) -> Utf8PathBuf {
        digest_path_for(&self.path)
    }

    /// Return the installer file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }
}

/// Return `<artifact>.sha256`.
#[must_use]
pub fn digest_path_for(artifact: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{artifact}{DIGEST_SUFFIX}"))
}

/// Hash the built installer for `request` and write its digest file.
///
/// # Errors
///
/// Returns [`PipelineError::ArtifactWrite`] if the installer cannot be read
/// or the digest file cannot be written.
pub fn finalize(request: &BuildRequest) -> Result<PackageArtifact> {
    let path = request.artifact_path();
    let size = fs::metadata(&path)
        .map_err(|e| PipelineError::artifact_write(&path, &e))?
        .len();
    let sha256 = compute_sha256(path.as_std_path()).map_err(|e| PipelineError::artifact_write(&path, &e))?;
    let artifact = PackageArtifact {
        architecture: request.architecture,
        version: request.version.clone(),
        path,
        size,
        sha256,
    };
    let digest_path = artifact.digest_path();
    let line = checksum_line(&artifact.sha256, artifact.file_name());
    if let Err(e) = fs::write(&digest_path, line) {
        remove_partial_file(&digest_path);
        return Err(PipelineError::artifact_write(&digest_path, &e));
    }
    info!("SHA256: {}  {}", artifact.sha256, artifact.file_name());
    Ok(artifact)
}

/// Recompute an installer's digest and compare it with its digest file.
///
/// # Errors
///
/// Returns [`PipelineError::ArtifactWrite`] if either file cannot be read or
/// the digest file is malformed, and [`PipelineError::DigestMismatch`] if the
/// recorded digest or file name disagrees with the installer.
pub fn verify_digest_file(artifact: &Utf8Path) -> Result<Sha256Digest> {
    let digest_path = digest_path_for(artifact);
    let contents =
        fs::read_to_string(&digest_path).map_err(|e| PipelineError::artifact_write(&digest_path, &e))?;
    let (recorded, name) = parse_checksum_line(&contents).map_err(|e| PipelineError::ArtifactWrite {
        path: digest_path.clone(),
        reason: e.to_string(),
    })?;
    let expected_name = artifact.file_name().unwrap_or(artifact.as_str());
    if name != expected_name {
        return Err(PipelineError::DigestMismatch {
            path: artifact.to_path_buf(),
            recorded: format!("{recorded} (for {name})"),
            actual: format!("digest file must name {expected_name}"),
        });
    }
    let actual = compute_sha256(artifact.as_std_path()).map_err(|e| PipelineError::artifact_write(artifact, &e))?;
    if actual != recorded {
        return Err(PipelineError::DigestMismatch {
            path: artifact.to_path_buf(),
            recorded: recorded.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(actual)
}

/// Load an already-finalized artifact for `request`, verifying its digest.
///
/// Returns `Ok(None)` when either the installer or its digest is absent.
///
/// # Errors
///
/// Returns the errors of [`verify_digest_file`] when both files exist but do
/// not agree.
pub fn load_existing(request: &BuildRequest) -> Result<Option<PackageArtifact>> {
    let path = request.artifact_path();
    if !path.is_file() || !digest_path_for(&path).is_file() {
        return Ok(None);
    }
    let sha256 = verify_digest_file(&path)?;
    let size = fs::metadata(&path)
        .map_err(|e| PipelineError::artifact_write(&path, &e))?
        .len();
    Ok(Some(PackageArtifact {
        architecture: request.architecture,
        version: request.version.clone(),
        path,
        size,
        sha256,
    }))
}
