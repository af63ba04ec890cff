//! Immutable build requests.
//!
//! A [`BuildRequest`] is fully validated before any filesystem mutation: the
//! architecture is parsed, and the version is either taken from the caller or
//! resolved once from a [`VersionSource`]. Nothing downstream re-resolves.

use crate::arch::Architecture;
use crate::error::{PipelineError, Result};
use crate::naming::ArtifactName;
use crate::version::{Version, VersionSource};
use camino::{Utf8Path, Utf8PathBuf};
use log::info;

/// Parameters for one architecture's pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Application (and package) name.
    pub application: String,
    /// Version used for every artifact name.
    pub version: Version,
    /// Target architecture.
    pub architecture: Architecture,
    /// Directory receiving the installer and digest.
    pub output_dir: Utf8PathBuf,
}

impl BuildRequest {
    /// Validate inputs and build a request, resolving the version if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArchitecture`] for an unknown selector,
    /// [`PipelineError::InvalidVersion`] for an unusable version string, or
    /// [`PipelineError::VersionResolution`] when the source cannot answer.
    pub fn resolve(
        application: &str,
        version: Option<&str>,
        architecture: &str,
        output_dir: &Utf8Path,
        source: &dyn VersionSource,
    ) -> Result<Self> {
        let mut requests = Self::resolve_all(
            application,
            version,
            &[architecture.to_owned()],
            output_dir,
            source,
        )?;
        requests.pop().ok_or_else(|| PipelineError::InvalidArchitecture {
            value: architecture.to_owned(),
            expected: Architecture::expected_list(),
        })
    }

    /// Build one request per architecture, sharing a single resolved version.
    ///
    /// Every selector is parsed before the version source is consulted, and
    /// duplicates collapse to one request.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub fn resolve_all(
        application: &str,
        version: Option<&str>,
        architectures: &[String],
        output_dir: &Utf8Path,
        source: &dyn VersionSource,
    ) -> Result<Vec<Self>> {
        let parsed = Architecture::parse_selectors(architectures)?;
        let version = resolve_version(application, version, source)?;
        Ok(parsed
            .into_iter()
            .map(|architecture| Self {
                application: application.to_owned(),
                version: version.clone(),
                architecture,
                output_dir: output_dir.to_path_buf(),
            })
            .collect())
    }

    /// Return the naming policy for this request.
    #[must_use]
    pub fn artifact_name(&self) -> ArtifactName {
        ArtifactName::new(&self.application, self.version.clone(), self.architecture)
    }

    /// Return the final installer path.
    #[must_use]
    pub fn artifact_path(&self) -> Utf8PathBuf {
        self.output_dir.join(self.artifact_name().filename())
    }

    /// Return the digest file path.
    #[must_use]
    pub fn digest_path(&self) -> Utf8PathBuf {
        self.output_dir.join(self.artifact_name().digest_filename())
    }
}

fn resolve_version(
    application: &str,
    explicit: Option<&str>,
    source: &dyn VersionSource,
) -> Result<Version> {
    if let Some(value) = explicit {
        return Version::try_from(value);
    }
    let published =
        source
            .published_version(application)
            .map_err(|e| PipelineError::VersionResolution {
                package: application.to_owned(),
                reason: e.to_string(),
            })?;
    let version = Version::try_from(published)?;
    info!("resolved {application} version {version}");
    Ok(version)
}
