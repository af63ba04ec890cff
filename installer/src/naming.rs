//! Artifact naming policy.
//!
//! Installer names are derived only from the application name, version, and
//! architecture: `<app>-<version>-macos-<arch>.pkg`. Release tooling globs for
//! these names, so they carry no other metadata.

use crate::arch::Architecture;
use crate::version::Version;
use std::fmt;

/// The fixed file extension for installer packages.
const PACKAGE_EXTENSION: &str = ".pkg";

/// The suffix appended to an installer name to form its digest file name.
pub const DIGEST_SUFFIX: &str = ".sha256";

/// A fully-qualified installer file name.
///
/// # Examples
///
/// ```
/// use pkgsmith::arch::Architecture;
/// use pkgsmith::naming::ArtifactName;
/// use pkgsmith::version::Version;
///
/// let name = ArtifactName::new(
///     "sample-cli",
///     Version::try_from("9.9.9").expect("valid version"),
///     Architecture::Arm64,
/// );
/// assert_eq!(name.to_string(), "sample-cli-9.9.9-macos-arm64.pkg");
/// assert_eq!(name.digest_filename(), "sample-cli-9.9.9-macos-arm64.pkg.sha256");
/// assert_eq!(
///     name.component_filename(),
///     "sample-cli-component-9.9.9-macos-arm64.pkg"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    application: String,
    version: Version,
    arch: Architecture,
}

impl ArtifactName {
    /// Create an artifact name from validated components.
    #[must_use]
    pub fn new(application: impl Into<String>, version: Version, arch: Architecture) -> Self {
        Self {
            application: application.into(),
            version,
            arch,
        }
    }

    /// Return the application component.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Return the version component.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Return the architecture component.
    #[must_use]
    pub fn arch(&self) -> Architecture {
        self.arch
    }

    /// Return the distributed installer file name.
    #[must_use]
    pub fn filename(&self) -> String {
        self.to_string()
    }

    /// Return the digest file name (`<installer>.sha256`).
    #[must_use]
    pub fn digest_filename(&self) -> String {
        format!("{self}{DIGEST_SUFFIX}")
    }

    /// Return the intermediate component package file name.
    #[must_use]
    pub fn component_filename(&self) -> String {
        format!(
            "{}-component-{}-{}{PACKAGE_EXTENSION}",
            self.application,
            self.version,
            self.arch.platform_tag()
        )
    }

    /// Return the manifest file name shared by every architecture of a version.
    #[must_use]
    pub fn manifest_filename(application: &str, version: &Version) -> String {
        format!("{application}-{version}-manifest.json")
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}{PACKAGE_EXTENSION}",
            self.application,
            self.version,
            self.arch.platform_tag()
        )
    }
}
