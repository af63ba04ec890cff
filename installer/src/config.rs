//! Packaging configuration.
//!
//! Settings live in an optional `pkgsmith.toml`, grouped by pipeline stage.
//! Every field has a default reproducing the Azure CLI installer, so an empty
//! file (or no file at all) yields a working configuration. Unknown keys are
//! rejected to catch typos in CI-maintained files.
//!
//! The identifier, install root, vendor directory, and executable name form
//! the installed identity of the package. Upgrade and uninstall tooling keys
//! off them, so they must not change between releases.

use crate::error::{PipelineError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

/// Complete pipeline configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackagingConfig {
    /// What is being packaged and how it is started.
    pub application: ApplicationConfig,
    /// Installed filesystem identity.
    pub layout: LayoutConfig,
    /// Runtime environment assembly.
    pub environment: EnvironmentConfig,
    /// Generated launcher behaviour.
    pub launcher: LauncherConfig,
    /// Native installer presentation.
    pub package: PackageConfig,
    /// Additional pruning patterns.
    pub prune: PruneConfig,
    /// Artifact publication settings.
    pub release: ReleaseConfig,
}

/// Application identity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Distribution name on the package index, also used in artifact names.
    pub name: String,
    /// Human-readable name shown by the installer.
    pub display_name: String,
    /// Name of the launcher installed into `<install_root>/bin`.
    pub executable: String,
    /// Module run with `python3 -m` by the launcher.
    pub entry_module: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "azure-cli".to_owned(),
            display_name: "Azure CLI".to_owned(),
            executable: "az".to_owned(),
            entry_module: "azure.cli".to_owned(),
        }
    }
}

/// Installed filesystem identity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Absolute install location passed to the component package.
    pub install_root: Utf8PathBuf,
    /// Vendor directory under the install root holding the runtime.
    pub vendor: String,
    /// Reverse-DNS package identifier recorded in the OS receipt database.
    pub identifier: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            install_root: Utf8PathBuf::from("/usr/local"),
            vendor: "microsoft".to_owned(),
            identifier: "com.microsoft.azure-cli".to_owned(),
        }
    }
}

/// Runtime environment assembly settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Interpreter used to create the isolated environment.
    pub python: String,
    /// Base URL of a PyPI-compatible JSON API.
    pub index_url: String,
    /// Local source directories installed in order instead of the index
    /// release. Empty means `<name>==<version>` from the index.
    pub install_sources: Vec<Utf8PathBuf>,
    /// Packaging tools upgraded before the application is installed.
    pub bootstrap_packages: Vec<String>,
    /// File holding a `__version__` assignment, consulted instead of the
    /// index when no version is given explicitly.
    pub version_file: Option<Utf8PathBuf>,
    /// Run the entry module with `--version` after installation.
    pub verify_install: bool,
    /// Run every interpreter through `arch -<target>` so a universal Python
    /// builds each architecture's runtime natively or under Rosetta. When
    /// disabled the interpreter must already run as the target.
    pub select_architecture: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_owned(),
            index_url: "https://pypi.org/pypi".to_owned(),
            install_sources: Vec::new(),
            bootstrap_packages: vec![
                "pip".to_owned(),
                "setuptools".to_owned(),
                "wheel".to_owned(),
            ],
            version_file: None,
            verify_install: true,
            select_architecture: true,
        }
    }
}

/// Launcher settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Variable exported to tell the application how it was installed.
    pub channel_variable: String,
    /// Value of [`Self::channel_variable`].
    pub channel_value: String,
    /// Command suggested when the runtime is missing.
    pub reinstall_hint: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            channel_variable: "AZ_INSTALLER".to_owned(),
            channel_value: "PKG".to_owned(),
            reinstall_hint: "brew reinstall --cask azure-cli".to_owned(),
        }
    }
}

/// Native installer presentation and signing hooks.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    /// Minimum macOS version accepted by the distribution package.
    pub min_os_version: String,
    /// Optional license file shown by the installer.
    pub license: Option<Utf8PathBuf>,
    /// Identity passed to `pkgbuild --sign`. Signing itself is external.
    pub component_signing_identity: Option<String>,
    /// Identity passed to `productbuild --sign`. Signing itself is external.
    pub distribution_signing_identity: Option<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            min_os_version: "10.15".to_owned(),
            license: None,
            component_signing_identity: None,
            distribution_signing_identity: None,
        }
    }
}

/// Extra deny-list entries appended to the built-in list.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PruneConfig {
    /// Directory name patterns removed wherever they appear.
    pub directories: Vec<String>,
    /// File name patterns removed wherever they appear.
    pub files: Vec<String>,
}

/// Artifact publication settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Download URL template with `{version}` and `{file}` placeholders.
    pub download_url_template: Option<String>,
    /// What to do when the output directory already holds this artifact.
    pub on_existing: ExistingArtifactPolicy,
}

/// Behaviour when an artifact for the same version and architecture exists.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExistingArtifactPolicy {
    /// Abort the architecture run.
    #[default]
    Fail,
    /// Delete the old installer and digest and rebuild.
    Overwrite,
    /// Keep the existing installer if its digest verifies; rebuild otherwise.
    Skip,
}

impl std::fmt::Display for ExistingArtifactPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fail => "fail",
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
        })
    }
}

/// Why a configuration file was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text does not parse or names an unknown key.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    /// A field parsed but breaks a layout invariant.
    #[error("{field} {problem}")]
    Invalid {
        /// Dotted name of the offending field.
        field: &'static str,
        /// What is wrong with its value.
        problem: String,
    },
}

fn invalid(field: &'static str, problem: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        problem: problem.into(),
    }
}

impl PackagingConfig {
    /// Load configuration from `path`, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the file cannot be read, does
    /// not parse, or violates a layout invariant.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| PipelineError::Config {
            path: path.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for the first parse or validation failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkgsmith::config::PackagingConfig;
    ///
    /// let config = PackagingConfig::from_toml(
    ///     "[application]\nname = \"sample-cli\"\nexecutable = \"sample\"\n",
    /// )
    /// .expect("valid configuration");
    /// assert_eq!(config.application.name, "sample-cli");
    /// assert_eq!(config.layout.identifier, "com.microsoft.azure-cli");
    /// ```
    pub fn from_toml(contents: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.layout.install_root.is_absolute() {
            return Err(invalid(
                "layout.install_root",
                format!("must be absolute, got {}", self.layout.install_root),
            ));
        }
        if self.layout.identifier.split('.').filter(|s| !s.is_empty()).count() < 2 {
            return Err(invalid(
                "layout.identifier",
                format!("must be reverse-DNS, got \"{}\"", self.layout.identifier),
            ));
        }
        for (field, value) in [
            ("application.name", &self.application.name),
            ("application.executable", &self.application.executable),
            ("layout.vendor", &self.layout.vendor),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
                return Err(invalid(
                    field,
                    format!("must be a single path component, got \"{value}\""),
                ));
            }
        }
        if self.application.entry_module.trim().is_empty() {
            return Err(invalid("application.entry_module", "must not be empty"));
        }
        let variable = &self.launcher.channel_variable;
        let starts_well = variable
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !starts_well || !variable.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(
                "launcher.channel_variable",
                format!("is not a valid variable name: \"{variable}\""),
            ));
        }
        Ok(())
    }

    /// Absolute installed path of the runtime tree
    /// (`<install_root>/<vendor>/<name>`).
    #[must_use]
    pub fn installed_runtime_dir(&self) -> Utf8PathBuf {
        self.layout
            .install_root
            .join(&self.layout.vendor)
            .join(&self.application.name)
    }

    /// Absolute installed path of the launcher (`<install_root>/bin/<exe>`).
    #[must_use]
    pub fn installed_launcher_path(&self) -> Utf8PathBuf {
        self.layout
            .install_root
            .join("bin")
            .join(&self.application.executable)
    }
}
