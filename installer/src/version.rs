//! Application versions and the sources that publish them.
//!
//! A [`VersionSource`] is consulted at most once per run, when the
//! [`BuildRequest`](crate::request::BuildRequest) is constructed. The
//! resolved [`Version`] is then carried by value through every later stage.

use crate::error::{PipelineError, Result};
use camino::Utf8PathBuf;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Network timeout for index queries.
const INDEX_TIMEOUT: Duration = Duration::from_secs(30);

/// A validated application version, safe for use inside file names.
///
/// # Examples
///
/// ```
/// use pkgsmith::version::Version;
///
/// let version = Version::try_from("2.76.0").expect("valid version");
/// assert_eq!(version.as_str(), "2.76.0");
/// assert!(Version::try_from("1.0/../../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Return the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_version(value: &str) -> Result<()> {
    let invalid = |reason: String| PipelineError::InvalidVersion {
        value: value.to_owned(),
        reason,
    };
    if value.is_empty() {
        return Err(invalid("version is empty".to_owned()));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_' | '!')))
    {
        return Err(invalid(format!("character '{bad}' is not allowed")));
    }
    if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or digit".to_owned()));
    }
    Ok(())
}

impl TryFrom<&str> for Version {
    type Error = PipelineError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        validate_version(trimmed)?;
        Ok(Self(trimmed.to_owned()))
    }
}

impl TryFrom<String> for Version {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by a [`VersionSource`].
#[derive(Debug, thiserror::Error)]
pub enum VersionSourceError {
    /// The HTTP request to the index failed.
    #[error("request to {url} failed: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The package is not published on the index (HTTP 404).
    #[error("package not found at {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The response or file did not contain a usable version.
    #[error("no version found: {0}")]
    Missing(String),

    /// Reading a local version file failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A place the currently published application version can be read from.
#[cfg_attr(test, mockall::automock)]
pub trait VersionSource: Send + Sync {
    /// Return the currently published version string for `package`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached or has no version.
    fn published_version(&self, package: &str) -> std::result::Result<String, VersionSourceError>;
}

/// Queries a PyPI-compatible JSON API (`<index>/<package>/json`).
#[derive(Debug, Clone)]
pub struct PypiVersionSource {
    index_url: String,
}

#[derive(Deserialize)]
struct IndexDocument {
    info: IndexInfo,
}

#[derive(Deserialize)]
struct IndexInfo {
    version: Option<String>,
}

impl PypiVersionSource {
    /// Create a source for the given JSON API base URL.
    #[must_use]
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
        }
    }

    /// Return the JSON document URL for `package`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkgsmith::version::PypiVersionSource;
    ///
    /// let source = PypiVersionSource::new("https://pypi.org/pypi/");
    /// assert_eq!(
    ///     source.package_url("azure-cli"),
    ///     "https://pypi.org/pypi/azure-cli/json"
    /// );
    /// ```
    #[must_use]
    pub fn package_url(&self, package: &str) -> String {
        format!("{}/{package}/json", self.index_url.trim_end_matches('/'))
    }
}

impl VersionSource for PypiVersionSource {
    fn published_version(&self, package: &str) -> std::result::Result<String, VersionSourceError> {
        let url = self.package_url(package);
        debug!("querying {url} for the published version");
        let body = http_agent()
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, &e))?
            .into_body()
            .read_to_string()
            .map_err(|e| VersionSourceError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        parse_index_version(&body)
    }
}

/// Extract `info.version` from a JSON API response body.
fn parse_index_version(body: &str) -> std::result::Result<String, VersionSourceError> {
    let document: IndexDocument = serde_json::from_str(body)
        .map_err(|e| VersionSourceError::Missing(format!("malformed index response: {e}")))?;
    document
        .info
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| VersionSourceError::Missing("index response has no info.version".to_owned()))
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(INDEX_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

fn map_ureq_error(url: &str, err: &ureq::Error) -> VersionSourceError {
    match err {
        ureq::Error::StatusCode(404) => VersionSourceError::NotFound {
            url: url.to_owned(),
        },
        other => VersionSourceError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Reads a `__version__ = "x.y.z"` assignment from a source file.
///
/// This is how a checkout of the application's own repository reports the
/// version it would build.
#[derive(Debug, Clone)]
pub struct SourceTreeVersionSource {
    path: Utf8PathBuf,
}

impl SourceTreeVersionSource {
    /// Create a source that reads the given file.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VersionSource for SourceTreeVersionSource {
    fn published_version(&self, _package: &str) -> std::result::Result<String, VersionSourceError> {
        let source =
            std::fs::read_to_string(&self.path).map_err(|source| VersionSourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_dunder_version(&source).ok_or_else(|| {
            VersionSourceError::Missing(format!("no __version__ assignment in {}", self.path))
        })
    }
}

/// Find the first `__version__ = '…'` or `__version__ = "…"` assignment.
fn parse_dunder_version(source: &str) -> Option<String> {
    source.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix("__version__")?;
        let rest = rest.trim_start().strip_prefix('=')?.trim_start();
        let quote = rest.chars().next().filter(|c| matches!(c, '"' | '\''))?;
        let body = rest.get(1..)?;
        let end = body.find(quote)?;
        let value = body.get(..end)?;
        (!value.is_empty()).then(|| value.to_owned())
    })
}
