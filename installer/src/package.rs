//! Native installer packaging.
//!
//! A staging root becomes one `.pkg` in two stages: `pkgbuild` produces a
//! component package from the payload tree, then `productbuild` wraps it in a
//! distribution package driven by `distribution.xml`. Both tools sit behind
//! [`PackagingTools`] so the builder's ordering and error handling can be
//! exercised without macOS.

use crate::cleanup::remove_partial_file;
use crate::command::{CommandRunner, ToolOutput, args};
use crate::config::PackagingConfig;
use crate::distribution::{DistributionDefinition, LICENSE_FILE};
use crate::error::{PipelineError, Result};
use crate::request::BuildRequest;
use crate::stager::{StagingRoot, human_size};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fs;
use std::io;

/// Component package builder.
pub const PKGBUILD: &str = "pkgbuild";

/// Distribution package builder.
pub const PRODUCTBUILD: &str = "productbuild";

/// Component packages smaller than this are almost certainly missing payload.
pub const SMALL_COMPONENT_BYTES: u64 = 1024 * 1024;

const XCODE_HINT: &str = "not found; install Xcode Command Line Tools: xcode-select --install";

/// Structured result of one packaging tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Whether the tool reported success.
    pub success: bool,
    /// Exit status, if the tool exited normally.
    pub status: Option<i32>,
    /// The tool's diagnostic text.
    pub diagnostic: String,
}

impl From<ToolOutput> for ToolOutcome {
    fn from(output: ToolOutput) -> Self {
        Self {
            success: output.succeeded(),
            status: output.status,
            diagnostic: output.diagnostic(),
        }
    }
}

/// Inputs for the component stage.
#[derive(Debug, Clone)]
pub struct ComponentBuild<'a> {
    /// Payload tree.
    pub root: &'a Utf8Path,
    /// Package identifier.
    pub identifier: &'a str,
    /// Package version.
    pub version: &'a str,
    /// Install location on the target volume.
    pub install_location: &'a Utf8Path,
    /// Optional signing identity passed through to the tool.
    pub signing_identity: Option<&'a str>,
    /// Output path.
    pub output: &'a Utf8Path,
}

impl ComponentBuild<'_> {
    /// Return the `pkgbuild` argument list.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut out = args([
            "--root",
            self.root.as_str(),
            "--identifier",
            self.identifier,
            "--version",
            self.version,
            "--install-location",
            self.install_location.as_str(),
        ]);
        if let Some(identity) = self.signing_identity {
            out.extend(args(["--sign", identity]));
        }
        out.push(self.output.to_string());
        out
    }
}

/// Inputs for the distribution stage.
#[derive(Debug, Clone)]
pub struct DistributionBuild<'a> {
    /// Path to `distribution.xml`.
    pub distribution: &'a Utf8Path,
    /// Directory searched for the component package.
    pub package_path: &'a Utf8Path,
    /// Optional resources directory (license, background).
    pub resources: Option<&'a Utf8Path>,
    /// Optional signing identity passed through to the tool.
    pub signing_identity: Option<&'a str>,
    /// Output path.
    pub output: &'a Utf8Path,
}

impl DistributionBuild<'_> {
    /// Return the `productbuild` argument list.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut out = args([
            "--distribution",
            self.distribution.as_str(),
            "--package-path",
            self.package_path.as_str(),
        ]);
        if let Some(resources) = self.resources {
            out.extend(args(["--resources", resources.as_str()]));
        }
        if let Some(identity) = self.signing_identity {
            out.extend(args(["--sign", identity]));
        }
        out.push(self.output.to_string());
        out
    }
}

/// The packaging tool surface the builder depends on.
pub trait PackagingTools: Send + Sync {
    /// Check whether `tool` is available.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the lookup itself cannot run.
    fn locate(&self, tool: &str) -> io::Result<ToolOutcome>;

    /// Run the component stage.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tool cannot be spawned.
    fn build_component(&self, build: &ComponentBuild<'_>) -> io::Result<ToolOutcome>;

    /// Run the distribution stage.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tool cannot be spawned.
    fn build_distribution(&self, build: &DistributionBuild<'_>) -> io::Result<ToolOutcome>;
}

/// [`PackagingTools`] backed by the macOS command-line tools.
#[derive(Clone, Copy)]
pub struct MacosPackagingTools<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> MacosPackagingTools<'a> {
    /// Create tools that run through `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl PackagingTools for MacosPackagingTools<'_> {
    fn locate(&self, tool: &str) -> io::Result<ToolOutcome> {
        self.runner.run("which", &args([tool])).map(ToolOutcome::from)
    }

    fn build_component(&self, build: &ComponentBuild<'_>) -> io::Result<ToolOutcome> {
        self.runner
            .run(PKGBUILD, &build.to_args())
            .map(ToolOutcome::from)
    }

    fn build_distribution(&self, build: &DistributionBuild<'_>) -> io::Result<ToolOutcome> {
        self.runner
            .run(PRODUCTBUILD, &build.to_args())
            .map(ToolOutcome::from)
    }
}

/// Paths and sizes produced by one packaging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    /// Final distribution package.
    pub path: Utf8PathBuf,
    /// Intermediate component package.
    pub component_path: Utf8PathBuf,
    /// Component package size in bytes.
    pub component_size: u64,
    /// Final package size in bytes.
    pub size: u64,
}

/// Drives the two packaging stages for one architecture.
pub struct PackageBuilder<'a> {
    tools: &'a dyn PackagingTools,
    config: &'a PackagingConfig,
}

impl<'a> PackageBuilder<'a> {
    /// Create a builder over the given tools and configuration.
    #[must_use]
    pub fn new(tools: &'a dyn PackagingTools, config: &'a PackagingConfig) -> Self {
        Self { tools, config }
    }

    /// Check both packaging tools are installed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PackagingTool`] naming the first missing tool.
    pub fn check_tools(&self) -> Result<()> {
        for tool in [PKGBUILD, PRODUCTBUILD] {
            let found = self.tools.locate(tool).is_ok_and(|outcome| outcome.success);
            if !found {
                return Err(PipelineError::PackagingTool {
                    tool,
                    diagnostic: XCODE_HINT.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Package `staging` into the final installer for `request`.
    ///
    /// Intermediate files go into `staging_dir`. Any existing file at the
    /// final path is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PackagingTool`] if a tool is missing, fails,
    /// or reports success without producing its output, and
    /// [`PipelineError::ArtifactWrite`] for filesystem failures. A partial
    /// final package is removed before the error is returned.
    pub fn build(
        &self,
        request: &BuildRequest,
        staging: &StagingRoot,
        staging_dir: &Utf8Path,
    ) -> Result<BuiltPackage> {
        self.check_tools()?;

        let name = request.artifact_name();
        let final_path = request.artifact_path();
        fs::create_dir_all(&request.output_dir)
            .map_err(|e| PipelineError::artifact_write(&request.output_dir, &e))?;
        remove_existing(&final_path)?;

        let component_path = staging_dir.join(name.component_filename());
        remove_existing(&component_path)?;
        let package = &self.config.package;
        let component = ComponentBuild {
            root: &staging.root,
            identifier: &self.config.layout.identifier,
            version: request.version.as_str(),
            install_location: &self.config.layout.install_root,
            signing_identity: package.component_signing_identity.as_deref(),
            output: &component_path,
        };
        info!("creating component package {component_path}");
        check_outcome(PKGBUILD, self.tools.build_component(&component))?;
        let component_size = output_size(PKGBUILD, &component_path)?;
        if component_size < SMALL_COMPONENT_BYTES {
            warn!(
                "component package {component_path} is unusually small ({})",
                human_size(component_size)
            );
        }

        let resources = self.prepare_resources(staging_dir)?;
        let distribution = DistributionDefinition::new(self.config, &name).write_to(staging_dir)?;
        let product = DistributionBuild {
            distribution: &distribution,
            package_path: staging_dir,
            resources: resources.as_deref(),
            signing_identity: package.distribution_signing_identity.as_deref(),
            output: &final_path,
        };
        info!("creating distribution package {final_path}");
        let built = check_outcome(PRODUCTBUILD, self.tools.build_distribution(&product))
            .and_then(|()| output_size(PRODUCTBUILD, &final_path));
        match built {
            Ok(size) => Ok(BuiltPackage {
                path: final_path,
                component_path,
                component_size,
                size,
            }),
            Err(err) => {
                remove_partial_file(&final_path);
                Err(err)
            }
        }
    }

    fn prepare_resources(&self, staging_dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        let Some(license) = &self.config.package.license else {
            return Ok(None);
        };
        let resources = staging_dir.join("resources");
        fs::create_dir_all(&resources).map_err(|e| PipelineError::artifact_write(&resources, &e))?;
        let target = resources.join(LICENSE_FILE);
        fs::copy(license, &target).map_err(|e| PipelineError::ArtifactWrite {
            path: target.clone(),
            reason: format!("cannot copy license {license}: {e}"),
        })?;
        debug!("copied license {license} into {resources}");
        Ok(Some(resources))
    }
}

fn remove_existing(path: &Utf8Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed existing {path}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::artifact_write(path, &e)),
    }
}

fn check_outcome(tool: &'static str, outcome: io::Result<ToolOutcome>) -> Result<()> {
    match outcome {
        Ok(outcome) if outcome.success => Ok(()),
        Ok(outcome) => Err(PipelineError::PackagingTool {
            tool,
            diagnostic: outcome.diagnostic,
        }),
        Err(e) => Err(PipelineError::PackagingTool {
            tool,
            diagnostic: e.to_string(),
        }),
    }
}

fn output_size(tool: &'static str, path: &Utf8Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|_| PipelineError::PackagingTool {
            tool,
            diagnostic: format!("reported success but {path} was not created"),
        })
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
