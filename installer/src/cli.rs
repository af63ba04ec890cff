//! CLI argument definitions for pkgsmith.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::{ExistingArtifactPolicy, PackagingConfig};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Default output directory for installers, digests, and manifests.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Build macOS installer packages for Python command-line applications.
#[derive(Parser, Debug)]
#[command(name = "pkgsmith")]
#[command(version, about)]
#[command(long_about = concat!(
    "Build macOS installer packages for Python command-line applications.\n\n",
    "pkgsmith assembles an isolated runtime environment holding the application ",
    "and its dependencies, prunes it, adds a launcher script, and wraps the result ",
    "in a signed-ready distribution package. Each target architecture produces its ",
    "own installer and SHA-256 digest.\n\n",
    "Packaging settings (application name, install layout, signing identities) ",
    "come from an optional pkgsmith.toml; per-run choices come from flags.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Build the latest published release for Apple silicon:\n",
    "    $ pkgsmith build --arch arm64\n\n",
    "  Build a pinned version for both architectures and write a manifest:\n",
    "    $ pkgsmith build --arch arm64 --arch x86_64 --version 2.76.0 --manifest\n\n",
    "  Preview the plan without building:\n",
    "    $ pkgsmith build --arch x86_64 --dry-run\n\n",
    "  Fold already-built installers into a manifest:\n",
    "    $ pkgsmith manifest --version 2.76.0 --arch arm64 --arch x86_64\n\n",
    "  Check a downloaded installer against its digest:\n",
    "    $ pkgsmith verify dist/azure-cli-2.76.0-macos-arm64.pkg",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build installers for one or more architectures.
    Build(BuildArgs),

    /// Write a release manifest from installers already in the output directory.
    Manifest(ManifestArgs),

    /// Recompute an installer's SHA-256 and compare it with its digest file.
    Verify(VerifyArgs),
}

/// Arguments for the build command.
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Target architecture (repeatable: arm64, x86_64).
    #[arg(short, long = "arch", value_name = "ARCH", required = true)]
    pub architectures: Vec<String>,

    /// Application version [default: latest published release].
    #[arg(long = "version", id = "app_version", value_name = "VERSION")]
    pub version: Option<String>,

    /// Directory receiving installers, digests, and the manifest.
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: Utf8PathBuf,

    /// Keep per-architecture environments and staging here [default: temporary].
    #[arg(short, long, value_name = "DIR")]
    pub work_dir: Option<Utf8PathBuf>,

    /// Packaging configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// What to do when an installer for this version already exists
    /// [default: from configuration, else fail].
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_existing: Option<ExistingArtifactPolicy>,

    /// Replace environments left in the work directory by earlier runs.
    #[arg(long)]
    pub force: bool,

    /// Write a release manifest once every architecture succeeds.
    #[arg(long)]
    pub manifest: bool,

    /// Show the resolved plan and exit without building.
    #[arg(long)]
    pub dry_run: bool,
}

impl BuildArgs {
    /// Return the existing-artifact policy, preferring the flag over the
    /// configuration file.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use pkgsmith::cli::{Cli, Command};
    /// use pkgsmith::config::{ExistingArtifactPolicy, PackagingConfig};
    ///
    /// let cli = Cli::parse_from(["pkgsmith", "build", "--arch", "arm64", "--on-existing", "skip"]);
    /// let Command::Build(args) = cli.command else { unreachable!() };
    /// let config = PackagingConfig::default();
    /// assert_eq!(args.existing_artifact_policy(&config), ExistingArtifactPolicy::Skip);
    /// ```
    #[must_use]
    pub fn existing_artifact_policy(&self, config: &PackagingConfig) -> ExistingArtifactPolicy {
        self.on_existing.unwrap_or(config.release.on_existing)
    }
}

/// Arguments for the manifest command.
#[derive(Parser, Debug, Clone)]
pub struct ManifestArgs {
    /// Version whose installers are folded into the manifest.
    #[arg(long = "version", id = "app_version", value_name = "VERSION", required = true)]
    pub version: String,

    /// Architecture the manifest must cover (repeatable).
    #[arg(short, long = "arch", value_name = "ARCH", required = true)]
    pub architectures: Vec<String>,

    /// Directory holding installers and digests.
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: Utf8PathBuf,

    /// Packaging configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,
}

/// Arguments for the verify command.
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Installer to check; its digest is read from `<installer>.sha256`.
    #[arg(value_name = "INSTALLER")]
    pub artifact: Utf8PathBuf,
}

impl Cli {
    /// Default log filter directive implied by `-v`/`-q`.
    ///
    /// `RUST_LOG`, when set, takes precedence in the binary.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
