//! pkgsmith library.
//!
//! Turns a Python command-line application into a self-contained macOS
//! installer package. For each target architecture the pipeline assembles an
//! isolated runtime environment, copies it into a pruned staging root, adds a
//! launcher script, builds a component and a distribution package with the
//! native tools, and records a SHA-256 digest beside the result. The `pkgsmith`
//! binary drives it; tests drive it with simulated hosts.
//!
//! # Modules
//!
//! - [`arch`] - Supported target architectures
//! - [`assembler`] - Runtime environment creation and dependency installation
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - External command execution seam
//! - [`config`] - Packaging configuration (`pkgsmith.toml`)
//! - [`digest`] - SHA-256 digests and checksum lines
//! - [`distribution`] - Distribution definition rendering
//! - [`error`] - Pipeline error taxonomy
//! - [`finalizer`] - Digest recording and verification
//! - [`launcher`] - Launcher script generation
//! - [`manifest`] - Release manifest for downstream channels
//! - [`naming`] - Artifact naming policy
//! - [`output`] - User-facing progress and summaries
//! - [`package`] - Component and distribution package building
//! - [`pipeline`] - Per-architecture orchestration
//! - [`prune`] - Versioned staging deny list
//! - [`request`] - Validated build requests
//! - [`stager`] - Staging-root assembly
//! - [`version`] - Version validation and resolution

pub mod arch;
pub mod assembler;
pub mod cli;
mod cleanup;
pub mod command;
pub mod config;
pub mod digest;
pub mod distribution;
pub mod error;
pub mod finalizer;
pub mod launcher;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod prune;
pub mod request;
pub mod stager;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
