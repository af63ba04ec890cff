//! Launcher script generation.
//!
//! The launcher is a bash script installed at `<install_root>/bin/<exe>`. It
//! hard-codes the absolute runtime path, so it keeps working when invoked via
//! symlinks or from any working directory.

use crate::config::PackagingConfig;
use crate::error::{PipelineError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fs;

/// Exit status used when the bundled runtime is missing or not executable.
///
/// Matches the shell's own "command not found" status.
pub const MISSING_RUNTIME_EXIT_CODE: i32 = 127;

/// Everything the launcher template needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSpec {
    /// Installed runtime directory.
    pub runtime_dir: Utf8PathBuf,
    /// Command name shown in diagnostics.
    pub executable: String,
    /// Product name used in the reinstall instruction.
    pub display_name: String,
    /// Module run with `python3 -m`.
    pub entry_module: String,
    /// Installation-channel variable name.
    pub channel_variable: String,
    /// Installation-channel variable value.
    pub channel_value: String,
    /// Command suggested when the runtime is missing; may be empty.
    pub reinstall_hint: String,
}

impl LauncherSpec {
    /// Derive the launcher parameters from packaging configuration.
    #[must_use]
    pub fn from_config(config: &PackagingConfig) -> Self {
        Self {
            runtime_dir: config.installed_runtime_dir(),
            executable: config.application.executable.clone(),
            display_name: config.application.display_name.clone(),
            entry_module: config.application.entry_module.clone(),
            channel_variable: config.launcher.channel_variable.clone(),
            channel_value: config.launcher.channel_value.clone(),
            reinstall_hint: config.launcher.reinstall_hint.clone(),
        }
    }

    /// Return the interpreter path the launcher executes.
    #[must_use]
    pub fn interpreter(&self) -> Utf8PathBuf {
        self.runtime_dir.join("bin").join("python3")
    }
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render the launcher script.
///
/// # Examples
///
/// ```
/// use pkgsmith::config::PackagingConfig;
/// use pkgsmith::launcher::{LauncherSpec, render_launcher};
///
/// let script = render_launcher(&LauncherSpec::from_config(&PackagingConfig::default()));
/// assert!(script.contains("'/usr/local/microsoft/azure-cli/bin/python3'"));
/// assert!(script.contains("export AZ_INSTALLER='PKG'"));
/// assert!(script.contains("-m 'azure.cli' \"$@\""));
/// ```
#[must_use]
pub fn render_launcher(spec: &LauncherSpec) -> String {
    let mut hint = format!(
        "  echo {} >&2\n",
        shell_quote(&format!("Reinstall {} to restore it.", spec.display_name))
    );
    if !spec.reinstall_hint.trim().is_empty() {
        hint.push_str(&format!(
            "  echo {} >&2\n",
            shell_quote(&format!("Reinstall with: {}", spec.reinstall_hint))
        ));
    }
    format!(
        r#"#!/usr/bin/env bash
set -euo pipefail

PYTHON={python}

if [[ ! -x "${{PYTHON}}" ]]; then
  echo {missing} >&2
{hint}  exit {code}
fi

export {var}={value}
exec "${{PYTHON}}" -m {module} "$@"
"#,
        python = shell_quote(spec.interpreter().as_str()),
        missing = shell_quote(&format!(
            "{}: bundled runtime not found at {}",
            spec.executable,
            spec.interpreter()
        )),
        code = MISSING_RUNTIME_EXIT_CODE,
        var = spec.channel_variable,
        value = shell_quote(&spec.channel_value),
        module = shell_quote(&spec.entry_module),
    )
}

/// Write the launcher to `path` with mode 0755.
///
/// # Errors
///
/// Returns [`PipelineError::LauncherWrite`] if the directory, file, or
/// permissions cannot be written.
pub fn write_launcher(spec: &LauncherSpec, path: &Utf8Path) -> Result<()> {
    let fail = |e: std::io::Error| PipelineError::LauncherWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    fs::write(path, render_launcher(spec)).map_err(fail)?;
    set_executable(path).map_err(fail)?;
    debug!("wrote launcher {path}");
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Utf8Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Utf8Path) -> std::io::Result<()> {
    Ok(())
}
