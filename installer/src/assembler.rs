//! Runtime environment assembly.
//!
//! Creates an isolated Python virtual environment with copied (not symlinked)
//! interpreter binaries, upgrades the packaging bootstrap, installs the
//! application with its dependency closure, and optionally checks that the
//! entry module starts. Every step runs through a [`CommandRunner`], under
//! `arch -<target>` unless architecture selection is disabled, and the new
//! interpreter must report the target machine before anything is installed.

use crate::arch::Architecture;
use crate::cleanup::remove_partial_dir;
use crate::command::{CommandRunner, ToolOutput, args, render_command};
use crate::config::PackagingConfig;
use crate::error::{PipelineError, Result};
use crate::request::BuildRequest;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fs;

/// The macOS tool that runs a universal binary as a chosen architecture.
pub const ARCH_TOOL: &str = "arch";

const MACHINE_QUERY: &str = "import platform; print(platform.machine())";

/// An isolated runtime owned by one architecture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Environment root directory.
    pub root: Utf8PathBuf,
    /// Interpreter inside the environment.
    pub interpreter: Utf8PathBuf,
}

impl RuntimeEnvironment {
    /// Describe the environment rooted at `root`.
    #[must_use]
    pub fn at(root: Utf8PathBuf) -> Self {
        let interpreter = root.join("bin").join("python3");
        Self { root, interpreter }
    }
}

/// Whether an existing environment directory may be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingEnvironment {
    /// Fail with [`PipelineError::EnvironmentCreate`].
    #[default]
    Refuse,
    /// Delete it and build a fresh one.
    Replace,
}

/// Builds [`RuntimeEnvironment`]s.
pub struct Assembler<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a PackagingConfig,
}

impl<'a> Assembler<'a> {
    /// Create an assembler over the given runner and configuration.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, config: &'a PackagingConfig) -> Self {
        Self { runner, config }
    }

    /// Assemble the environment for `request` at `env_root`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EnvironmentCreate`] if the directory exists
    /// and may not be replaced, or if the environment tool fails, and
    /// [`PipelineError::DependencyInstall`] if any install or verification
    /// step fails. Any environment created by this call is deleted before an
    /// error is returned.
    pub fn assemble(
        &self,
        request: &BuildRequest,
        env_root: &Utf8Path,
        existing: ExistingEnvironment,
    ) -> Result<RuntimeEnvironment> {
        if env_root.exists() {
            match existing {
                ExistingEnvironment::Refuse => {
                    return Err(PipelineError::EnvironmentCreate {
                        path: env_root.to_path_buf(),
                        reason: "directory already exists; pass --force to rebuild".to_owned(),
                    });
                }
                ExistingEnvironment::Replace => {
                    debug!("removing existing environment {env_root}");
                    fs::remove_dir_all(env_root).map_err(|e| create_error(env_root, &e))?;
                }
            }
        }
        if let Some(parent) = env_root.parent() {
            fs::create_dir_all(parent).map_err(|e| create_error(env_root, &e))?;
        }

        let result = self
            .create(request.architecture, env_root)
            .and_then(|env| self.populate(request, &env).map(|()| env));
        if result.is_err() && env_root.exists() {
            warn!("removing failed environment {env_root}");
            remove_partial_dir(env_root);
        }
        result
    }

    /// Run `program` as `arch`, through [`ARCH_TOOL`] when selection is on.
    fn run_as(
        &self,
        arch: Architecture,
        program: &str,
        arguments: &[String],
    ) -> std::io::Result<ToolOutput> {
        if self.config.environment.select_architecture {
            let mut wrapped = args([arch.arch_flag(), program]);
            wrapped.extend_from_slice(arguments);
            self.runner.run(ARCH_TOOL, &wrapped)
        } else {
            self.runner.run(program, arguments)
        }
    }

    fn create(&self, arch: Architecture, env_root: &Utf8Path) -> Result<RuntimeEnvironment> {
        info!("creating {arch} runtime environment at {env_root}");
        let python = &self.config.environment.python;
        let output = self
            .run_as(arch, python, &args(["-m", "venv", "--copies", env_root.as_str()]))
            .map_err(|e| create_error(env_root, &e))?;
        if !output.succeeded() {
            return Err(PipelineError::EnvironmentCreate {
                path: env_root.to_path_buf(),
                reason: output.diagnostic(),
            });
        }
        let env = RuntimeEnvironment::at(env_root.to_path_buf());
        if !env.interpreter.is_file() {
            return Err(PipelineError::EnvironmentCreate {
                path: env_root.to_path_buf(),
                reason: format!("interpreter {} was not created", env.interpreter),
            });
        }
        self.check_machine(arch, &env)?;
        Ok(env)
    }

    /// Reject an interpreter that does not execute as `arch`.
    fn check_machine(&self, arch: Architecture, env: &RuntimeEnvironment) -> Result<()> {
        let output = self
            .run_as(arch, env.interpreter.as_str(), &args(["-c", MACHINE_QUERY]))
            .map_err(|e| create_error(&env.root, &e))?;
        if !output.succeeded() {
            return Err(PipelineError::EnvironmentCreate {
                path: env.root.clone(),
                reason: output.diagnostic(),
            });
        }
        let machine = output.stdout.trim();
        if !arch.matches_machine(machine) {
            return Err(PipelineError::EnvironmentCreate {
                path: env.root.clone(),
                reason: format!(
                    "interpreter runs as {machine}, not {arch}; use a universal or {arch} Python"
                ),
            });
        }
        debug!("{} runs as {machine}", env.interpreter);
        Ok(())
    }

    fn populate(&self, request: &BuildRequest, env: &RuntimeEnvironment) -> Result<()> {
        let settings = &self.config.environment;
        let arch = request.architecture;
        if !settings.bootstrap_packages.is_empty() {
            let mut pip = args(["-m", "pip", "install", "--upgrade"]);
            pip.extend(settings.bootstrap_packages.iter().cloned());
            self.install_step(arch, env, "upgrade packaging tools", &pip)?;
        }

        for requirement in self.requirements(request) {
            let step = format!("install {requirement}");
            self.install_step(arch, env, &step, &args(["-m", "pip", "install", requirement.as_str()]))?;
        }

        if settings.verify_install {
            let module = &self.config.application.entry_module;
            let output = self.install_step(
                arch,
                env,
                "verify installation",
                &args(["-m", module, "--version"]),
            )?;
            info!("installed {}: {}", request.application, output.stdout.trim());
        }
        Ok(())
    }

    /// Return what to hand to `pip install`, in order.
    ///
    /// Local sources win over the index so a checkout can be packaged before
    /// it is published.
    fn requirements(&self, request: &BuildRequest) -> Vec<String> {
        let sources = &self.config.environment.install_sources;
        if sources.is_empty() {
            vec![format!("{}=={}", request.application, request.version)]
        } else {
            sources.iter().map(ToString::to_string).collect()
        }
    }

    fn install_step(
        &self,
        arch: Architecture,
        env: &RuntimeEnvironment,
        step: &str,
        arguments: &[String],
    ) -> Result<ToolOutput> {
        debug!("{step}: {}", render_command(env.interpreter.as_str(), arguments));
        let output = self
            .run_as(arch, env.interpreter.as_str(), arguments)
            .map_err(|e| PipelineError::DependencyInstall {
                step: step.to_owned(),
                diagnostic: e.to_string(),
            })?;
        if output.succeeded() {
            Ok(output)
        } else {
            Err(PipelineError::DependencyInstall {
                step: step.to_owned(),
                diagnostic: output.diagnostic(),
            })
        }
    }
}

fn create_error(path: &Utf8Path, err: &std::io::Error) -> PipelineError {
    PipelineError::EnvironmentCreate {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;
