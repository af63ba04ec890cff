//! External process invocation.
//!
//! Every native tool the pipeline drives (the interpreter, `pip`, `pkgbuild`,
//! `productbuild`, `which`) is reached through [`CommandRunner`], which
//! reduces a process run to a [`ToolOutput`]. Components decide what a
//! failure means; the runner only reports it.

use log::debug;
use std::process::{Command, Output};

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ToolOutput {
    /// Create a successful output with the given standard output.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failed output with the given exit code and standard error.
    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns `true` when the command exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// Return the tool's own diagnostic text.
    ///
    /// Both streams are kept, standard output first, since tools such as `pip`
    /// explain a failure on one and summarise it on the other. The exit status
    /// is appended so an empty diagnostic is still actionable.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkgsmith::command::ToolOutput;
    ///
    /// let output = ToolOutput::failure(2, "pkgbuild: Invalid component\n");
    /// assert_eq!(output.diagnostic(), "pkgbuild: Invalid component (exit status 2)");
    /// ```
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let text = [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|stream| !stream.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let status = self
            .status
            .map_or_else(|| "terminated by signal".to_owned(), |c| format!("exit status {c}"));
        if text.is_empty() {
            status
        } else {
            format!("{text} ({status})")
        }
    }
}

impl From<Output> for ToolOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Abstraction for running external commands.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or waiting for the
    /// process. A non-zero exit status is not an error at this level.
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ToolOutput>;
}

/// Runs commands on the host system.
///
/// # Examples
///
/// ```no_run
/// use pkgsmith::command::{CommandRunner, SystemCommandRunner};
///
/// let output = SystemCommandRunner.run("python3", &["--version".to_owned()])?;
/// assert!(output.succeeded());
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ToolOutput> {
        debug!("→ {}", render_command(program, args));
        Command::new(program)
            .args(args)
            .output()
            .map(ToolOutput::from)
    }
}

/// Render a command line for progress output and logs.
#[must_use]
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a list of string-like values into owned arguments.
pub(crate) fn args<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}
