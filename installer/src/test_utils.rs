//! Shared test utilities for the packaging pipeline.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration tests under `tests/`.

use crate::assembler::RuntimeEnvironment;
use crate::command::{CommandRunner, ToolOutput};
use crate::digest::sha256_bytes;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use walkdir::WalkDir;

/// Version reported by simulated interpreters.
pub const SIMULATED_VERSION: &str = "9.9.9";

/// Machine reported by simulated interpreters run without `arch`.
pub const SIMULATED_HOST_MACHINE: &str = "arm64";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to execute (e.g., "pkgbuild").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<ToolOutput>,
}

impl ExpectedCall {
    /// Create an expectation from borrowed arguments.
    #[must_use]
    pub fn new(program: &str, args: &[&str], result: io::Result<ToolOutput>) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            result,
        }
    }
}

/// A stub [`CommandRunner`] that replays an exact sequence of calls.
///
/// Each invocation is compared against the next [`ExpectedCall`]; a mismatch
/// fails the test immediately.
#[derive(Debug)]
pub struct StubRunner {
    expected: Mutex<VecDeque<ExpectedCall>>,
}

impl StubRunner {
    /// Creates a new `StubRunner` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = lock(&self.expected);
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} left",
            remaining.len()
        );
    }
}

impl CommandRunner for StubRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<ToolOutput> {
        let Some(call) = lock(&self.expected).pop_front() else {
            return Err(io::Error::other(format!(
                "unexpected command invocation: {program} {}",
                args.join(" ")
            )));
        };
        assert_eq!(call.program, program);
        assert_eq!(call.args.as_slice(), args);
        call.result
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Program name or path.
    pub program: String,
    /// Arguments passed.
    pub args: Vec<String>,
}

impl RecordedCall {
    /// Returns `true` when the arguments contain `needle` as a whole argument.
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

type Script = dyn Fn(&str, &[String]) -> io::Result<ToolOutput> + Send + Sync;

/// A [`CommandRunner`] driven by a closure, recording every call.
pub struct ScriptedRunner {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &*lock(&self.calls))
            .finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    /// Create a runner answering every call with `script`.
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &[String]) -> io::Result<ToolOutput> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulate a macOS build host: interpreter, `pip`, and packaging tools.
    #[must_use]
    pub fn simulated_host() -> Self {
        Self::new(simulate_host_tool)
    }

    /// Simulate a build host where `fails` picks calls that exit with an error.
    ///
    /// `fails` sees the command as run under `arch`, without the wrapper.
    pub fn simulated_host_failing<P>(fails: P, failure: ToolOutput) -> Self
    where
        P: Fn(&str, &[String]) -> bool + Send + Sync + 'static,
    {
        Self::new(move |program, args| {
            let (_, inner, inner_args) = unwrap_arch(program, args);
            if fails(inner, inner_args) {
                Ok(failure.clone())
            } else {
                simulate_host_tool(program, args)
            }
        })
    }

    /// Return a snapshot of recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Return the recorded calls with any `arch -<flag>` wrapper removed.
    #[must_use]
    pub fn unwrapped_calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .map(|c| {
                let (_, program, args) = unwrap_arch(&c.program, &c.args);
                RecordedCall {
                    program: program.to_owned(),
                    args: args.to_vec(),
                }
            })
            .collect()
    }

    /// Return the recorded calls to `program`.
    #[must_use]
    pub fn calls_to(&self, program: &str) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<ToolOutput> {
        lock(&self.calls).push(RecordedCall {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        (self.script)(program, args)
    }
}

/// Answer one command the way a macOS build host would, touching only the
/// paths named in its arguments.
///
/// # Errors
///
/// Returns `NotFound` for programs the simulation does not know, and any
/// I/O error from writing simulated outputs.
pub fn simulate_host_tool(program: &str, args: &[String]) -> io::Result<ToolOutput> {
    let (machine, program, args) = unwrap_arch(program, args);
    let arg = |i: usize| args.get(i).map(String::as_str);
    match (program, arg(0), arg(1)) {
        (_, Some("-c"), Some(code)) if code.contains("platform.machine()") => {
            Ok(ToolOutput::success(format!("{machine}\n")))
        }
        ("which", Some(tool), _) => Ok(ToolOutput::success(format!("/usr/bin/{tool}\n"))),
        ("pkgbuild" | "productbuild", ..) => {
            let out = args
                .last()
                .ok_or_else(|| io::Error::other("no output path"))?;
            let body = format!("xar!{program}\n{}\n", args.join("\n"));
            fs::write(out, body)?;
            Ok(ToolOutput::success(""))
        }
        (_, Some("-m"), Some("venv")) => {
            let root = args
                .last()
                .ok_or_else(|| io::Error::other("no environment path"))?;
            write_fake_environment(Utf8Path::new(root))?;
            Ok(ToolOutput::success(""))
        }
        (_, Some("-m"), Some("pip")) => {
            let site = environment_of(program).map(|env| site_packages(&env));
            if let Some(site) = site.filter(|s| s.is_dir()) {
                for requirement in args.iter().skip(3).filter(|a| !a.starts_with('-')) {
                    let name = requirement_dir_name(requirement);
                    fs::create_dir_all(site.join(&name))?;
                    fs::write(site.join(&name).join("__init__.py"), "")?;
                }
            }
            Ok(ToolOutput::success("Successfully installed\n"))
        }
        (_, Some("-m"), Some(_)) if arg(2) == Some("--version") => {
            Ok(ToolOutput::success(format!("{SIMULATED_VERSION}\n")))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("simulated host has no {program}"),
        )),
    }
}

/// Split `arch -<machine> <program> <args…>` into its parts. Commands run
/// without the wrapper report [`SIMULATED_HOST_MACHINE`].
fn unwrap_arch<'a>(program: &'a str, args: &'a [String]) -> (&'a str, &'a str, &'a [String]) {
    match (program, args) {
        ("arch", [flag, inner, rest @ ..]) if flag.starts_with('-') => {
            (flag.trim_start_matches('-'), inner.as_str(), rest)
        }
        _ => (SIMULATED_HOST_MACHINE, program, args),
    }
}

fn environment_of(interpreter: &str) -> Option<Utf8PathBuf> {
    Utf8Path::new(interpreter)
        .parent()
        .and_then(Utf8Path::parent)
        .map(Utf8Path::to_path_buf)
}

fn site_packages(env: &Utf8Path) -> Utf8PathBuf {
    env.join("lib").join("python3.12").join("site-packages")
}

fn requirement_dir_name(requirement: &str) -> String {
    let base = Utf8Path::new(requirement)
        .file_name()
        .unwrap_or(requirement);
    base.split(['=', '<', '>', '['])
        .next()
        .unwrap_or(base)
        .replace('-', "_")
}

/// Populate `root` with a small virtual-environment-shaped tree, including
/// bytecode caches the deny list should prune.
///
/// # Errors
///
/// Returns any I/O error from creating the tree.
pub fn write_fake_environment(root: &Utf8Path) -> io::Result<RuntimeEnvironment> {
    let site = site_packages(root);
    let package = site.join("sample_cli");
    fs::create_dir_all(root.join("bin"))?;
    fs::create_dir_all(package.join("__pycache__"))?;
    fs::write(root.join("pyvenv.cfg"), "home = /usr/bin\ninclude-system-site-packages = false\n")?;
    fs::write(package.join("__init__.py"), "__version__ = \"9.9.9\"\n")?;
    fs::write(package.join("__main__.py"), "print('sample')\n")?;
    fs::write(package.join("__pycache__").join("__init__.cpython-312.pyc"), [0u8; 16])?;
    fs::write(site.join("stray.pyo"), [1u8; 8])?;
    fs::write(site.join(".DS_Store"), [2u8; 4])?;
    let interpreter = root.join("bin").join("python3");
    fs::write(&interpreter, "#!/bin/sh\nexit 0\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&interpreter, fs::Permissions::from_mode(0o755))?;
    }
    Ok(RuntimeEnvironment::at(root.to_path_buf()))
}

/// Return `(relative path, sha256)` for every regular file under `root`, in
/// name order. Directories appear with an empty digest.
///
/// # Errors
///
/// Returns any error from walking or reading the tree.
pub fn tree_fingerprint(root: &Utf8Path) -> io::Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .into_owned();
        let digest = if entry.file_type().is_file() {
            sha256_bytes(&fs::read(entry.path())?).to_string()
        } else {
            String::new()
        };
        entries.push((relative, digest));
    }
    Ok(entries)
}

/// Convert a temporary directory path into a UTF-8 path.
///
/// # Panics
///
/// Panics if the path is not valid UTF-8.
#[must_use]
pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap_or_else(|p| {
        panic!("non UTF-8 temp path: {}", p.display());
    })
}
