//! pkgsmith CLI entrypoint.
//!
//! Parses arguments, installs the log subscriber, and dispatches to the
//! build, manifest, and verify commands. All progress goes to stderr.

use camino::Utf8PathBuf;
use clap::Parser;
use pkgsmith::arch::Architecture;
use pkgsmith::cli::{BuildArgs, Cli, Command, ManifestArgs, VerifyArgs};
use pkgsmith::command::SystemCommandRunner;
use pkgsmith::config::PackagingConfig;
use pkgsmith::error::{PipelineError, Result};
use pkgsmith::finalizer::verify_digest_file;
use pkgsmith::manifest::collect_manifest;
use pkgsmith::output::{DryRunInfo, write_stderr_line};
use pkgsmith::package::MacosPackagingTools;
use pkgsmith::pipeline::{PipelineContext, run_build};
use pkgsmith::prune::DenyList;
use pkgsmith::request::BuildRequest;
use pkgsmith::version::{PypiVersionSource, SourceTreeVersionSource, Version, VersionSource};
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Install the `fmt` subscriber; `RUST_LOG` wins over `-v`/`-q`.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, stderr: &mut (dyn Write + Send)) -> Result<()> {
    match &cli.command {
        Command::Build(args) => run_build_command(args, cli.quiet, stderr),
        Command::Manifest(args) => run_manifest_command(args, cli.quiet, stderr),
        Command::Verify(args) => run_verify_command(args, cli.quiet, stderr),
    }
}

fn run_build_command(args: &BuildArgs, quiet: bool, stderr: &mut (dyn Write + Send)) -> Result<()> {
    let config = PackagingConfig::load(args.config.as_deref())?;
    let deny = DenyList::from_config(&config.prune)?;
    let source = version_source(&config);
    if args.version.is_none() && !quiet {
        write_stderr_line(
            stderr,
            format!("Resolving latest version of {}...", config.application.name),
        );
    }
    let requests = BuildRequest::resolve_all(
        &config.application.name,
        args.version.as_deref(),
        &args.architectures,
        &args.output_dir,
        source.as_ref(),
    )?;
    let on_existing = args.existing_artifact_policy(&config);

    if args.dry_run {
        let info = DryRunInfo {
            config: &config,
            requests: &requests,
            work_dir: args.work_dir.as_deref(),
            on_existing,
            manifest: args.manifest,
            deny: &deny,
        };
        write_stderr_line(stderr, info.display_text());
        return Ok(());
    }

    // Held until the build finishes; dropping it deletes the work tree.
    let mut scratch = None;
    let work_dir = match &args.work_dir {
        Some(dir) => dir.clone(),
        None => {
            let temp = tempfile::Builder::new().prefix("pkgsmith-").tempdir()?;
            let path = Utf8PathBuf::try_from(temp.path().to_path_buf())
                .map_err(|e| PipelineError::Io(e.into_io_error()))?;
            scratch = Some(temp);
            path
        }
    };

    let runner = SystemCommandRunner;
    let tools = MacosPackagingTools::new(&runner);
    let context = PipelineContext {
        config: &config,
        runner: &runner,
        tools: &tools,
        deny: &deny,
        work_dir: &work_dir,
        on_existing,
        force: args.force,
        quiet,
    };
    let report = run_build(&context, &requests, args.manifest, stderr)?;
    drop(scratch);
    report.into_result().map(|_| ())
}

fn run_manifest_command(
    args: &ManifestArgs,
    quiet: bool,
    stderr: &mut (dyn Write + Send),
) -> Result<()> {
    let config = PackagingConfig::load(args.config.as_deref())?;
    let version = Version::try_from(args.version.as_str())?;
    let architectures = Architecture::parse_selectors(&args.architectures)?;
    let manifest = collect_manifest(&config, &version, &architectures, &args.output_dir)?;
    let path = manifest.write_to(&args.output_dir)?;
    if !quiet {
        write_stderr_line(
            stderr,
            format!("Manifest for {} architecture(s): {path}", manifest.artifacts.len()),
        );
    }
    Ok(())
}

fn run_verify_command(args: &VerifyArgs, quiet: bool, stderr: &mut (dyn Write + Send)) -> Result<()> {
    let digest = verify_digest_file(&args.artifact)?;
    if !quiet {
        write_stderr_line(stderr, format!("{}: OK ({digest})", args.artifact));
    }
    Ok(())
}

fn version_source(config: &PackagingConfig) -> Box<dyn VersionSource> {
    match &config.environment.version_file {
        Some(path) => Box::new(SourceTreeVersionSource::new(path.clone())),
        None => Box::new(PypiVersionSource::new(config.environment.index_url.clone())),
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
