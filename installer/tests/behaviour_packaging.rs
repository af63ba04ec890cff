//! Behaviour-driven tests for the packaging pipeline.
//!
//! Every scenario runs against a simulated macOS host: interpreter, `pip`,
//! `pkgbuild` and `productbuild` are answered by `ScriptedRunner`, so the
//! real pipeline code paths run on any Unix machine.

use camino::Utf8PathBuf;
use pkgsmith::arch::Architecture;
use pkgsmith::assembler::RuntimeEnvironment;
use pkgsmith::command::ToolOutput;
use pkgsmith::config::{ExistingArtifactPolicy, PackagingConfig};
use pkgsmith::error::PipelineError;
use pkgsmith::finalizer::verify_digest_file;
use pkgsmith::package::MacosPackagingTools;
use pkgsmith::pipeline::{
    BuildReport, ENVIRONMENT_DIR, PipelineContext, STAGING_DIR, run_build,
};
use pkgsmith::prune::DenyList;
use pkgsmith::request::BuildRequest;
use pkgsmith::stager::Stager;
use pkgsmith::test_utils::{ScriptedRunner, tree_fingerprint, utf8, write_fake_environment};
use pkgsmith::version::{VersionSource, VersionSourceError};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Packaging world
// ---------------------------------------------------------------------------

/// A release index that always reports one version and counts lookups.
struct ReleaseIndex {
    version: String,
    lookups: AtomicUsize,
}

impl VersionSource for ReleaseIndex {
    fn published_version(&self, _package: &str) -> Result<String, VersionSourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.version.clone())
    }
}

struct PackagingWorld {
    root: Utf8PathBuf,
    config: PackagingConfig,
    index: RefCell<Option<ReleaseIndex>>,
    runner: RefCell<Option<ScriptedRunner>>,
    outcome: RefCell<Option<Result<BuildReport, PipelineError>>>,
    environment: RefCell<Option<RuntimeEnvironment>>,
    fingerprints: RefCell<Vec<Vec<(String, String)>>>,
    // Keep the temporary directory alive for the lifetime of the scenario.
    _temp_dir: TempDir,
}

impl PackagingWorld {
    fn work_dir(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("dist")
    }

    fn installer(&self, arch: Architecture) -> Utf8PathBuf {
        self.output_dir()
            .join(format!("sample-cli-9.9.9-{}.pkg", arch.platform_tag()))
    }

    fn arch_dir(&self, arch: Architecture) -> Utf8PathBuf {
        self.work_dir().join(arch.as_str())
    }

    fn report(&self) -> std::cell::Ref<'_, BuildReport> {
        std::cell::Ref::map(self.outcome.borrow(), |outcome| {
            match outcome.as_ref().expect("build not run") {
                Ok(report) => report,
                Err(err) => panic!("build was rejected: {err}"),
            }
        })
    }
}

#[fixture]
fn packaging_world() -> PackagingWorld {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut config = PackagingConfig::default();
    config.application.name = "sample-cli".to_owned();
    config.application.display_name = "Sample CLI".to_owned();
    config.application.executable = "sample".to_owned();
    config.application.entry_module = "sample_cli".to_owned();
    config.layout.install_root = Utf8PathBuf::from("/fixed");
    PackagingWorld {
        root: utf8(temp_dir.path()),
        config,
        index: RefCell::new(None),
        runner: RefCell::new(None),
        outcome: RefCell::new(None),
        environment: RefCell::new(None),
        fingerprints: RefCell::new(Vec::new()),
        _temp_dir: temp_dir,
    }
}

fn build(packaging_world: &PackagingWorld, selectors: &[&str], manifest: bool) {
    let index = packaging_world.index.borrow();
    let index = index.as_ref().expect("release index not set");
    let selectors: Vec<String> = selectors.iter().map(|s| (*s).to_owned()).collect();
    let requests = match BuildRequest::resolve_all(
        &packaging_world.config.application.name,
        None,
        &selectors,
        &packaging_world.output_dir(),
        index,
    ) {
        Ok(requests) => requests,
        Err(err) => {
            packaging_world.outcome.replace(Some(Err(err)));
            return;
        }
    };

    let runner = packaging_world.runner.borrow();
    let runner = runner.as_ref().expect("build host not set");
    let tools = MacosPackagingTools::new(runner);
    let deny = DenyList::builtin();
    let work_dir = packaging_world.work_dir();
    let context = PipelineContext {
        config: &packaging_world.config,
        runner,
        tools: &tools,
        deny: &deny,
        work_dir: &work_dir,
        on_existing: ExistingArtifactPolicy::Fail,
        force: false,
        quiet: true,
    };
    let mut stderr = Vec::new();
    let outcome = run_build(&context, &requests, manifest, &mut stderr);
    packaging_world.outcome.replace(Some(outcome));
}

// ---------------------------------------------------------------------------
// Given
// ---------------------------------------------------------------------------

#[given("a sample application whose latest release is 9.9.9")]
fn given_sample_application(packaging_world: &PackagingWorld) {
    packaging_world.index.replace(Some(ReleaseIndex {
        version: "9.9.9".to_owned(),
        lookups: AtomicUsize::new(0),
    }));
}

#[given("a simulated macOS build host")]
fn given_simulated_host(packaging_world: &PackagingWorld) {
    packaging_world
        .runner
        .replace(Some(ScriptedRunner::simulated_host()));
}

#[given("a build host whose package index rejects the application")]
fn given_rejecting_index(packaging_world: &PackagingWorld) {
    packaging_world
        .runner
        .replace(Some(ScriptedRunner::simulated_host_failing(
            |_, args| args.iter().any(|a| a == "sample-cli==9.9.9"),
            ToolOutput::failure(
                1,
                "ERROR: No matching distribution found for sample-cli==9.9.9",
            ),
        )));
}

#[given("a build host where only x86_64 dependency installation fails")]
fn given_intel_only_failure(packaging_world: &PackagingWorld) {
    packaging_world
        .runner
        .replace(Some(ScriptedRunner::simulated_host_failing(
            |program, args| program.contains("/x86_64/") && args.iter().any(|a| a == "pip"),
            ToolOutput::failure(1, "ERROR: network unreachable"),
        )));
}

#[given("a prepared runtime environment")]
fn given_prepared_environment(packaging_world: &PackagingWorld) {
    let env = write_fake_environment(&packaging_world.root.join("env"))
        .expect("failed to write environment");
    packaging_world.environment.replace(Some(env));
}

// ---------------------------------------------------------------------------
// When
// ---------------------------------------------------------------------------

#[when("the arm64 installer is built")]
fn when_arm64_built(packaging_world: &PackagingWorld) {
    build(packaging_world, &["arm64"], false);
}

#[when("installers are built for every architecture")]
fn when_all_built(packaging_world: &PackagingWorld) {
    build(packaging_world, &["arm64", "x86_64"], false);
}

#[when("installers are built for every architecture with a manifest")]
fn when_all_built_with_manifest(packaging_world: &PackagingWorld) {
    build(packaging_world, &["arm64", "x86_64"], true);
}

#[when("a build is requested for an unknown architecture")]
fn when_unknown_architecture(packaging_world: &PackagingWorld) {
    build(packaging_world, &["ppc"], false);
}

#[when("the environment is staged twice")]
fn when_staged_twice(packaging_world: &PackagingWorld) {
    let env = packaging_world.environment.borrow();
    let env = env.as_ref().expect("environment not set");
    let stager = Stager::new(&packaging_world.config, DenyList::builtin());
    for name in ["first", "second"] {
        let (staging, _) = stager
            .stage(env, &packaging_world.root.join(name))
            .expect("staging succeeds");
        let fingerprint = tree_fingerprint(&staging.root).expect("fingerprint");
        packaging_world.fingerprints.borrow_mut().push(fingerprint);
    }
}

// ---------------------------------------------------------------------------
// Then
// ---------------------------------------------------------------------------

#[then("the output directory holds the arm64 installer for 9.9.9")]
fn then_installer_present(packaging_world: &PackagingWorld) {
    let report = packaging_world.report();
    assert_eq!(report.failures(), 0, "{:?}", report.outcomes);
    let installer = packaging_world.installer(Architecture::Arm64);
    assert!(installer.is_file(), "missing {installer}");
    assert!(Utf8PathBuf::from(format!("{installer}.sha256")).is_file());
}

#[then("the installer digest verifies")]
fn then_digest_verifies(packaging_world: &PackagingWorld) {
    verify_digest_file(&packaging_world.installer(Architecture::Arm64))
        .expect("digest should verify");
}

#[then("the staged launcher runs the interpreter under the install root")]
fn then_launcher_targets_install_root(packaging_world: &PackagingWorld) {
    let launcher = packaging_world
        .arch_dir(Architecture::Arm64)
        .join(STAGING_DIR)
        .join("pkg_root")
        .join("bin")
        .join("sample");
    let script = std::fs::read_to_string(&launcher).expect("launcher should exist");
    assert!(
        script.contains("/fixed/microsoft/sample-cli/bin/python3"),
        "unexpected launcher: {script}"
    );
    assert!(script.contains("-m 'sample_cli'"));
}

#[then("the build fails with a dependency installation error")]
fn then_dependency_error(packaging_world: &PackagingWorld) {
    let report = packaging_world.report();
    let outcome = report.outcomes.first().expect("one outcome");
    match &outcome.result {
        Err(PipelineError::DependencyInstall { diagnostic, .. }) => {
            assert!(diagnostic.contains("No matching distribution"));
        }
        other => panic!("expected DependencyInstall, got {other:?}"),
    }
}

#[then("no environment, staging root or installer remains")]
fn then_nothing_remains(packaging_world: &PackagingWorld) {
    let arch_dir = packaging_world.arch_dir(Architecture::Arm64);
    assert!(!arch_dir.join(ENVIRONMENT_DIR).exists());
    assert!(!arch_dir.join(STAGING_DIR).join("pkg_root").exists());
    assert!(!packaging_world.installer(Architecture::Arm64).exists());
}

#[then("each installer has a distinct name")]
fn then_distinct_names(packaging_world: &PackagingWorld) {
    let report = packaging_world.report();
    let names: BTreeSet<String> = report
        .outcomes
        .iter()
        .map(|o| {
            let run = o.result.as_ref().expect("architecture run succeeds");
            run.artifact.file_name().to_owned()
        })
        .collect();
    assert_eq!(names.len(), Architecture::ALL.len(), "{names:?}");
}

#[then("each distribution definition names its own host architecture")]
fn then_distinct_host_architectures(packaging_world: &PackagingWorld) {
    for arch in Architecture::ALL {
        let path = packaging_world
            .arch_dir(arch)
            .join(STAGING_DIR)
            .join("distribution.xml");
        let xml = std::fs::read_to_string(&path).expect("distribution definition");
        assert!(xml.contains(&format!("hostArchitectures=\"{}\"", arch.as_str())));
    }
}

#[then("both staging roots have identical content")]
fn then_identical_staging(packaging_world: &PackagingWorld) {
    let fingerprints = packaging_world.fingerprints.borrow();
    assert_eq!(fingerprints.len(), 2);
    assert!(!fingerprints[0].is_empty());
    assert_eq!(fingerprints[0], fingerprints[1]);
}

#[then("the request fails with an invalid architecture error")]
fn then_invalid_architecture(packaging_world: &PackagingWorld) {
    let outcome = packaging_world.outcome.borrow();
    assert!(matches!(
        outcome.as_ref().expect("build not run"),
        Err(PipelineError::InvalidArchitecture { value, .. }) if value == "ppc"
    ));
}

#[then("the version source was never consulted")]
fn then_version_not_consulted(packaging_world: &PackagingWorld) {
    let index = packaging_world.index.borrow();
    let index = index.as_ref().expect("release index not set");
    assert_eq!(index.lookups.load(Ordering::SeqCst), 0);
}

#[then("nothing was written to the work directory")]
fn then_nothing_written(packaging_world: &PackagingWorld) {
    assert!(!packaging_world.work_dir().exists());
    assert!(!packaging_world.output_dir().exists());
}

#[then("the arm64 installer exists")]
fn then_arm64_exists(packaging_world: &PackagingWorld) {
    assert!(packaging_world.installer(Architecture::Arm64).is_file());
}

#[then("no manifest is written")]
fn then_no_manifest(packaging_world: &PackagingWorld) {
    let report = packaging_world.report();
    assert_eq!(report.failures(), 1);
    assert!(report.manifest.is_none());
    assert!(
        !packaging_world
            .output_dir()
            .join("sample-cli-9.9.9-manifest.json")
            .exists()
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

// Bindings are index-based; do not reorder tests/features/packaging.feature.
#[scenario(path = "tests/features/packaging.feature", index = 0)]
fn scenario_build_arm64_installer(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 1)]
fn scenario_launcher_targets_install_root(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 2)]
fn scenario_dependency_failure_cleans_up(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 3)]
fn scenario_architectures_are_distinct(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 4)]
fn scenario_staging_is_idempotent(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 5)]
fn scenario_unknown_architecture_rejected(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}

#[scenario(path = "tests/features/packaging.feature", index = 6)]
fn scenario_failed_architecture_suppresses_manifest(packaging_world: PackagingWorld) {
    let _ = packaging_world;
}
