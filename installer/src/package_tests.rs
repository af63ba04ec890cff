//! Tests for two-stage package building.

use super::*;
use crate::arch::Architecture;
use crate::test_utils::{ExpectedCall, ScriptedRunner, StubRunner, utf8};
use crate::version::Version;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Workspace {
    _temp: TempDir,
    staging_dir: Utf8PathBuf,
    staging: StagingRoot,
    request: BuildRequest,
}

#[fixture]
fn workspace() -> Workspace {
    let temp = TempDir::new().expect("temp dir");
    let base = utf8(temp.path());
    let staging_dir = base.join("arm64").join("staging");
    let root = staging_dir.join("pkg_root");
    fs::create_dir_all(root.join("bin")).expect("mkdir");
    let staging = StagingRoot {
        runtime_dir: root.join("microsoft").join("sample-cli"),
        launcher_path: root.join("bin").join("sample"),
        root,
    };
    let request = BuildRequest {
        application: "sample-cli".to_owned(),
        version: Version::try_from("9.9.9").expect("valid"),
        architecture: Architecture::Arm64,
        output_dir: base.join("dist"),
    };
    Workspace {
        _temp: temp,
        staging_dir,
        staging,
        request,
    }
}

#[test]
fn component_args_follow_tool_convention() {
    let build = ComponentBuild {
        root: Utf8Path::new("/s/pkg_root"),
        identifier: "com.example.app",
        version: "1.0",
        install_location: Utf8Path::new("/usr/local"),
        signing_identity: Some("Developer ID Installer: Example"),
        output: Utf8Path::new("/s/app-component.pkg"),
    };
    assert_eq!(
        build.to_args(),
        [
            "--root",
            "/s/pkg_root",
            "--identifier",
            "com.example.app",
            "--version",
            "1.0",
            "--install-location",
            "/usr/local",
            "--sign",
            "Developer ID Installer: Example",
            "/s/app-component.pkg",
        ]
    );
}

#[test]
fn distribution_args_omit_unset_options() {
    let build = DistributionBuild {
        distribution: Utf8Path::new("/s/distribution.xml"),
        package_path: Utf8Path::new("/s"),
        resources: None,
        signing_identity: None,
        output: Utf8Path::new("/dist/app.pkg"),
    };
    assert_eq!(
        build.to_args(),
        [
            "--distribution",
            "/s/distribution.xml",
            "--package-path",
            "/s",
            "/dist/app.pkg"
        ]
    );
}

#[rstest]
fn builds_component_then_distribution(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = ScriptedRunner::simulated_host();
    let tools = MacosPackagingTools::new(&runner);

    let built = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect("packaging succeeds");

    assert_eq!(
        built.path,
        workspace
            .request
            .output_dir
            .join("sample-cli-9.9.9-macos-arm64.pkg")
    );
    assert!(built.path.is_file());
    assert_eq!(
        built.component_path,
        workspace
            .staging_dir
            .join("sample-cli-component-9.9.9-macos-arm64.pkg")
    );
    assert!(workspace.staging_dir.join("distribution.xml").is_file());

    let programs: Vec<String> = runner.calls().into_iter().map(|c| c.program).collect();
    assert_eq!(programs, ["which", "which", PKGBUILD, PRODUCTBUILD]);
    let pkgbuild = &runner.calls_to(PKGBUILD)[0];
    assert!(pkgbuild.has_arg("com.microsoft.azure-cli"));
    assert!(pkgbuild.has_arg("/usr/local"));
    assert!(!pkgbuild.has_arg("--sign"));
}

#[rstest]
fn missing_tool_reports_xcode_hint(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = StubRunner::new(vec![
        ExpectedCall::new("which", &["pkgbuild"], Ok(ToolOutput::success("/usr/bin/pkgbuild"))),
        ExpectedCall::new("which", &["productbuild"], Ok(ToolOutput::failure(1, ""))),
    ]);
    let tools = MacosPackagingTools::new(&runner);

    let err = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect_err("missing tool");

    runner.assert_finished();
    match err {
        PipelineError::PackagingTool { tool, diagnostic } => {
            assert_eq!(tool, PRODUCTBUILD);
            assert!(diagnostic.contains("xcode-select --install"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!workspace.request.output_dir.exists());
}

#[rstest]
fn tool_failure_surfaces_raw_diagnostic_without_retry(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = ScriptedRunner::simulated_host_failing(
        |program, _| program == PKGBUILD,
        ToolOutput::failure(1, "pkgbuild: error: Invalid root directory"),
    );
    let tools = MacosPackagingTools::new(&runner);

    let err = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect_err("pkgbuild fails");

    assert!(err.to_string().contains("Invalid root directory"));
    assert_eq!(runner.calls_to(PKGBUILD).len(), 1);
    assert!(runner.calls_to(PRODUCTBUILD).is_empty());
}

#[rstest]
fn success_without_output_is_an_error(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = ScriptedRunner::new(|_, _| Ok(ToolOutput::success("")));
    let tools = MacosPackagingTools::new(&runner);

    let err = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect_err("no output");

    assert!(matches!(
        err,
        PipelineError::PackagingTool { tool: PKGBUILD, ref diagnostic } if diagnostic.contains("was not created")
    ));
}

#[rstest]
fn distribution_failure_removes_partial_output(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = ScriptedRunner::new(|program, args| {
        let outcome = crate::test_utils::simulate_host_tool(program, args)?;
        if program == PRODUCTBUILD {
            Ok(ToolOutput::failure(1, "productbuild: signing failed"))
        } else {
            Ok(outcome)
        }
    });
    let tools = MacosPackagingTools::new(&runner);

    let err = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect_err("productbuild fails");

    assert!(matches!(err, PipelineError::PackagingTool { tool: PRODUCTBUILD, .. }));
    assert!(!workspace.request.artifact_path().exists());
}

#[rstest]
fn pre_existing_output_is_replaced(workspace: Workspace) {
    let config = PackagingConfig::default();
    let runner = ScriptedRunner::simulated_host();
    let tools = MacosPackagingTools::new(&runner);
    fs::create_dir_all(&workspace.request.output_dir).expect("mkdir");
    fs::write(workspace.request.artifact_path(), "stale").expect("write");

    let built = PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect("packaging succeeds");

    let contents = fs::read_to_string(built.path).expect("read");
    assert_ne!(contents, "stale");
}

#[rstest]
fn signing_identities_and_license_are_passed_through(workspace: Workspace) {
    let license = workspace.staging_dir.join("LICENSE");
    fs::write(&license, "MIT").expect("write license");
    let mut config = PackagingConfig::default();
    config.package.license = Some(license);
    config.package.component_signing_identity = Some("Component ID".to_owned());
    config.package.distribution_signing_identity = Some("Installer ID".to_owned());
    let runner = ScriptedRunner::simulated_host();
    let tools = MacosPackagingTools::new(&runner);

    PackageBuilder::new(&tools, &config)
        .build(&workspace.request, &workspace.staging, &workspace.staging_dir)
        .expect("packaging succeeds");

    assert!(runner.calls_to(PKGBUILD)[0].has_arg("Component ID"));
    let productbuild = &runner.calls_to(PRODUCTBUILD)[0];
    assert!(productbuild.has_arg("Installer ID"));
    assert!(productbuild.has_arg("--resources"));
    let copied = workspace.staging_dir.join("resources").join(LICENSE_FILE);
    assert_eq!(fs::read_to_string(copied).expect("license copied"), "MIT");
}
