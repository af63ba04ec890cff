//! Tests for staging and pruning.

use super::*;
use crate::config::PruneConfig;
use crate::test_utils::{tree_fingerprint, utf8, write_fake_environment};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    env: RuntimeEnvironment,
    staging_dir: Utf8PathBuf,
    config: PackagingConfig,
}

#[fixture]
fn staged_env() -> Fixture {
    let temp = TempDir::new().expect("temp dir");
    let base = utf8(temp.path());
    let env = write_fake_environment(&base.join("bundle-venv")).expect("fake env");
    Fixture {
        env,
        staging_dir: base.join("staging"),
        config: PackagingConfig::default(),
        _temp: temp,
    }
}

#[rstest]
fn layout_mirrors_installed_paths(staged_env: Fixture) {
    let stager = Stager::new(&staged_env.config, DenyList::builtin());
    let layout = stager.layout(Utf8Path::new("/work/arm64/staging"));
    assert_eq!(layout.root, Utf8PathBuf::from("/work/arm64/staging/pkg_root"));
    assert_eq!(
        layout.runtime_dir,
        Utf8PathBuf::from("/work/arm64/staging/pkg_root/microsoft/azure-cli")
    );
    assert_eq!(
        layout.launcher_path,
        Utf8PathBuf::from("/work/arm64/staging/pkg_root/bin/az")
    );
}

#[rstest]
fn stage_copies_runtime_and_prunes_denied_entries(staged_env: Fixture) {
    let stager = Stager::new(&staged_env.config, DenyList::builtin());
    let (root, report) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("staging succeeds");

    let site = root.runtime_dir.join("lib/python3.12/site-packages");
    assert!(root.runtime_dir.join("bin/python3").is_file());
    assert!(root.runtime_dir.join("pyvenv.cfg").is_file());
    assert!(site.join("sample_cli/__init__.py").is_file());
    assert!(!site.join("sample_cli/__pycache__").exists());
    assert!(!site.join("stray.pyo").exists());
    assert!(!site.join(".DS_Store").exists());
    assert_eq!(report.pruned, 3);
    assert!(report.staged_bytes < report.source_bytes);
    assert_eq!(report.files, 4);
}

#[rstest]
fn staging_twice_is_byte_identical(staged_env: Fixture) {
    let stager = Stager::new(&staged_env.config, DenyList::builtin());

    let (first_root, _) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("first staging");
    let first = tree_fingerprint(&first_root.root).expect("fingerprint");

    let (second_root, _) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("second staging");
    let second = tree_fingerprint(&second_root.root).expect("fingerprint");

    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[rstest]
fn previous_staging_content_is_removed(staged_env: Fixture) {
    let stager = Stager::new(&staged_env.config, DenyList::builtin());
    let leftover = stager.layout(&staged_env.staging_dir).root.join("leftover.txt");
    fs::create_dir_all(leftover.parent().expect("parent")).expect("mkdir");
    fs::write(&leftover, "old").expect("write");

    stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("staging succeeds");

    assert!(!leftover.exists());
}

#[rstest]
fn configured_patterns_are_pruned(staged_env: Fixture) {
    let deny = DenyList::from_config(&PruneConfig {
        directories: Vec::new(),
        files: vec!["__main__.py".to_owned()],
    })
    .expect("deny list");
    let stager = Stager::new(&staged_env.config, deny);

    let (root, _) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("staging succeeds");

    let package = root.runtime_dir.join("lib/python3.12/site-packages/sample_cli");
    assert!(package.join("__init__.py").exists());
    assert!(!package.join("__main__.py").exists());
}

#[rstest]
fn missing_environment_fails_and_leaves_no_root(staged_env: Fixture) {
    let stager = Stager::new(&staged_env.config, DenyList::builtin());
    let missing = RuntimeEnvironment::at(staged_env.staging_dir.join("absent"));

    let err = stager
        .stage(&missing, &staged_env.staging_dir)
        .expect_err("staging should fail");

    assert!(matches!(err, PipelineError::StagingCopy { .. }));
    assert!(!stager.layout(&staged_env.staging_dir).root.exists());
}

#[cfg(unix)]
#[rstest]
fn sizing_failure_after_copy_leaves_no_root(staged_env: Fixture) {
    // The pruned cache is never copied, but sizing walks the whole source.
    let cache = staged_env
        .env
        .root
        .join("lib/python3.12/site-packages/sample_cli/__pycache__");
    std::os::unix::fs::symlink("/nonexistent/target", cache.join("dangling.pyc"))
        .expect("symlink");
    let stager = Stager::new(&staged_env.config, DenyList::builtin());

    let err = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect_err("sizing should fail");

    assert!(
        matches!(err, PipelineError::StagingCopy { ref reason } if reason.contains("cannot size")),
        "unexpected error: {err}"
    );
    assert!(!stager.layout(&staged_env.staging_dir).root.exists());
}

#[cfg(unix)]
#[rstest]
fn symlinks_are_copied_as_contents(staged_env: Fixture) {
    let link = staged_env.env.root.join("bin/python");
    std::os::unix::fs::symlink(&staged_env.env.interpreter, &link).expect("symlink");
    let stager = Stager::new(&staged_env.config, DenyList::builtin());

    let (root, _) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("staging succeeds");

    let staged = root.runtime_dir.join("bin/python");
    let meta = fs::symlink_metadata(&staged).expect("metadata");
    assert!(meta.file_type().is_file());
}

#[cfg(unix)]
#[rstest]
fn executable_mode_is_preserved(staged_env: Fixture) {
    use std::os::unix::fs::PermissionsExt;
    let stager = Stager::new(&staged_env.config, DenyList::builtin());

    let (root, _) = stager
        .stage(&staged_env.env, &staged_env.staging_dir)
        .expect("staging succeeds");

    let mode = fs::metadata(root.runtime_dir.join("bin/python3"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[rstest]
#[case::bytes(512, "512 B")]
#[case::kib(2048, "2.0 KiB")]
#[case::mib(5 * 1024 * 1024, "5.0 MiB")]
fn human_size_formats(#[case] bytes: u64, #[case] expected: &str) {
    assert_eq!(human_size(bytes), expected);
}
