//! Removal of partial outputs after a failed step.
//!
//! The original error always wins; a removal that fails is logged so the
//! leftover can be found.

use camino::Utf8Path;
use log::warn;
use std::fs;
use std::io;

/// Remove a partially written file. Returns `true` when nothing is left at
/// `path`.
pub(crate) fn remove_partial_file(path: &Utf8Path) -> bool {
    report(path, fs::remove_file(path))
}

/// Remove a partially built directory tree. Returns `true` when nothing is
/// left at `path`.
pub(crate) fn remove_partial_dir(path: &Utf8Path) -> bool {
    report(path, fs::remove_dir_all(path))
}

fn report(path: &Utf8Path, result: io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!("could not remove partial output {path}: {err}");
            false
        }
    }
}
