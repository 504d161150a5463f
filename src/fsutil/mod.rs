//! Filesystem primitives: lexical path handling and transactional copies.

pub mod copy;
pub mod path;

pub use copy::{copy_into_dir, Reversal, RevertOnDrop};
pub use path::{clean, clean_path, parent_dir, safe_join};

use std::path::PathBuf;

/// Resolves the directory a copy step with destination `to` lands in.
///
/// `to` names a directory when it ends with `/` or its last element has no
/// extension; otherwise it names a file and its parent directory is used.
/// A dotfile such as `.env` counts as having an extension.
pub fn copy_destination_dir(to: &str) -> PathBuf {
    let trimmed = to.trim();
    let cleaned = clean_path(trimmed);
    if trimmed.ends_with('/') || !has_extension(&cleaned) {
        return PathBuf::from(cleaned);
    }
    PathBuf::from(parent_dir(&cleaned))
}

/// Whether the last element of `path` contains a `.`.
fn has_extension(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|name| name.contains('.'))
}
