//! Collects every path an agent changed in a git working tree.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::error::AuditError;
use crate::fsutil::clean_path;
use crate::runner::executor::run_captured;
use crate::runner::result::{RUN_PROGRESS_FILE, RUN_START_FILE};

/// Files the harness writes into the workspace itself.
pub const BOOKKEEPING_FILES: [&str; 2] = [RUN_START_FILE, RUN_PROGRESS_FILE];

const QUERIES: [&[&str]; 3] = [
    &["diff", "--name-only", "--diff-filter=ACDMRTUXB"],
    &["diff", "--name-only", "--diff-filter=ACDMRTUXB", "--cached"],
    &["ls-files", "--others", "--exclude-standard"],
];

/// Unstaged, staged and untracked-but-not-ignored paths relative to HEAD,
/// cleaned and with bookkeeping files removed.
pub async fn audit_changes(workspace_dir: &Path) -> Result<BTreeSet<String>, AuditError> {
    let mut changes = BTreeSet::new();
    for query in QUERIES {
        let args: Vec<String> = ["-c", "core.quotepath=off"]
            .iter()
            .chain(query.iter())
            .map(|s| s.to_string())
            .collect();
        // Non-UTF-8 names are kept in lossy form so the rest of the change
        // set is still classified.
        let raw = run_captured(workspace_dir, "git", &args).await?;
        let stdout = String::from_utf8_lossy(&raw);
        changes.extend(
            stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(clean_path),
        );
    }
    changes.retain(|path| !BOOKKEEPING_FILES.contains(&path.as_str()));
    debug!(workspace = %workspace_dir.display(), changes = ?changes, "Audited workspace changes");
    Ok(changes)
}
