//! Path rules for `must-modify` / `no-modify`.
//!
//! A rule string is one of three things, decided when it is resolved against
//! the workspace:
//!
//! - a glob (contains `*`, `?` or `[`), matched per path segment
//! - a directory (ends with `/` or names a directory in the workspace),
//!   matching the directory itself and its direct children only
//! - an exact path

use std::collections::BTreeSet;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::fsutil::{clean_path, parent_dir};
use crate::scenario::targets::has_glob;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A rule string resolved against a workspace.
#[derive(Debug, Clone)]
pub enum PathRule {
    Exact(String),
    DirectChildrenOf(String),
    Glob(Pattern),
}

impl PathRule {
    /// Resolves `rule`, statting `workspace_dir` to recognise directory rules.
    /// Blank rules and invalid globs resolve to `None` and match nothing.
    pub fn resolve(rule: &str, workspace_dir: &Path) -> Option<Self> {
        if rule.trim().is_empty() {
            return None;
        }
        if has_glob(rule) {
            return match Pattern::new(&to_segment_glob(rule)) {
                Ok(pattern) => Some(Self::Glob(pattern)),
                Err(e) => {
                    warn!(rule, error = %e, "Invalid glob rule never matches");
                    None
                }
            };
        }
        let cleaned = clean_path(rule);
        if rule.ends_with('/') || workspace_dir.join(&cleaned).is_dir() {
            Some(Self::DirectChildrenOf(cleaned))
        } else {
            Some(Self::Exact(cleaned))
        }
    }

    /// Whether a repository-relative `path` falls under this rule.
    pub fn matches(&self, path: &str) -> bool {
        let path = clean_path(path);
        match self {
            Self::Exact(rule) => path == *rule,
            Self::DirectChildrenOf(dir) => path == *dir || parent_dir(&path) == *dir,
            Self::Glob(pattern) => pattern.matches_with(&path, GLOB_OPTIONS),
        }
    }
}

/// Single-shot form of [`PathRule::resolve`] + [`PathRule::matches`].
pub fn matches(path: &str, rule: &str, workspace_dir: &Path) -> bool {
    PathRule::resolve(rule, workspace_dir).is_some_and(|r| r.matches(path))
}

/// `**` has no recursive meaning here and negated classes use `^`.
fn to_segment_glob(rule: &str) -> String {
    let mut out = rule.to_string();
    while out.contains("**") {
        out = out.replace("**", "*");
    }
    out.replace("[^", "[!")
}

/// Checks `changes` against the rule sets, returning sorted violations.
///
/// Rules are resolved once per call against the current workspace state.
pub fn evaluate_rules(
    changes: &BTreeSet<String>,
    must_modify: &[String],
    no_modify: &[String],
    workspace_dir: &Path,
) -> Vec<String> {
    if changes.is_empty() {
        if must_modify.is_empty() {
            return Vec::new();
        }
        return vec!["workspace has no changes but must-modify requires modifications".to_string()];
    }

    let blocked: Vec<PathRule> = no_modify
        .iter()
        .filter_map(|rule| PathRule::resolve(rule, workspace_dir))
        .collect();

    let mut violations: Vec<String> = changes
        .iter()
        .filter(|path| blocked.iter().any(|rule| rule.matches(path)))
        .map(|path| format!("{path} is blocked by no-modify"))
        .collect();

    for raw in must_modify {
        let satisfied = PathRule::resolve(raw, workspace_dir)
            .is_some_and(|rule| changes.iter().any(|path| rule.matches(path)));
        if !satisfied {
            violations.push(format!("{raw} in must-modify was not modified"));
        }
    }

    violations.sort();
    debug!(changes = changes.len(), violations = violations.len(), "Evaluated modification rules");
    violations
}
