//! Test target entries: `<target> [-run <pattern>]`.

use serde::Serialize;

use crate::error::ScenarioError;

/// A parsed `verify.tests` / `verify.partial-tests` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestTarget {
    /// Package path, `...` pattern, `_test.go` file or file glob.
    pub target: String,
    /// Optional `-run` pattern, quotes removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

impl TestTarget {
    /// Parses and validates one entry, returning the reason on failure.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("entry cannot be empty".into());
        }
        if raw.contains(['\r', '\n']) {
            return Err("entry cannot contain newlines".into());
        }

        let (target, run) = match find_run_flag(raw) {
            Some(0) => return Err("target must appear before -run".into()),
            Some(idx) => {
                if raw[idx + 1..].contains(" -run") {
                    return Err("only one -run flag is allowed".into());
                }
                (raw[..idx].trim(), Some(parse_run_pattern(raw[idx..].trim())?))
            }
            None => (raw, None),
        };

        validate_target(target, run.is_some())?;
        Ok(Self {
            target: target.to_string(),
            run,
        })
    }
}

/// Parses every entry of `field`, naming the first bad one in the error.
pub fn parse_targets(field: &'static str, entries: &[String]) -> Result<Vec<TestTarget>, ScenarioError> {
    entries
        .iter()
        .map(|entry| {
            TestTarget::parse(entry).map_err(|reason| ScenarioError::InvalidTestTarget {
                field,
                entry: entry.clone(),
                reason,
            })
        })
        .collect()
}

/// Byte offset of the first `-run` at the start or after whitespace.
fn find_run_flag(s: &str) -> Option<usize> {
    s.match_indices("-run").map(|(idx, _)| idx).find(|&idx| {
        idx == 0 || matches!(s.as_bytes()[idx - 1], b' ' | b'\t')
    })
}

fn parse_run_pattern(segment: &str) -> Result<String, String> {
    let rest = segment
        .strip_prefix("-run")
        .ok_or_else(|| format!("invalid -run segment {segment:?}"))?;
    let pattern = match rest.chars().next() {
        None => return Err("missing pattern after -run".into()),
        Some('=' | ' ' | '\t') => rest[1..].trim(),
        Some(_) => return Err("pattern must follow -run using space or '='".into()),
    };
    if pattern.is_empty() {
        return Err("missing pattern after -run".into());
    }
    strip_optional_quotes(pattern)
}

fn strip_optional_quotes(s: &str) -> Result<String, String> {
    if s.len() < 2 {
        return Ok(s.to_string());
    }
    let is_quote = |c: char| c == '"' || c == '\'';
    let (first, last) = match (s.chars().next(), s.chars().last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(s.to_string()),
    };
    if is_quote(first) && first == last {
        return Ok(s[1..s.len() - 1].to_string());
    }
    if is_quote(first) || is_quote(last) {
        return Err("mismatched quotes in -run pattern".into());
    }
    Ok(s.to_string())
}

pub(crate) fn has_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn validate_target(target: &str, has_run: bool) -> Result<(), String> {
    if target.is_empty() {
        return Err("target is required".into());
    }
    if target.contains([' ', '\t', '\r', '\n']) {
        return Err(format!("target {target:?} cannot contain whitespace"));
    }
    if target.starts_with('/') {
        return Err(format!("target {target:?} must be relative"));
    }
    if target.starts_with('-') {
        return Err(format!("target {target:?} cannot start with '-'"));
    }
    if target.ends_with('/') {
        return Err(format!("target {target:?} cannot end with '/'"));
    }
    if target.contains(['"', '\'']) {
        return Err(format!("target {target:?} must not include quotes"));
    }

    if has_glob(target) {
        if !target.ends_with("_test.go") {
            return Err(format!("glob target {target:?} must end with _test.go"));
        }
        if has_run {
            return Err(format!("glob target {target:?} cannot be combined with -run"));
        }
        return Ok(());
    }
    if target.ends_with(".go") {
        if !target.ends_with("_test.go") {
            return Err(format!("file target {target:?} must be a *_test.go file"));
        }
        return Ok(());
    }
    if target.contains("...") {
        if !target.ends_with("...") {
            return Err(format!("package pattern {target:?} must end with ..."));
        }
        if has_run {
            return Err(format!("package pattern {target:?} cannot be combined with -run"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(raw: &str) -> TestTarget {
        TestTarget::parse(raw).unwrap_or_else(|e| panic!("{raw:?}: {e}"))
    }

    #[test]
    fn test_parse_plain_targets() {
        assert_eq!(ok("./pkg").target, "./pkg");
        assert_eq!(ok("  internal/x/...  ").target, "internal/x/...");
        assert_eq!(ok("pkg/a_test.go").run, None);
        assert_eq!(ok("pkg/*_test.go").target, "pkg/*_test.go");
    }

    #[test]
    fn test_parse_run_pattern() {
        assert_eq!(ok("./pkg -run TestFoo").run.as_deref(), Some("TestFoo"));
        assert_eq!(ok("./pkg -run=TestFoo").run.as_deref(), Some("TestFoo"));
        assert_eq!(ok("./pkg -run 'Test Foo'").run.as_deref(), Some("Test Foo"));
        assert_eq!(ok("./pkg -run \"^TestA$\"").run.as_deref(), Some("^TestA$"));
        assert_eq!(ok("./pkg-runner").target, "./pkg-runner");
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        let cases = [
            ("", "entry cannot be empty"),
            ("-run TestX", "target must appear before -run"),
            ("./pkg -run A -run B", "only one -run flag is allowed"),
            ("./pkg -run", "missing pattern after -run"),
            ("./pkg -runX", "pattern must follow -run using space or '='"),
            ("./pkg -run 'A", "mismatched quotes in -run pattern"),
            ("/abs/pkg", "must be relative"),
            ("pkg/", "cannot end with '/'"),
            ("pkg/*.go", "must end with _test.go"),
            ("pkg/*_test.go -run A", "cannot be combined with -run"),
            ("pkg/main.go", "must be a *_test.go file"),
            ("pkg/.../x", "must end with ..."),
            ("pkg/... -run A", "cannot be combined with -run"),
            ("a b", "cannot contain whitespace"),
        ];
        for (raw, want) in cases {
            let err = TestTarget::parse(raw).unwrap_err();
            assert!(err.contains(want), "{raw:?}: got {err:?}, want {want:?}");
        }
    }

    #[test]
    fn test_parse_targets_names_field() {
        let entries = vec!["./ok".to_string(), "bad/".to_string()];
        let err = parse_targets("verify.tests", &entries).unwrap_err();
        assert!(err.to_string().starts_with("verify.tests entry 'bad/'"));
    }
}
