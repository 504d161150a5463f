//! Prepares a fresh scenario workspace: clone, checkout, setup copies.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{ProcessError, SetupError};
use crate::fsutil::{copy_destination_dir, copy_into_dir, safe_join};
use crate::output::ConsoleSink;
use crate::runner::cancel::CancelToken;
use crate::runner::executor::{describe_exit, run_streaming};
use crate::scenario::{normalize_repo_url, CopyStep, Scenario};
use crate::workspace::BenchConfig;

/// Recreates `<workspace>/<scenario>` at the pinned commit and applies the
/// scenario's setup copies. Any existing workspace for the scenario is removed
/// first.
pub async fn run_setup(
    config: &BenchConfig,
    scenario_name: &str,
    scenario: &Scenario,
    sink: &dyn ConsoleSink,
    cancel: &CancelToken,
) -> Result<(), SetupError> {
    let scenario_dir = config.scenario_dir(scenario_name);
    scenario.validate(&scenario_dir, config).await?;

    let target = config.workspace_dir(scenario_name);
    if target.exists() {
        fs::remove_dir_all(&target).map_err(|source| SetupError::Io {
            path: target.clone(),
            source,
        })?;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| SetupError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let url = normalize_repo_url(&scenario.repo);
    info!(scenario = scenario_name, repo = %url, commit = %scenario.commit, "Setting up workspace");
    sink.app(&format!("Setting up {scenario_name} in {}", target.display()));

    let clone_args = vec![
        "clone".to_string(),
        url,
        target.to_string_lossy().into_owned(),
    ];
    git(&config.root, &clone_args, "clone", sink, cancel).await?;
    let checkout_args = vec!["checkout".to_string(), scenario.commit.clone()];
    git(&target, &checkout_args, "checkout", sink, cancel).await?;

    for step in scenario.setup_copies() {
        copy_setup_step(step, &scenario_dir, &target)?;
    }

    info!(scenario = scenario_name, "Workspace ready");
    Ok(())
}

async fn git(
    dir: &Path,
    args: &[String],
    step: &'static str,
    sink: &dyn ConsoleSink,
    cancel: &CancelToken,
) -> Result<(), SetupError> {
    let out = run_streaming(dir, "git", args, sink, cancel, None)
        .await
        .map_err(|source: ProcessError| SetupError::Git { step, source })?;
    if !out.success() {
        return Err(SetupError::GitStatus {
            step,
            status: describe_exit(&out.status),
        });
    }
    Ok(())
}

/// A directory source lands under `to/<basename>`; a file source uses the
/// shared destination rule. Setup files become part of the starting point,
/// so the copy is kept and its backups are deleted.
fn copy_setup_step(step: &CopyStep, scenario_dir: &Path, target: &Path) -> Result<(), SetupError> {
    let src = scenario_dir.join(&step.from);
    let meta = fs::metadata(&src).map_err(|source| SetupError::Io {
        path: src.clone(),
        source,
    })?;
    let dst = if meta.is_dir() {
        let base = safe_join(target, &step.to)?;
        match src.file_name() {
            Some(name) => base.join(name),
            None => base,
        }
    } else {
        safe_join(target, &copy_destination_dir(&step.to).to_string_lossy())?
    };
    copy_into_dir(&src, &dst, true)?.keep();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_setup_copy_places_directory_under_basename() {
        let scenario = TempDir::new().unwrap();
        fs::create_dir_all(scenario.path().join("fixtures/data")).unwrap();
        fs::write(scenario.path().join("fixtures/data/a.json"), "{}").unwrap();
        fs::write(scenario.path().join("notes.md"), "notes").unwrap();
        let target = TempDir::new().unwrap();

        let step_dir = CopyStep {
            from: "fixtures/data".to_string(),
            to: "testdata/".to_string(),
        };
        let step_file = CopyStep {
            from: "notes.md".to_string(),
            to: "docs/NOTES.md".to_string(),
        };
        copy_setup_step(&step_dir, scenario.path(), target.path()).unwrap();
        copy_setup_step(&step_file, scenario.path(), target.path()).unwrap();

        assert!(target.path().join("testdata/data/a.json").is_file());
        assert!(target.path().join("docs/notes.md").is_file());
    }

    #[test]
    fn test_setup_copy_overwrite_leaves_no_backup() {
        let scenario = TempDir::new().unwrap();
        fs::write(scenario.path().join("a.go"), "patched").unwrap();
        let target = TempDir::new().unwrap();
        fs::create_dir_all(target.path().join("pkg")).unwrap();
        fs::write(target.path().join("pkg/a.go"), "original").unwrap();

        let step = CopyStep {
            from: "a.go".to_string(),
            to: "pkg/".to_string(),
        };
        copy_setup_step(&step, scenario.path(), target.path()).unwrap();

        assert_eq!(fs::read_to_string(target.path().join("pkg/a.go")).unwrap(), "patched");
        let names: Vec<String> = fs::read_dir(target.path().join("pkg"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.go"]);
    }
}
