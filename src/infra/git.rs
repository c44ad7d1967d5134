use crate::domain::log_format;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Refs under this glob hold checkpoint storage and never show up as history.
pub const CHECKPOINT_REFS_GLOB: &str = "refs/heads/entire/*";
const CHECKPOINT_BRANCH_PREFIX: &str = "entire/";

#[derive(Debug, Error)]
pub enum RunGitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] io::Error),

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

pub fn run_git(repo: &Path, args: &[&str]) -> Result<String, RunGitError> {
    tracing::debug!(repo = %repo.display(), ?args, "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(RunGitError::Failed {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Raw delimited history across all refs except checkpoint storage, newest first.
///
/// The `entire/*` branches are always excluded. A `checkpoint_ref` living
/// outside that namespace is excluded as well once it exists.
pub fn read_log(
    repo: &Path,
    checkpoint_ref: &str,
    max_count: usize,
) -> Result<String, RunGitError> {
    let format = format!("--format={}", log_format());
    let exclude = format!("--glob={CHECKPOINT_REFS_GLOB}");
    let max_count = format!("--max-count={max_count}");

    let mut args = vec!["log", format.as_str(), "--all", "--not", exclude.as_str()];
    let outside_namespace = !is_checkpoint_namespace(checkpoint_ref)
        && resolve_ref(repo, checkpoint_ref)?.is_some();
    if outside_namespace {
        args.push(checkpoint_ref);
    }
    args.push(max_count.as_str());
    run_git(repo, &args)
}

fn is_checkpoint_namespace(reference: &str) -> bool {
    reference
        .strip_prefix("refs/heads/")
        .unwrap_or(reference)
        .starts_with(CHECKPOINT_BRANCH_PREFIX)
}

/// Content of `path` as stored in the tree of `reference`.
pub fn show_file(repo: &Path, reference: &str, path: &str) -> Result<String, RunGitError> {
    let spec = format!("{reference}:{path}");
    run_git(repo, &["show", &spec])
}

/// Full paths of the entries directly below `dir` in the tree of `reference`.
/// `dir` is taken from the tree root whatever subdirectory `repo` names.
/// A directory that does not exist yields no entries.
pub fn list_tree(repo: &Path, reference: &str, dir: &str) -> Result<Vec<String>, RunGitError> {
    let dir = format!("{}/", dir.trim_end_matches('/'));
    let output = run_git(
        repo,
        &["ls-tree", "--full-tree", "--name-only", reference, &dir],
    )?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Commit hash `reference` points at, or `None` when it does not exist.
pub fn resolve_ref(repo: &Path, reference: &str) -> Result<Option<String>, RunGitError> {
    let spec = format!("{reference}^{{commit}}");
    match run_git(repo, &["rev-parse", "--verify", "--quiet", &spec]) {
        Ok(output) => {
            let head = output.trim();
            Ok((!head.is_empty()).then(|| head.to_string()))
        }
        Err(RunGitError::Failed { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

/// The repository's git directory (`.git` for a plain checkout).
pub fn git_dir(repo: &Path) -> Result<PathBuf, RunGitError> {
    let output = run_git(repo, &["rev-parse", "--git-dir"])?;
    let dir = PathBuf::from(output.trim());
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(repo.join(dir))
    }
}
