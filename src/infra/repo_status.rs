use crate::domain::RepoStatus;
use crate::infra::git::{RunGitError, resolve_ref};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

const UNKNOWN: &str = "unknown";

pub fn settings_path(repo: &Path) -> PathBuf {
    repo.join(".entire").join("settings.json")
}

/// Repository-level capture settings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RepoSettings {
    pub strategy: String,
    pub cli_version: String,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    cli_version: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadRepoSettingsError {
    #[error("failed to read settings: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// `None` when the repository has no settings file.
pub fn load_repo_settings(repo: &Path) -> Result<Option<RepoSettings>, LoadRepoSettingsError> {
    let raw = match fs::read_to_string(settings_path(repo)) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    let file: SettingsFile = serde_json::from_str(&raw)?;
    Ok(Some(RepoSettings {
        strategy: file.strategy.unwrap_or_else(|| UNKNOWN.to_string()),
        cli_version: file.cli_version.unwrap_or_else(|| UNKNOWN.to_string()),
    }))
}

#[derive(Debug, Error)]
pub enum ProbeRepoStatusError {
    #[error(transparent)]
    Git(#[from] RunGitError),
}

pub fn probe_repo_status(repo: &Path, checkpoint_ref: &str) -> Result<RepoStatus, ProbeRepoStatusError> {
    if !settings_path(repo).is_file() {
        return Ok(RepoStatus::NotEnabled);
    }
    if resolve_ref(repo, checkpoint_ref)?.is_none() {
        return Ok(RepoStatus::NoCheckpoints);
    }
    Ok(RepoStatus::Ready)
}

/// Whether the capture CLI (`entire`) runs from this directory.
pub fn is_entire_cli_installed(repo: &Path) -> bool {
    let status = Command::new("entire")
        .arg("--version")
        .current_dir(repo)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) => status.success(),
        Err(error) => {
            tracing::debug!(%error, "entire CLI not runnable");
            false
        }
    }
}
