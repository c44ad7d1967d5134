use crate::infra::checkpoints::DEFAULT_CHECKPOINT_REF;
use std::path::PathBuf;
use thiserror::Error;

pub const REPO_ENV: &str = "ENTIRE_GRAPH_REPO";
pub const CHECKPOINTS_REF_ENV: &str = "ENTIRE_CHECKPOINTS_REF";
pub const MAX_COMMITS_ENV: &str = "ENTIRE_GRAPH_MAX_COMMITS";
pub const LOG_ENV: &str = "ENTIRE_GRAPH_LOG";

pub const DEFAULT_MAX_COMMITS: usize = 200;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GraphConfig {
    pub repo_dir: PathBuf,
    pub checkpoint_ref: String,
    pub max_commits: usize,
}

#[derive(Debug, Error)]
pub enum ResolveConfigError {
    #[error("current directory unavailable: {0}")]
    CurrentDir(#[from] std::io::Error),

    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl GraphConfig {
    pub fn from_env() -> Result<Self, ResolveConfigError> {
        let cwd = std::env::current_dir()?;
        Self::from_lookup(|name| std::env::var(name).ok(), cwd)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cwd: PathBuf,
    ) -> Result<Self, ResolveConfigError> {
        let repo_dir = match lookup(REPO_ENV) {
            Some(dir) if !dir.trim().is_empty() => cwd.join(dir.trim()),
            _ => cwd,
        };

        let checkpoint_ref = match lookup(CHECKPOINTS_REF_ENV) {
            Some(reference) if reference.trim().is_empty() => {
                return Err(ResolveConfigError::Empty(CHECKPOINTS_REF_ENV));
            }
            Some(reference) => reference.trim().to_string(),
            None => DEFAULT_CHECKPOINT_REF.to_string(),
        };

        let max_commits = match lookup(MAX_COMMITS_ENV) {
            Some(value) => parse_max_commits(MAX_COMMITS_ENV, &value)?,
            None => DEFAULT_MAX_COMMITS,
        };

        Ok(Self {
            repo_dir,
            checkpoint_ref,
            max_commits,
        })
    }
}

pub fn parse_max_commits(name: &'static str, value: &str) -> Result<usize, ResolveConfigError> {
    match value.trim().parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(ResolveConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}
