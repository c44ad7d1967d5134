use crate::domain::{
    Checkpoint, CheckpointId, CommitDetail, CommitRecord, InvalidCheckpointId,
    RootCheckpointMetadata, SessionLookup, SessionMetadata, TaskCheckpoint, parse_root_metadata,
    parse_session_metadata, parse_task_checkpoint, task_checkpoint_path,
};
use crate::infra::git::{RunGitError, list_tree, resolve_ref, show_file};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CHECKPOINT_REF: &str = "entire/checkpoints/v1";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store as a whole cannot be read (reference absent, git unusable).
    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),

    #[error("not found in checkpoint store: {0}")]
    Missing(String),
}

/// Read access to the tree that holds checkpoint metadata.
pub trait CheckpointStore {
    fn read_file(&self, path: &str) -> Result<String, StoreError>;

    /// Full paths of the entries directly below `dir`; empty when `dir` does not exist.
    fn list_dir(&self, dir: &str) -> Result<Vec<String>, StoreError>;
}

/// Checkpoint metadata read from the tree of an orphan reference.
#[derive(Clone, Debug)]
pub struct GitRefStore {
    repo: PathBuf,
    reference: String,
}

impl GitRefStore {
    pub fn new(repo: &Path, reference: &str) -> Self {
        Self {
            repo: repo.to_path_buf(),
            reference: reference.to_string(),
        }
    }

    /// Tells "the reference is gone" apart from "the path is not in the tree".
    fn classify(&self, path: &str, error: RunGitError) -> StoreError {
        match error {
            RunGitError::Spawn(error) => StoreError::Unavailable(error.to_string()),
            RunGitError::Failed { stderr, .. } => match resolve_ref(&self.repo, &self.reference) {
                Ok(Some(_)) => StoreError::Missing(format!("{path}: {stderr}")),
                Ok(None) => {
                    StoreError::Unavailable(format!("reference {} not found", self.reference))
                }
                Err(error) => StoreError::Unavailable(error.to_string()),
            },
        }
    }
}

impl CheckpointStore for GitRefStore {
    fn read_file(&self, path: &str) -> Result<String, StoreError> {
        show_file(&self.repo, &self.reference, path).map_err(|error| self.classify(path, error))
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        list_tree(&self.repo, &self.reference, dir).map_err(|error| self.classify(dir, error))
    }
}

#[derive(Debug, Error)]
pub enum ResolveCheckpointError {
    #[error(transparent)]
    InvalidId(#[from] InvalidCheckpointId),

    #[error("checkpoint store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("checkpoint {id} not found: {reason}")]
    CheckpointNotFound { id: String, reason: String },

    #[error("session metadata {path} for checkpoint {id} could not be read: {reason}")]
    SessionUnreadable {
        id: String,
        path: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkippedKind {
    Session,
    Task,
    TaskList,
}

impl SkippedKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Task => "task",
            Self::TaskList => "tasklist",
        }
    }
}

/// A session or task object that was left out of a resolved checkpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SkippedMetadata {
    pub kind: SkippedKind,
    pub path: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckpointResolution {
    pub checkpoint: Checkpoint,
    /// Entries listed by the root metadata that could not be read or parsed.
    pub skipped: Vec<SkippedMetadata>,
}

impl CheckpointResolution {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Resolves checkpoint ids against a `CheckpointStore`. Nothing is cached;
/// every call reads the store again.
#[derive(Clone, Debug)]
pub struct CheckpointResolver<S> {
    store: S,
}

impl<S: CheckpointStore> CheckpointResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Root metadata plus every readable session and task object.
    ///
    /// Only the root is required. Session and task objects that fail to load
    /// are reported in `skipped` and the rest of the checkpoint is returned.
    pub fn resolve(&self, checkpoint_id: &str) -> Result<CheckpointResolution, ResolveCheckpointError> {
        let id = CheckpointId::parse(checkpoint_id)?;
        let root = self.read_root(&id)?;
        let mut skipped = Vec::new();

        let mut sessions = Vec::with_capacity(root.sessions.len());
        for session_ref in &root.sessions {
            let path = session_ref.metadata_path();
            match self.read_session(path) {
                Ok(session) => sessions.push(session),
                Err(reason) => {
                    tracing::warn!(checkpoint = %id, path, %reason, "skipping unreadable session metadata");
                    skipped.push(SkippedMetadata {
                        kind: SkippedKind::Session,
                        path: path.to_string(),
                        reason,
                    });
                }
            }
        }

        let tasks = self.read_tasks(&id, &mut skipped);

        Ok(CheckpointResolution {
            checkpoint: Checkpoint {
                checkpoint_id: root.checkpoint_id,
                strategy: root.strategy,
                branch: root.branch,
                sessions,
                tasks,
            },
            skipped,
        })
    }

    fn read_root(&self, id: &CheckpointId) -> Result<RootCheckpointMetadata, ResolveCheckpointError> {
        let raw = self.store.read_file(&id.metadata_path()).map_err(|error| match error {
            StoreError::Unavailable(reason) => ResolveCheckpointError::StoreUnavailable(reason),
            StoreError::Missing(reason) => ResolveCheckpointError::CheckpointNotFound {
                id: id.to_string(),
                reason,
            },
        })?;
        parse_root_metadata(&raw).map_err(|error| ResolveCheckpointError::CheckpointNotFound {
            id: id.to_string(),
            reason: error.to_string(),
        })
    }

    fn read_session(&self, path: &str) -> Result<SessionMetadata, String> {
        let raw = self.store.read_file(path).map_err(|error| error.to_string())?;
        parse_session_metadata(&raw).map_err(|error| error.to_string())
    }

    fn read_tasks(&self, id: &CheckpointId, skipped: &mut Vec<SkippedMetadata>) -> Vec<TaskCheckpoint> {
        let tasks_dir = id.tasks_dir();
        let entries = match self.store.list_dir(&tasks_dir) {
            Ok(entries) => entries,
            Err(StoreError::Missing(_)) => return Vec::new(),
            Err(error) => {
                tracing::warn!(checkpoint = %id, %error, "skipping task listing");
                skipped.push(SkippedMetadata {
                    kind: SkippedKind::TaskList,
                    path: tasks_dir,
                    reason: error.to_string(),
                });
                return Vec::new();
            }
        };

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = task_checkpoint_path(&entry);
            let parsed = self
                .store
                .read_file(&path)
                .map_err(|error| error.to_string())
                .and_then(|raw| parse_task_checkpoint(&raw).map_err(|error| error.to_string()));
            match parsed {
                Ok(task) => tasks.push(task),
                Err(reason) => {
                    tracing::warn!(checkpoint = %id, path, %reason, "skipping unreadable task checkpoint");
                    skipped.push(SkippedMetadata {
                        kind: SkippedKind::Task,
                        path,
                        reason,
                    });
                }
            }
        }
        tasks
    }
}

impl<S: CheckpointStore> SessionLookup for CheckpointResolver<S> {
    type Error = ResolveCheckpointError;

    fn first_session(&self, checkpoint_id: &str) -> Result<Option<SessionMetadata>, Self::Error> {
        let id = CheckpointId::parse(checkpoint_id)?;
        let root = self.read_root(&id)?;
        let Some(first) = root.sessions.first() else {
            return Ok(None);
        };
        let path = first.metadata_path();
        self.read_session(path)
            .map(Some)
            .map_err(|reason| ResolveCheckpointError::SessionUnreadable {
                id: id.to_string(),
                path: path.to_string(),
                reason,
            })
    }
}

#[derive(Debug, Error)]
pub enum LoadCommitDetailError {
    #[error("no commit in the loaded history carries checkpoint {0}")]
    CommitNotFound(String),
}

/// The commit carrying `checkpoint_id` together with its resolved checkpoint.
/// A checkpoint that fails to resolve is reported in `checkpoint_error`.
pub fn load_commit_detail<S: CheckpointStore>(
    commits: &[CommitRecord],
    resolver: &CheckpointResolver<S>,
    checkpoint_id: &str,
) -> Result<CommitDetail, LoadCommitDetailError> {
    let Some(commit) = commits
        .iter()
        .find(|commit| commit.checkpoint_id.as_deref() == Some(checkpoint_id))
    else {
        return Err(LoadCommitDetailError::CommitNotFound(checkpoint_id.to_string()));
    };

    let (checkpoint, checkpoint_error) = match resolver.resolve(checkpoint_id) {
        Ok(resolution) => (Some(resolution.checkpoint), None),
        Err(error) => (None, Some(error.to_string())),
    };

    Ok(CommitDetail {
        commit: commit.clone(),
        checkpoint,
        checkpoint_error,
    })
}
