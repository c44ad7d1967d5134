use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

const SHARD_PREFIX_LEN: usize = 2;
const MIN_CHECKPOINT_ID_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum InvalidCheckpointId {
    #[error("checkpoint id is too short (need at least 3 characters): {0:?}")]
    TooShort(String),

    #[error("checkpoint id contains unsupported characters: {0:?}")]
    BadCharacters(String),
}

/// Opaque checkpoint identifier, sharded on disk as `<first 2 chars>/<rest>/`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn parse(value: &str) -> Result<Self, InvalidCheckpointId> {
        let value = value.trim();
        if !value.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(InvalidCheckpointId::BadCharacters(value.to_string()));
        }
        if value.len() < MIN_CHECKPOINT_ID_LEN {
            return Err(InvalidCheckpointId::TooShort(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn shard_prefix(&self) -> &str {
        &self.0[..SHARD_PREFIX_LEN]
    }

    pub fn shard_suffix(&self) -> &str {
        &self.0[SHARD_PREFIX_LEN..]
    }

    pub fn base_path(&self) -> String {
        format!("{}/{}", self.shard_prefix(), self.shard_suffix())
    }

    pub fn metadata_path(&self) -> String {
        format!("{}/metadata.json", self.base_path())
    }

    pub fn tasks_dir(&self) -> String {
        format!("{}/tasks", self.base_path())
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn task_checkpoint_path(task_entry: &str) -> String {
    format!("{}/checkpoint.json", task_entry.trim().trim_end_matches('/'))
}

#[derive(Debug, Error)]
pub enum ParseMetadataError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// `null` and a missing key both mean "no files recorded".
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionRef {
    pub metadata: String,
    pub transcript: String,
    pub context: String,
    pub content_hash: String,
    pub prompt: String,
}

impl SessionRef {
    /// Session paths are written rooted (`/3a/...`); the tree lookup wants them relative.
    pub fn metadata_path(&self) -> &str {
        self.metadata.strip_prefix('/').unwrap_or(&self.metadata)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootCheckpointMetadata {
    #[serde(default)]
    pub cli_version: Option<String>,
    pub checkpoint_id: String,
    pub strategy: String,
    pub branch: String,
    #[serde(default)]
    pub checkpoints_count: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files_touched: Vec<String>,
    pub sessions: Vec<SessionRef>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Attribution {
    pub agent_percentage: f64,
    pub human_percentage: f64,
    #[serde(default)]
    pub agent_lines: u64,
    #[serde(default)]
    pub total_lines: u64,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionSummary {
    pub intent: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub cli_version: Option<String>,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    pub session_id: String,
    pub strategy: String,
    pub created_at: String,
    pub branch: String,
    #[serde(default)]
    pub checkpoints_count: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files_touched: Vec<String>,
    pub agent: String,
    #[serde(default)]
    pub is_task: bool,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub initial_attribution: Option<Attribution>,
    #[serde(default)]
    pub summary: Option<SessionSummary>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TaskCheckpoint {
    pub session_id: String,
    pub tool_use_id: String,
    pub checkpoint_uuid: String,
    pub agent_id: String,
}

/// Root metadata joined with whatever session and task objects could be read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub strategy: String,
    pub branch: String,
    pub sessions: Vec<SessionMetadata>,
    pub tasks: Vec<TaskCheckpoint>,
}

pub fn parse_root_metadata(raw: &str) -> Result<RootCheckpointMetadata, ParseMetadataError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parse_session_metadata(raw: &str) -> Result<SessionMetadata, ParseMetadataError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parse_task_checkpoint(raw: &str) -> Result<TaskCheckpoint, ParseMetadataError> {
    Ok(serde_json::from_str(raw)?)
}
