use crate::domain::Checkpoint;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One commit as reported by `git log`, plus the `Entire-*` trailers found on it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub abbreviated_hash: String,
    pub parents: Vec<String>,
    pub author: String,
    pub author_email: String,
    /// ISO-8601 author date (`%aI`).
    pub date: String,
    pub subject: String,
    pub refs: Vec<String>,
    pub checkpoint_id: Option<String>,
    pub attribution: Option<String>,
    pub session_id: Option<String>,
    pub agent: Option<String>,
}

impl CommitRecord {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    pub fn authored_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.date, &Rfc3339).ok()
    }

    /// Refs worth showing next to the commit: `HEAD -> ` is folded into the
    /// branch name and anything under the checkpoint namespace is hidden.
    pub fn display_refs(&self) -> Vec<String> {
        self.refs
            .iter()
            .filter(|name| !name.contains(CHECKPOINT_REF_NAMESPACE))
            .map(|name| name.trim_start_matches("HEAD -> ").to_string())
            .collect()
    }
}

pub const CHECKPOINT_REF_NAMESPACE: &str = "entire/checkpoints";

/// Commits that belong to one agent session, newest activity first in the
/// list returned by `group_sessions`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionGroup {
    pub session_id: String,
    /// Set when no session id could be found and the group is keyed by the
    /// commit hash instead.
    pub unresolved: bool,
    pub agent: String,
    pub commits: Vec<CommitRecord>,
    pub started_at: String,
    pub last_activity_at: String,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneColor {
    Blue,
    Green,
    Red,
    Yellow,
    Purple,
    Orange,
}

pub const LANE_PALETTE: [LaneColor; 6] = [
    LaneColor::Blue,
    LaneColor::Green,
    LaneColor::Red,
    LaneColor::Yellow,
    LaneColor::Purple,
    LaneColor::Orange,
];

impl LaneColor {
    /// Round-robin pick from the palette for the `index`-th allocation.
    pub fn from_allocation(index: usize) -> Self {
        LANE_PALETTE[index % LANE_PALETTE.len()]
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
            Self::Orange => "orange",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct LaneInfo {
    pub lane: usize,
    pub color: LaneColor,
}

/// An in-flight agent session as described by the capture tool's side-channel
/// files.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub agent_type: String,
    #[serde(default)]
    pub first_prompt: String,
    #[serde(default)]
    pub transcript_path: String,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    pub phase: String,
    #[serde(default)]
    pub checkpoint_count: u64,
}

impl ActiveSession {
    pub fn is_ended(&self) -> bool {
        self.phase == "ended"
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoStatus {
    NotEnabled,
    NoCheckpoints,
    Ready,
}

impl RepoStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::NotEnabled => "not-enabled",
            Self::NoCheckpoints => "no-checkpoints",
            Self::Ready => "ready",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CommitDetail {
    pub commit: CommitRecord,
    pub checkpoint: Option<Checkpoint>,
    /// Why `checkpoint` is missing when the commit does carry a checkpoint id.
    pub checkpoint_error: Option<String>,
}
