use crate::domain::{
    CommitDetail, CommitRecord, GraphEdge, GraphLayout, LaneInfo, RepoStatus, SessionGrouping,
    assign_lanes, group_sessions, layout_edges, parse_log,
};
use crate::infra::{
    ActiveSessionsOutput, CheckpointResolution, CheckpointResolver, CheckpointStore, GitRefStore,
    GraphConfig, LoadActiveSessionsError, LoadCommitDetailError, LoadRepoSettingsError,
    ProbeRepoStatusError, RepoSettings, ResolveCheckpointError, RunGitError,
    is_entire_cli_installed, load_active_sessions, load_commit_detail, load_repo_settings,
    probe_repo_status, read_log, resolve_active_sessions_dir,
};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadLogError {
    #[error("failed to read history: {0}")]
    Git(#[from] RunGitError),
}

#[derive(Debug, Error)]
pub enum LoadDetailError {
    #[error(transparent)]
    ReadLog(#[from] ReadLogError),

    #[error(transparent)]
    Lookup(#[from] LoadCommitDetailError),
}

#[derive(Debug, Error)]
pub enum StatusReportError {
    #[error(transparent)]
    Probe(#[from] ProbeRepoStatusError),

    #[error(transparent)]
    Settings(#[from] LoadRepoSettingsError),
}

/// One row of the commit graph: the commit with its lane.
#[derive(Clone, Debug, Serialize)]
pub struct GraphRow {
    pub commit: CommitRecord,
    pub lane: LaneInfo,
}

#[derive(Clone, Debug, Serialize)]
pub struct GraphView {
    pub rows: Vec<GraphRow>,
    pub edges: Vec<GraphEdge>,
    pub lane_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub status: RepoStatus,
    pub settings: Option<RepoSettings>,
    pub cli_installed: bool,
}

/// Read-only view over one repository's agent history.
///
/// Each view owns its repository path and store; nothing is shared between
/// views and every query reads the repository again.
#[derive(Clone, Debug)]
pub struct HistoryView<S = GitRefStore> {
    config: GraphConfig,
    resolver: CheckpointResolver<S>,
}

impl HistoryView<GitRefStore> {
    pub fn open(config: GraphConfig) -> Self {
        let store = GitRefStore::new(&config.repo_dir, &config.checkpoint_ref);
        Self::with_store(config, store)
    }
}

impl<S: CheckpointStore> HistoryView<S> {
    pub fn with_store(config: GraphConfig, store: S) -> Self {
        Self {
            config,
            resolver: CheckpointResolver::new(store),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.config.repo_dir
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The most recent commits across all refs, newest first.
    pub fn commits(&self) -> Result<Vec<CommitRecord>, ReadLogError> {
        let raw = read_log(
            &self.config.repo_dir,
            &self.config.checkpoint_ref,
            self.config.max_commits,
        )?;
        Ok(parse_log(&raw))
    }

    /// Session groups over the commit window. Returned commits carry any
    /// backfilled session ids and agents.
    pub fn sessions(&self) -> Result<SessionGrouping, ReadLogError> {
        let mut commits = self.commits()?;
        Ok(group_sessions(&mut commits, &self.resolver))
    }

    pub fn layout(&self) -> Result<GraphView, ReadLogError> {
        let commits = self.commits()?;
        Ok(build_graph_view(commits))
    }

    pub fn checkpoint(
        &self,
        checkpoint_id: &str,
    ) -> Result<CheckpointResolution, ResolveCheckpointError> {
        self.resolver.resolve(checkpoint_id)
    }

    pub fn detail(&self, checkpoint_id: &str) -> Result<CommitDetail, LoadDetailError> {
        let commits = self.commits()?;
        Ok(load_commit_detail(&commits, &self.resolver, checkpoint_id)?)
    }

    pub fn active_sessions(&self) -> Result<ActiveSessionsOutput, LoadActiveSessionsError> {
        let dir = resolve_active_sessions_dir(&self.config.repo_dir)?;
        Ok(load_active_sessions(&dir))
    }

    pub fn status(&self) -> Result<StatusReport, StatusReportError> {
        let status = probe_repo_status(&self.config.repo_dir, &self.config.checkpoint_ref)?;
        let settings = load_repo_settings(&self.config.repo_dir)?;
        Ok(StatusReport {
            status,
            settings,
            cli_installed: is_entire_cli_installed(&self.config.repo_dir),
        })
    }
}

fn build_graph_view(commits: Vec<CommitRecord>) -> GraphView {
    let layout: GraphLayout = assign_lanes(&commits);
    let edges = layout_edges(&commits, &layout);
    let lane_count = layout.lane_count;
    let rows = commits
        .into_iter()
        .filter_map(|commit| {
            let lane = layout.get(&commit.hash)?;
            Some(GraphRow { commit, lane })
        })
        .collect();
    GraphView {
        rows,
        edges,
        lane_count,
    }
}
