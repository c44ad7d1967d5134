use crate::domain::ActiveSession;
use crate::infra::git::{RunGitError, git_dir};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const ACTIVE_SESSIONS_DIR_NAME: &str = "entire-sessions";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SkippedFileCount(usize);

impl From<usize> for SkippedFileCount {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl SkippedFileCount {
    pub fn get(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum LoadActiveSessionsError {
    #[error(transparent)]
    Git(#[from] RunGitError),
}

pub fn resolve_active_sessions_dir(repo: &Path) -> Result<PathBuf, LoadActiveSessionsError> {
    Ok(git_dir(repo)?.join(ACTIVE_SESSIONS_DIR_NAME))
}

#[derive(Clone, Debug, Default)]
pub struct ActiveSessionsOutput {
    pub sessions: Vec<ActiveSession>,
    pub skipped: SkippedFileCount,
}

/// Sessions that have not ended, in file-name order.
///
/// A missing directory is treated as "no sessions". Unreadable or malformed
/// files are skipped and counted.
pub fn load_active_sessions(dir: &Path) -> ActiveSessionsOutput {
    if !dir.is_dir() {
        return ActiveSessionsOutput::default();
    }

    let mut skipped = 0usize;
    let mut sessions = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable active-session entry");
                skipped += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        match read_session_file(entry.path()) {
            Ok(session) if session.is_ended() => {}
            Ok(session) => sessions.push(session),
            Err(reason) => {
                tracing::warn!(path = %entry.path().display(), %reason, "skipping active-session file");
                skipped += 1;
            }
        }
    }

    ActiveSessionsOutput {
        sessions,
        skipped: SkippedFileCount::from(skipped),
    }
}

fn read_session_file(path: &Path) -> Result<ActiveSession, String> {
    let raw = fs::read_to_string(path).map_err(|error| error.to_string())?;
    serde_json::from_str(&raw).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::git::tests::init_repo;

    fn session(id: &str, phase: &str) -> String {
        serde_json::json!({
            "session_id": id,
            "agent_type": "Claude Code",
            "first_prompt": "fix the tests",
            "started_at": "2026-02-18T10:00:00Z",
            "phase": phase,
            "checkpoint_count": 3,
        })
        .to_string()
    }

    #[test]
    fn missing_dir_yields_no_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = load_active_sessions(&dir.path().join("entire-sessions"));
        assert!(output.sessions.is_empty());
        assert_eq!(output.skipped.get(), 0);
    }

    #[test]
    fn ended_sessions_are_excluded() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.json"), session("a", "active")).expect("write");
        fs::write(dir.path().join("b.json"), session("b", "ended")).expect("write");
        fs::write(dir.path().join("c.json"), session("c", "idle")).expect("write");

        let output = load_active_sessions(dir.path());
        let ids: Vec<&str> = output
            .sessions
            .iter()
            .map(|s| s.session_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(output.sessions[0].checkpoint_count, 3);
        assert_eq!(output.skipped.get(), 0);
    }

    #[test]
    fn malformed_files_are_counted_and_other_files_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.json"), session("a", "active")).expect("write");
        fs::write(dir.path().join("broken.json"), "{").expect("write");
        fs::write(
            dir.path().join("partial.json"),
            r#"{"session_id":"p","phase":"active"}"#,
        )
        .expect("write");
        fs::write(dir.path().join("notes.txt"), "ignore me").expect("write");
        fs::create_dir(dir.path().join("nested.json")).expect("mkdir");

        let output = load_active_sessions(dir.path());
        assert_eq!(output.sessions.len(), 1);
        assert_eq!(output.skipped.get(), 2);
    }

    #[test]
    fn optional_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("min.json"),
            r#"{"session_id":"m","agent_type":"Gemini CLI","started_at":"2026-02-18T10:00:00Z","phase":"active"}"#,
        )
        .expect("write");

        let output = load_active_sessions(dir.path());
        let session = &output.sessions[0];
        assert_eq!(session.first_prompt, "");
        assert_eq!(session.transcript_path, "");
        assert_eq!(session.ended_at, None);
        assert_eq!(session.checkpoint_count, 0);
    }

    #[test]
    fn sessions_dir_lives_under_git_dir() {
        let repo = init_repo();
        let dir = resolve_active_sessions_dir(repo.path()).expect("dir");
        assert!(dir.ends_with(".git/entire-sessions"));
    }
}
