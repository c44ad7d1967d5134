use crate::infra::active_sessions::ACTIVE_SESSIONS_DIR_NAME;
use crate::infra::git::{RunGitError, resolve_ref};
use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub enum WatchSignal {
    Changed,
    Error(String),
}

/// Watches a repository's git directory for changes to active-session files.
///
/// The git directory itself is watched so that `entire-sessions/` is picked
/// up even when the capture tool creates it after the watcher started.
#[derive(Debug)]
pub struct ActiveSessionsWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<WatchSignal>,
    sessions_dir: PathBuf,
    watching_sessions_dir: bool,
}

impl ActiveSessionsWatcher {
    /// Waits up to `timeout` for the next signal.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<WatchSignal> {
        let signal = match self.rx.recv_timeout(timeout) {
            Ok(signal) => Some(signal),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        };
        if matches!(signal, Some(WatchSignal::Changed)) {
            self.attach_sessions_dir();
        }
        signal
    }

    fn attach_sessions_dir(&mut self) {
        if self.watching_sessions_dir || !self.sessions_dir.is_dir() {
            return;
        }
        match self
            .watcher
            .watch(&self.sessions_dir, RecursiveMode::NonRecursive)
        {
            Ok(()) => {
                tracing::debug!(dir = %self.sessions_dir.display(), "watching active sessions");
                self.watching_sessions_dir = true;
            }
            Err(error) => {
                tracing::warn!(dir = %self.sessions_dir.display(), %error, "cannot watch active sessions");
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchActiveSessionsDirError {
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

pub fn watch_active_sessions_dir(
    git_dir: &Path,
) -> Result<ActiveSessionsWatcher, WatchActiveSessionsDirError> {
    let (tx, rx) = channel::<WatchSignal>();
    // notify reports canonical absolute paths
    let git_dir = git_dir
        .canonicalize()
        .unwrap_or_else(|_| git_dir.to_path_buf());
    let sessions_dir = git_dir.join(ACTIVE_SESSIONS_DIR_NAME);
    let filter_dir = sessions_dir.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if should_trigger_reload(&event, &filter_dir) {
                    let _ = tx.send(WatchSignal::Changed);
                }
            }
            Err(error) => {
                let _ = tx.send(WatchSignal::Error(error.to_string()));
            }
        },
        Config::default(),
    )?;

    watcher.watch(&git_dir, RecursiveMode::NonRecursive)?;

    let mut sessions_watcher = ActiveSessionsWatcher {
        watcher,
        rx,
        sessions_dir,
        watching_sessions_dir: false,
    };
    sessions_watcher.attach_sessions_dir();
    Ok(sessions_watcher)
}

/// Session files directly inside `sessions_dir`, or the directory itself
/// appearing or disappearing. Other git-directory churn (index, refs, HEAD)
/// is ignored.
fn should_trigger_reload(event: &notify::Event, sessions_dir: &Path) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }

    event.paths.iter().any(|path| {
        if path == sessions_dir {
            return true;
        }
        path.parent() == Some(sessions_dir)
            && path.extension().and_then(|ext| ext.to_str()) == Some("json")
    })
}

/// Remembers the last seen head of the checkpoint reference.
#[derive(Clone, Debug, Default)]
pub struct CheckpointHeadTracker {
    last_head: Option<Option<String>>,
}

impl CheckpointHeadTracker {
    /// Records `head` and reports whether it differs from the previous one.
    /// The first observation is never a change.
    pub fn observe(&mut self, head: Option<String>) -> bool {
        let changed = matches!(&self.last_head, Some(previous) if *previous != head);
        self.last_head = Some(head);
        changed
    }

    pub fn poll(&mut self, repo: &Path, reference: &str) -> Result<bool, RunGitError> {
        let head = resolve_ref(repo, reference)?;
        Ok(self.observe(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoints::tests::write_orphan_ref;
    use crate::infra::git::tests::{commit_file, init_repo};
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    const SESSIONS_DIR: &str = "/repo/.git/entire-sessions";

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    fn triggers(event: &notify::Event) -> bool {
        should_trigger_reload(event, Path::new(SESSIONS_DIR))
    }

    #[test]
    fn session_file_changes_trigger_reload() {
        assert!(triggers(&event(
            EventKind::Create(CreateKind::File),
            &["/repo/.git/entire-sessions/s1.json"],
        )));
        assert!(triggers(&event(EventKind::Modify(ModifyKind::Any), &[])));
    }

    #[test]
    fn sessions_dir_appearing_triggers_reload() {
        assert!(triggers(&event(
            EventKind::Create(CreateKind::Folder),
            &[SESSIONS_DIR],
        )));
    }

    #[test]
    fn other_git_dir_churn_is_ignored() {
        assert!(!triggers(&event(
            EventKind::Modify(ModifyKind::Any),
            &["/repo/.git/entire-sessions/s1.json.tmp"],
        )));
        assert!(!triggers(&event(
            EventKind::Access(AccessKind::Any),
            &["/repo/.git/entire-sessions/s1.json"],
        )));
        assert!(!triggers(&event(
            EventKind::Modify(ModifyKind::Any),
            &["/repo/.git/index", "/repo/.git/HEAD"],
        )));
        assert!(!triggers(&event(
            EventKind::Create(CreateKind::File),
            &["/repo/.git/config.json"],
        )));
    }

    #[test]
    fn watcher_attaches_to_sessions_dir_created_later() {
        let repo = init_repo();
        let git_dir = repo.path().join(".git");
        let mut watcher = watch_active_sessions_dir(&git_dir).expect("watch");
        assert!(!watcher.watching_sessions_dir);

        std::fs::create_dir(git_dir.join(ACTIVE_SESSIONS_DIR_NAME)).expect("mkdir");
        let mut attached = false;
        for _ in 0..50 {
            watcher.recv_timeout(Duration::from_millis(100));
            if watcher.watching_sessions_dir {
                attached = true;
                break;
            }
        }
        assert!(attached);
    }

    #[test]
    fn first_observation_is_not_a_change() {
        let mut tracker = CheckpointHeadTracker::default();
        assert!(!tracker.observe(Some("aaa".to_string())));
        assert!(!tracker.observe(Some("aaa".to_string())));
        assert!(tracker.observe(Some("bbb".to_string())));
        assert!(tracker.observe(None));
        assert!(!tracker.observe(None));
    }

    #[test]
    fn poll_notices_new_checkpoint_commits() {
        let repo = init_repo();
        commit_file(repo.path(), "a.txt", "first");
        let mut tracker = CheckpointHeadTracker::default();

        assert!(!tracker.poll(repo.path(), "entire/checkpoints/v1").expect("poll"));
        write_orphan_ref(
            repo.path(),
            "entire/checkpoints/v1",
            &[("a/bc/metadata.json", "{}".to_string())],
        );
        assert!(tracker.poll(repo.path(), "entire/checkpoints/v1").expect("poll"));
        assert!(!tracker.poll(repo.path(), "entire/checkpoints/v1").expect("poll"));
    }
}
