use crate::domain::{CommitRecord, SessionGroup, SessionMetadata};
use indexmap::IndexMap;
use std::fmt::Display;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

const DEFAULT_AGENT: &str = "AI";
const UNRESOLVED_SESSION_PREFIX: &str = "unknown-";

/// Source of the session a checkpoint was recorded in.
pub trait SessionLookup {
    type Error: Display;

    /// Metadata of the first session listed for `checkpoint_id`, or `None`
    /// when the checkpoint lists no sessions.
    fn first_session(&self, checkpoint_id: &str) -> Result<Option<SessionMetadata>, Self::Error>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackfillFailure {
    pub commit_hash: String,
    pub checkpoint_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct SessionGrouping {
    pub groups: Vec<SessionGroup>,
    pub backfill_failures: Vec<BackfillFailure>,
}

/// Group checkpoint-bearing commits into agent sessions, most recently active first.
///
/// Commits without an `Entire-Session` trailer get their session id (and agent,
/// when missing) filled in from the first session of their checkpoint. The
/// fill happens in place, so callers see the enriched records too. Commits whose
/// session still cannot be found land in a group of their own.
pub fn group_sessions<L: SessionLookup>(
    commits: &mut [CommitRecord],
    lookup: &L,
) -> SessionGrouping {
    let mut backfill_failures = Vec::new();

    for commit in commits.iter_mut() {
        if commit.session_id.is_some() {
            continue;
        }
        let Some(checkpoint_id) = commit.checkpoint_id.clone() else {
            continue;
        };
        match lookup.first_session(&checkpoint_id) {
            Ok(Some(session)) => {
                commit.session_id = Some(session.session_id);
                if commit.agent.is_none() {
                    commit.agent = Some(session.agent);
                }
            }
            Ok(None) => {}
            Err(error) => {
                tracing::debug!(
                    commit = %commit.hash,
                    checkpoint = %checkpoint_id,
                    %error,
                    "session backfill failed"
                );
                backfill_failures.push(BackfillFailure {
                    commit_hash: commit.hash.clone(),
                    checkpoint_id,
                    reason: error.to_string(),
                });
            }
        }
    }

    let mut buckets: IndexMap<String, Vec<&CommitRecord>> = IndexMap::new();
    for commit in commits.iter().filter(|commit| commit.checkpoint_id.is_some()) {
        let key = match commit.session_id.as_deref() {
            Some(session_id) => session_id.to_string(),
            None => format!("{UNRESOLVED_SESSION_PREFIX}{}", commit.hash),
        };
        buckets.entry(key).or_default().push(commit);
    }

    let mut ranked: Vec<(Option<OffsetDateTime>, SessionGroup)> = buckets
        .into_iter()
        .map(|(session_id, members)| build_group(session_id, &members))
        .collect();

    // `sort_by` is stable: equal activity keeps bucket creation order.
    ranked.sort_by(|(a, _), (b, _)| b.cmp(a));

    SessionGrouping {
        groups: ranked.into_iter().map(|(_, group)| group).collect(),
        backfill_failures,
    }
}

fn build_group(session_id: String, members: &[&CommitRecord]) -> (Option<OffsetDateTime>, SessionGroup) {
    let unresolved = members
        .first()
        .is_some_and(|commit| commit.session_id.is_none());

    let agent = members
        .iter()
        .find_map(|commit| commit.agent.clone())
        .unwrap_or_else(|| DEFAULT_AGENT.to_string());

    let timestamps: Vec<OffsetDateTime> = members
        .iter()
        .filter_map(|commit| commit.authored_at())
        .collect();
    let earliest = timestamps.iter().min().copied();
    let latest = timestamps.iter().max().copied();

    let fallback = members
        .first()
        .map(|commit| commit.date.clone())
        .unwrap_or_default();
    let started_at = earliest.map_or_else(|| fallback.clone(), format_utc);
    let last_activity_at = latest.map_or(fallback, format_utc);

    let group = SessionGroup {
        session_id,
        unresolved,
        agent,
        commits: members.iter().map(|commit| (*commit).clone()).collect(),
        started_at,
        last_activity_at,
    };
    (latest, group)
}

fn format_utc(timestamp: OffsetDateTime) -> String {
    let utc = timestamp.to_offset(UtcOffset::UTC);
    utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string())
}
