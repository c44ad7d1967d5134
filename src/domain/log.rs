use crate::domain::CommitRecord;

/// Separates fields inside one `git log` record (`%x00`).
pub const FIELD_SEPARATOR: char = '\u{0}';
/// Terminates each `git log` record (`%x01`).
pub const RECORD_SEPARATOR: char = '\u{1}';

/// Placeholders for one record, in the order `parse_log` reads them back.
pub const LOG_FIELDS: [&str; 12] = [
    "%H",
    "%h",
    "%P",
    "%an",
    "%ae",
    "%aI",
    "%s",
    "%D",
    "%(trailers:key=Entire-Checkpoint,valueonly,separator=%x20)",
    "%(trailers:key=Entire-Attribution,valueonly,separator=%x20)",
    "%(trailers:key=Entire-Session,valueonly,separator=%x20)",
    "%(trailers:key=Entire-Agent,valueonly,separator=%x20)",
];

/// `--format=` value matching `LOG_FIELDS` and the two separators.
pub fn log_format() -> String {
    format!("{}%x01", LOG_FIELDS.join("%x00"))
}

/// Split raw `git log` output into commits, preserving input order.
///
/// Purely structural: blank records are skipped, missing fields read as empty
/// and empty trailer values become `None`. Never fails.
pub fn parse_log(raw: &str) -> Vec<CommitRecord> {
    raw.split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> CommitRecord {
    let mut fields = record.trim().split(FIELD_SEPARATOR);
    let mut next = || fields.next().unwrap_or("");

    let hash = next().to_string();
    let abbreviated_hash = next().to_string();
    let parents = split_parents(next());
    let author = next().to_string();
    let author_email = next().to_string();
    let date = next().to_string();
    let subject = next().to_string();
    let refs = split_refs(next());
    let checkpoint_id = trailer_value(next());
    let attribution = trailer_value(next());
    let session_id = trailer_value(next());
    let agent = trailer_value(next());

    CommitRecord {
        hash,
        abbreviated_hash,
        parents,
        author,
        author_email,
        date,
        subject,
        refs,
        checkpoint_id,
        attribution,
        session_id,
        agent,
    }
}

fn split_parents(value: &str) -> Vec<String> {
    value
        .split(' ')
        .filter(|parent| !parent.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_refs(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn trailer_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> String {
        format!("{}{RECORD_SEPARATOR}\n", fields.join("\u{0}"))
    }

    #[test]
    fn parses_full_record_with_trailers() {
        let raw = record(&[
            "aaa111aaa111",
            "aaa111",
            "bbb222 ccc333",
            "Ada",
            "ada@example.com",
            "2026-02-18T21:39:39+01:00",
            "Merge feature",
            "HEAD -> main, origin/main, tag: v1",
            "3a96b1501cdd",
            "75% agent",
            " s1 ",
            "claude",
        ]);

        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        let commit = &commits[0];
        assert_eq!(commit.hash, "aaa111aaa111");
        assert_eq!(commit.abbreviated_hash, "aaa111");
        assert_eq!(commit.parents, vec!["bbb222", "ccc333"]);
        assert!(commit.is_merge());
        assert_eq!(commit.author, "Ada");
        assert_eq!(commit.author_email, "ada@example.com");
        assert_eq!(commit.subject, "Merge feature");
        assert_eq!(commit.refs, vec!["HEAD -> main", "origin/main", "tag: v1"]);
        assert_eq!(commit.checkpoint_id.as_deref(), Some("3a96b1501cdd"));
        assert_eq!(commit.attribution.as_deref(), Some("75% agent"));
        assert_eq!(commit.session_id.as_deref(), Some("s1"));
        assert_eq!(commit.agent.as_deref(), Some("claude"));
    }

    #[test]
    fn blank_trailers_become_absent() {
        let raw = record(&[
            "aaa111", "aaa", "", "Ada", "a@x", "2026-01-01T00:00:00Z", "root", "", "", "  ", "", "",
        ]);
        let commits = parse_log(&raw);
        let commit = &commits[0];
        assert!(commit.is_root());
        assert!(commit.refs.is_empty());
        assert_eq!(commit.checkpoint_id, None);
        assert_eq!(commit.attribution, None);
        assert_eq!(commit.session_id, None);
        assert_eq!(commit.agent, None);
    }

    #[test]
    fn truncated_record_still_yields_commit() {
        let raw = format!("aaa111\u{0}aaa\u{0}bbb222{RECORD_SEPARATOR}");
        let commits = parse_log(&raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].parents, vec!["bbb222"]);
        assert_eq!(commits[0].subject, "");
        assert_eq!(commits[0].checkpoint_id, None);
    }

    #[test]
    fn keeps_input_order_and_skips_blank_records() {
        let mut raw = String::new();
        for hash in ["c3", "c2", "c1"] {
            raw.push_str(&record(&[hash, hash, "", "A", "a@x", "", hash, ""]));
            raw.push_str("\n  \n");
            raw.push(RECORD_SEPARATOR);
        }

        let commits = parse_log(&raw);
        let hashes: Vec<&str> = commits.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn empty_input_yields_no_commits() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\n").is_empty());
    }

    #[test]
    fn format_lists_every_field_in_order() {
        let format = log_format();
        assert!(format.starts_with("%H%x00%h%x00%P"));
        assert!(format.ends_with("key=Entire-Agent,valueonly,separator=%x20)%x01"));
        assert_eq!(format.matches("%x00").count(), LOG_FIELDS.len() - 1);
    }
}
