use crate::app::{GraphView, HistoryView, LoadDetailError, ReadLogError, StatusReportError};
use crate::domain::{Checkpoint, CommitRecord, SessionGrouping};
use crate::infra::{
    CheckpointHeadTracker, CheckpointResolution, CheckpointStore, GraphConfig,
    LoadActiveSessionsError, ResolveCheckpointError, RunGitError, WatchSignal, git_dir,
    watch_active_sessions_dir,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WATCH_INTERVAL_SECS: u64 = 30;
const SUBJECT_WIDTH: usize = 72;
const PROMPT_WIDTH: usize = 60;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Command {
        repo: Option<PathBuf>,
        command: CliCommand,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Log { limit: Option<usize>, json: bool },
    Sessions { limit: Option<usize>, json: bool },
    Graph { limit: Option<usize>, json: bool },
    Checkpoint { id: String, json: bool },
    Detail {
        id: String,
        limit: Option<usize>,
        json: bool,
    },
    Active { json: bool },
    Status { json: bool },
    Watch { interval: Duration },
}

impl CliCommand {
    /// Commit window requested on the command line, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Log { limit, .. }
            | Self::Sessions { limit, .. }
            | Self::Graph { limit, .. }
            | Self::Detail { limit, .. } => *limit,
            Self::Checkpoint { .. } | Self::Active { .. } | Self::Status { .. } | Self::Watch { .. } => {
                None
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("missing checkpoint id for `{0}`")]
    MissingCheckpointId(String),
}

/// Flags shared by the history-reading subcommands.
#[derive(Default)]
struct CommonFlags {
    limit: Option<usize>,
    json: bool,
    interval: Option<Duration>,
    id: Option<String>,
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1).peekable();
    let mut repo: Option<PathBuf> = None;
    while let Some(arg) = iter.peek() {
        match arg.as_str() {
            "--repo" | "-C" => {
                let _ = iter.next();
                let value = iter
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--repo".to_string()))?;
                repo = Some(PathBuf::from(value));
            }
            "--" => {
                let _ = iter.next();
                break;
            }
            _ => break,
        }
    }

    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::Command {
            repo,
            command: CliCommand::Log {
                limit: None,
                json: false,
            },
        });
    };

    let name = subcommand.as_str();
    let (accepts_limit, accepts_id, accepts_interval) = match name {
        "log" | "sessions" | "graph" => (true, false, false),
        "checkpoint" => (false, true, false),
        "detail" => (true, true, false),
        "active" | "status" => (false, false, false),
        "watch" => (false, false, true),
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    let mut flags = CommonFlags::default();
    let mut args = iter.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--limit" | "-n" if accepts_limit => {
                let value = args
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--limit".to_string()))?;
                flags.limit = Some(parse_positive_flag("--limit", value)?);
            }
            "--json" if name != "watch" => {
                flags.json = true;
            }
            "--interval" if accepts_interval => {
                let value = args
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--interval".to_string()))?;
                let seconds = parse_positive_flag("--interval", value)?;
                flags.interval = Some(Duration::from_secs(seconds as u64));
            }
            _ if arg.starts_with('-') => {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
            _ => {
                if !accepts_id || flags.id.is_some() {
                    return Err(CliParseError::UnexpectedArgument(arg.to_string()));
                }
                flags.id = Some(arg.to_string());
            }
        }
    }

    let CommonFlags {
        limit,
        json,
        interval,
        id,
    } = flags;
    let require_id =
        |id: Option<String>| id.ok_or_else(|| CliParseError::MissingCheckpointId(name.to_string()));

    let command = match name {
        "log" => CliCommand::Log { limit, json },
        "sessions" => CliCommand::Sessions { limit, json },
        "graph" => CliCommand::Graph { limit, json },
        "checkpoint" => CliCommand::Checkpoint {
            id: require_id(id)?,
            json,
        },
        "detail" => CliCommand::Detail {
            id: require_id(id)?,
            limit,
            json,
        },
        "active" => CliCommand::Active { json },
        "status" => CliCommand::Status { json },
        _ => CliCommand::Watch {
            interval: interval.unwrap_or(Duration::from_secs(DEFAULT_WATCH_INTERVAL_SECS)),
        },
    };

    Ok(CliInvocation::Command { repo, command })
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    ReadLog(#[from] ReadLogError),

    #[error(transparent)]
    ResolveCheckpoint(#[from] ResolveCheckpointError),

    #[error(transparent)]
    LoadDetail(#[from] LoadDetailError),

    #[error(transparent)]
    ActiveSessions(#[from] LoadActiveSessionsError),

    #[error(transparent)]
    Status(#[from] StatusReportError),

    #[error(transparent)]
    Git(#[from] RunGitError),

    #[error("failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn run(command: CliCommand, mut config: GraphConfig) -> Result<(), CliRunError> {
    if let Some(limit) = command.limit() {
        config.max_commits = limit;
    }
    let view = HistoryView::open(config);

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let stderr = io::stderr();
    let mut err = io::BufWriter::new(stderr.lock());

    let result = execute(&command, &view, &mut out, &mut err);
    out.flush()?;
    err.flush()?;
    result
}

/// Runs `command` against `view`. Only `watch` loops.
pub fn execute<S: CheckpointStore>(
    command: &CliCommand,
    view: &HistoryView<S>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Log { json, .. } => {
            let commits = view.commits()?;
            if *json {
                write_json(out, &commits)?;
                return Ok(());
            }
            for commit in &commits {
                if !write_line(out, &format_log_line(commit))? {
                    return Ok(());
                }
            }
            Ok(())
        }
        CliCommand::Sessions { json, .. } => {
            let grouping = view.sessions()?;
            report_backfill_failures(err, &grouping)?;
            if *json {
                write_json(out, &grouping.groups)?;
                return Ok(());
            }
            print_sessions(out, &grouping)?;
            Ok(())
        }
        CliCommand::Graph { json, .. } => {
            let graph = view.layout()?;
            if *json {
                write_json(out, &graph)?;
                return Ok(());
            }
            print_graph(out, &graph)?;
            Ok(())
        }
        CliCommand::Checkpoint { id, json } => {
            let resolution = view.checkpoint(id)?;
            report_skipped(err, &resolution)?;
            if *json {
                write_json(out, &resolution)?;
                return Ok(());
            }
            print_checkpoint(out, &resolution.checkpoint)?;
            Ok(())
        }
        CliCommand::Detail { id, json, .. } => {
            let detail = view.detail(id)?;
            if *json {
                write_json(out, &detail)?;
                return Ok(());
            }
            let commit = &detail.commit;
            let refs = commit.display_refs().join(", ");
            let lines = [
                format!("commit\t{}", commit.hash),
                format!("author\t{} <{}>", commit.author, commit.author_email),
                format!("date\t{}", commit.date),
                format!("subject\t{}", commit.subject),
                format!("refs\t{}", if refs.is_empty() { "-" } else { &refs }),
                format!(
                    "attribution\t{}",
                    commit.attribution.as_deref().unwrap_or("-")
                ),
            ];
            for line in &lines {
                if !write_line(out, line)? {
                    return Ok(());
                }
            }
            match (&detail.checkpoint, &detail.checkpoint_error) {
                (Some(checkpoint), _) => {
                    print_checkpoint(out, checkpoint)?;
                }
                (None, Some(error)) => {
                    write_line(err, &format!("checkpoint unavailable: {error}"))?;
                }
                (None, None) => {}
            }
            Ok(())
        }
        CliCommand::Active { json } => {
            let active = view.active_sessions()?;
            if active.skipped.get() > 0
                && !write_line(err, &format!("skipped: {}", active.skipped.get()))?
            {
                return Ok(());
            }
            if *json {
                write_json(out, &active.sessions)?;
                return Ok(());
            }
            for session in &active.sessions {
                let line = format!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    session.started_at,
                    session.session_id,
                    session.agent_type,
                    session.phase,
                    session.checkpoint_count,
                    truncate_end(&single_line(&session.first_prompt), PROMPT_WIDTH)
                );
                if !write_line(out, &line)? {
                    return Ok(());
                }
            }
            Ok(())
        }
        CliCommand::Status { json } => {
            let report = view.status()?;
            if *json {
                write_json(out, &report)?;
                return Ok(());
            }
            let (strategy, cli_version) = match &report.settings {
                Some(settings) => (settings.strategy.as_str(), settings.cli_version.as_str()),
                None => ("-", "-"),
            };
            let cli = if report.cli_installed {
                "cli-installed"
            } else {
                "cli-missing"
            };
            write_line(
                out,
                &format!("{}\t{strategy}\t{cli_version}\t{cli}", report.status.label()),
            )?;
            Ok(())
        }
        CliCommand::Watch { interval } => watch(view, *interval, out, err),
    }
}

/// Prints sessions, then reprints them whenever the active-session files or
/// the checkpoint reference change. Returns when stdout goes away.
fn watch<S: CheckpointStore>(
    view: &HistoryView<S>,
    interval: Duration,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), CliRunError> {
    let reference = view.config().checkpoint_ref.clone();
    let mut tracker = CheckpointHeadTracker::default();
    tracker.poll(view.repo_dir(), &reference)?;

    let mut watcher = match git_dir(view.repo_dir())
        .map_err(|error| error.to_string())
        .and_then(|dir| watch_active_sessions_dir(&dir).map_err(|error| error.to_string()))
    {
        Ok(watcher) => Some(watcher),
        Err(error) => {
            tracing::warn!(%error, "active-session watcher unavailable, polling only");
            None
        }
    };

    if !refresh_sessions(view, out, err)? {
        return Ok(());
    }

    loop {
        let signal = match watcher.as_mut() {
            Some(watcher) => watcher.recv_timeout(interval),
            None => {
                std::thread::sleep(interval);
                None
            }
        };
        let files_changed = match signal {
            Some(WatchSignal::Changed) => true,
            Some(WatchSignal::Error(error)) => {
                tracing::warn!(%error, "active-session watcher error");
                false
            }
            None => false,
        };
        let head_moved = tracker.poll(view.repo_dir(), &reference)?;
        if !(files_changed || head_moved) {
            continue;
        }
        if !write_line(out, "")? || !refresh_sessions(view, out, err)? {
            return Ok(());
        }
    }
}

fn refresh_sessions<S: CheckpointStore>(
    view: &HistoryView<S>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<bool, CliRunError> {
    let grouping = view.sessions()?;
    report_backfill_failures(err, &grouping)?;
    if !print_sessions(out, &grouping)? {
        return Ok(false);
    }
    let active = view.active_sessions()?;
    let keep_going = write_line(out, &format!("active: {}", active.sessions.len()))?;
    out.flush()?;
    Ok(keep_going)
}

fn format_log_line(commit: &CommitRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        commit.abbreviated_hash,
        commit.date,
        commit.agent.as_deref().unwrap_or("-"),
        truncate_end(&commit.subject, SUBJECT_WIDTH)
    )
}

fn print_sessions(out: &mut impl Write, grouping: &SessionGrouping) -> io::Result<bool> {
    for group in &grouping.groups {
        let line = format!(
            "{}\t{}\t{}\t{}",
            group.last_activity_at,
            group.session_id,
            group.agent,
            group.commits.len()
        );
        if !write_line(out, &line)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn print_graph(out: &mut impl Write, graph: &GraphView) -> io::Result<bool> {
    for row in &graph.rows {
        let line = format!(
            "{}\t{}\t{}\t{}",
            row.lane.lane,
            row.lane.color.token(),
            row.commit.abbreviated_hash,
            truncate_end(&row.commit.subject, SUBJECT_WIDTH)
        );
        if !write_line(out, &line)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn print_checkpoint(out: &mut impl Write, checkpoint: &Checkpoint) -> io::Result<bool> {
    let mut lines = vec![
        format!("checkpoint\t{}", checkpoint.checkpoint_id),
        format!("strategy\t{}", checkpoint.strategy),
        format!("branch\t{}", checkpoint.branch),
    ];
    for session in &checkpoint.sessions {
        let tokens = session
            .token_usage
            .as_ref()
            .map(|usage| usage.total().to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "session\t{}\t{}\t{}\t{}",
            session.session_id, session.agent, session.created_at, tokens
        ));
    }
    for task in &checkpoint.tasks {
        lines.push(format!(
            "task\t{}\t{}\t{}",
            task.tool_use_id, task.agent_id, task.session_id
        ));
    }
    for line in &lines {
        if !write_line(out, line)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn report_skipped(err: &mut impl Write, resolution: &CheckpointResolution) -> io::Result<()> {
    for skipped in &resolution.skipped {
        let line = format!(
            "skipped {}\t{}\t{}",
            skipped.kind.label(),
            skipped.path,
            skipped.reason
        );
        if !write_line(err, &line)? {
            break;
        }
    }
    Ok(())
}

fn report_backfill_failures(err: &mut impl Write, grouping: &SessionGrouping) -> io::Result<()> {
    let count = grouping.backfill_failures.len();
    if count > 0 {
        write_line(err, &format!("unresolved checkpoints: {count}"))?;
    }
    Ok(())
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> Result<bool, CliRunError> {
    let rendered = serde_json::to_string_pretty(value)?;
    Ok(write_line(out, &rendered)?)
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_end(text: &str, width: usize) -> String {
    if unicode_width::UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width - 1 {
            break;
        }
        used += ch_width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

fn parse_positive_flag(flag: &str, value: &str) -> Result<usize, CliParseError> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }),
    }
}
