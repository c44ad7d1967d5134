mod app;
mod cli;
mod domain;
mod infra;

use crate::cli::CliInvocation;
use crate::infra::{GraphConfig, LOG_ENV, ResolveConfigError};
use std::io::{self, Write};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ResolveConfigError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),
}

fn main() {
    init_tracing();
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Command { repo, command } => {
            let mut config = GraphConfig::from_env()?;
            if let Some(repo) = repo {
                config.repo_dir = repo;
            }
            crate::cli::run(command, config)?;
            Ok(())
        }
    }
}

fn print_help() {
    let text = format!(
        "{name} - browse agent checkpoints, sessions and the commit graph of a git repository\n\nUSAGE:\n  {name} [--repo DIR] log [--limit N] [--json]        List commits with their agent trailers (default)\n  {name} [--repo DIR] sessions [--limit N] [--json]   Group checkpoint commits into agent sessions\n  {name} [--repo DIR] graph [--limit N] [--json]      Lay out commits in colored lanes\n  {name} [--repo DIR] checkpoint <ID> [--json]        Show a checkpoint's sessions and tasks\n  {name} [--repo DIR] detail <ID> [--limit N] [--json]  Show the commit carrying a checkpoint\n  {name} [--repo DIR] active [--json]                 List sessions that are still running\n  {name} [--repo DIR] status [--json]                 Report whether checkpoints are enabled\n  {name} [--repo DIR] watch [--interval SECS]         Reprint sessions when checkpoints change (default: 30s)\n  {name} --help | --version\n\nFLAGS:\n  -C, --repo DIR   Repository to read (default: current directory)\n  -n, --limit N    Number of commits to read (default: 200)\n  --json           Output structured JSON\n\nOUTPUT:\n  log:      short_hash<TAB>date<TAB>agent<TAB>subject\n  sessions: last_activity<TAB>session_id<TAB>agent<TAB>commit_count\n  graph:    lane<TAB>color<TAB>short_hash<TAB>subject\n  active:   started_at<TAB>session_id<TAB>agent<TAB>phase<TAB>checkpoints<TAB>prompt\n  status:   status<TAB>strategy<TAB>cli_version<TAB>cli-installed|cli-missing\n\nENV:\n  ENTIRE_GRAPH_REPO          Repository directory (overridden by --repo)\n  ENTIRE_CHECKPOINTS_REF     Checkpoint reference (default: entire/checkpoints/v1)\n  ENTIRE_GRAPH_MAX_COMMITS   Commit window (default: 200, overridden by --limit)\n  ENTIRE_GRAPH_LOG           Log filter, e.g. debug or entire_graph=debug (default: warn)\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}
