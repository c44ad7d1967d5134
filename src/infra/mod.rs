mod active_sessions;
mod checkpoints;
mod config;
mod git;
mod repo_status;
mod watch;

pub use active_sessions::*;
pub use checkpoints::*;
pub use config::*;
pub use git::*;
pub use repo_status::*;
pub use watch::*;
