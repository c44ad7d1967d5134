mod graph;
mod log;
mod metadata;
mod sessions;
mod types;

pub use graph::*;
pub use log::*;
pub use metadata::*;
pub use sessions::*;
pub use types::*;
