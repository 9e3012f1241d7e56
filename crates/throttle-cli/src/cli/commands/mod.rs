//! CLI command handlers. Each command is in its own file.

mod completions;
mod config;
mod replay;

pub use completions::run_completions;
pub use config::run_config;
pub use replay::{run_replay, ReplayArgs};
