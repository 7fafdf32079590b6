mod delta_cmd;
mod session_cmd;

pub use delta_cmd::{DiffCommand, MergeCommand};
pub use session_cmd::SessionCommand;
