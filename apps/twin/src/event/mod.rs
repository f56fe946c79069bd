pub mod loop_handler;
pub mod watcher;

pub use loop_handler::{run, run_headless, run_what_if, Cadence, Dashboard};
pub use watcher::ViewportWatcher;
