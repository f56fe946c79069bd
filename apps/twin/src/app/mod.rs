// App module for the rockfall twin
// Handles dashboard state and the fetches that feed it

pub mod actions;
pub mod state;
pub mod trends;

pub use actions::TwinActions;
pub use state::{Effect, Event, TwinSnapshot, TwinState};
pub use trends::{merge_series, MergedRecord, MetricSample};
