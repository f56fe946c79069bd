// Export our modules for use in binaries and tests
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod event;
pub mod geo;
pub mod logging;

pub use domain::{LayerKind, Metric, RiskLevel};
pub use geo::BoundingBox;
