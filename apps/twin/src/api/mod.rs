pub mod client;
pub mod models;
pub mod query;
#[cfg(test)]
pub mod testing;

pub use client::{safe_get, DataSource, FetchError, HttpSource};
pub use models::{Feature, FeatureCollection, Kpis, RiskReading, SensorPoint};
pub use query::Query;
