use crate::domain::Metric;
use crate::geo::BoundingBox;
use std::fmt;

/// A read-only GET against the telemetry API: an endpoint path plus query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub endpoint: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Query {
    pub const fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    pub fn roads(bbox: &BoundingBox) -> Self {
        Self::new("roads").param("bbox", bbox)
    }

    pub fn zones(bbox: &BoundingBox) -> Self {
        Self::new("zones").param("bbox", bbox)
    }

    pub fn sensors(bbox: &BoundingBox) -> Self {
        Self::new("sensors/latest").param("bbox", bbox)
    }

    pub fn timeseries(metric: Metric, hours: u32) -> Self {
        Self::new("timeseries")
            .param("metric", metric.as_str())
            .param("hours", hours)
    }

    pub const fn kpis() -> Self {
        Self::new("kpis")
    }

    pub const fn latest_risk() -> Self {
        Self::new("risk/latest")
    }

    pub fn what_if(rain_mm_per_hour: f64, hours: u32) -> Self {
        Self::new("whatif")
            .param("rain_mmhr", rain_mm_per_hour)
            .param("hours", hours)
    }
}

/// Unencoded `endpoint?k=v&...` form, used in logs.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint)?;
        for (index, (key, value)) in self.params.iter().enumerate() {
            let sep = if index == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}
