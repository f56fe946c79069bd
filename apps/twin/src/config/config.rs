use crate::geo::{BboxParseError, BoundingBox};
use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    Number { var: &'static str, value: String },
    #[error("{var} is not a valid bbox: {source}")]
    View {
        var: &'static str,
        #[source]
        source: BboxParseError,
    },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Runtime settings for the twin client.
#[derive(Debug, Clone, PartialEq)]
pub struct TwinConfig {
    pub api_url: String,
    /// Initial map view, also used by the one-shot modes.
    pub view: BoundingBox,
    pub timeout: Duration,
    pub debounce: Duration,
    pub sensor_interval: Duration,
    pub trend_interval: Duration,
    pub kpi_interval: Duration,
    pub risk_interval: Duration,
    pub trend_hours: u32,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            view: BoundingBox::world(),
            timeout: Duration::from_millis(8_000),
            debounce: Duration::from_millis(250),
            sensor_interval: Duration::from_millis(5_000),
            trend_interval: Duration::from_millis(10_000),
            kpi_interval: Duration::from_millis(15_000),
            risk_interval: Duration::from_millis(5_000),
            trend_hours: 24,
        }
    }
}

impl TwinConfig {
    /// Builds a config from a variable lookup, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = match lookup("TWIN_API_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    var: "TWIN_API_URL",
                })
            }
            Some(url) => url.trim().to_string(),
            None => defaults.api_url,
        };

        let view = match lookup("TWIN_VIEW") {
            Some(raw) => raw.parse().map_err(|source| ConfigError::View {
                var: "TWIN_VIEW",
                source,
            })?,
            None => defaults.view,
        };

        let millis = |var: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64, _>(&lookup, var)?.map_or(fallback, Duration::from_millis))
        };

        Ok(Self {
            api_url,
            view,
            timeout: millis("TWIN_TIMEOUT_MS", defaults.timeout)?,
            debounce: millis("TWIN_DEBOUNCE_MS", defaults.debounce)?,
            sensor_interval: millis("TWIN_SENSOR_INTERVAL_MS", defaults.sensor_interval)?,
            trend_interval: millis("TWIN_TREND_INTERVAL_MS", defaults.trend_interval)?,
            kpi_interval: millis("TWIN_KPI_INTERVAL_MS", defaults.kpi_interval)?,
            risk_interval: millis("TWIN_RISK_INTERVAL_MS", defaults.risk_interval)?,
            trend_hours: parse_var(&lookup, "TWIN_TREND_HOURS")?.unwrap_or(defaults.trend_hours),
        })
    }
}

// Zero is rejected: every numeric setting is a period or a window length.
fn parse_var<T, L>(lookup: &L, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    L: Fn(&'static str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(Some(value)),
        _ => Err(ConfigError::Number { var, value: raw }),
    }
}

/// Initializes the application configuration from `.env` and the process
/// environment.
pub fn init_app_config() -> color_eyre::eyre::Result<TwinConfig> {
    dotenv().ok();
    let config = TwinConfig::from_lookup(|var| env::var(var).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> = pairs
            .iter()
            .map(|(k, v)| (*k, (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = TwinConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TwinConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.view.to_string(), "-180,-85,180,85");
    }

    #[test]
    fn overrides_are_read() {
        let config = TwinConfig::from_lookup(lookup(&[
            ("TWIN_API_URL", "https://twin.example.org/"),
            ("TWIN_VIEW", "77.5, 12.9, 77.7, 13.1"),
            ("TWIN_SENSOR_INTERVAL_MS", "1000"),
            ("TWIN_TREND_HOURS", "6"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://twin.example.org/");
        assert_eq!(config.view.min_lat, 12.9);
        assert_eq!(config.sensor_interval, Duration::from_secs(1));
        assert_eq!(config.trend_hours, 6);
        assert_eq!(config.kpi_interval, Duration::from_secs(15));
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = TwinConfig::from_lookup(lookup(&[("TWIN_DEBOUNCE_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: "TWIN_DEBOUNCE_MS", .. }));

        let err = TwinConfig::from_lookup(lookup(&[("TWIN_TREND_HOURS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Number { var: "TWIN_TREND_HOURS", .. }));

        let err = TwinConfig::from_lookup(lookup(&[("TWIN_VIEW", "1,2,3")])).unwrap_err();
        assert!(matches!(err, ConfigError::View { .. }));

        let err = TwinConfig::from_lookup(lookup(&[("TWIN_API_URL", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }
}
