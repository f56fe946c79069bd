use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rain,
    Temp,
    Humidity,
}

impl Metric {
    pub const ALL: [Self; 3] = [Self::Rain, Self::Temp, Self::Humidity];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rain => "rain",
            Self::Temp => "temp",
            Self::Humidity => "humidity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "rain" => Some(Self::Rain),
            "temp" => Some(Self::Temp),
            "humidity" => Some(Self::Humidity),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Rain => "Rain",
            Self::Temp => "Temperature",
            Self::Humidity => "Humidity",
        }
    }
}

/// Risk bucket shared by sensor markers, zone polygons and the risk banner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const HIGH_THRESHOLD: f64 = 70.0;
    pub const MEDIUM_THRESHOLD: f64 = 40.0;

    /// Buckets a 0-100 risk score. Absent and NaN scores count as 0.
    pub fn from_score(score: Option<f64>) -> Self {
        let score = score.filter(|s| !s.is_nan()).unwrap_or(0.0);
        if score >= Self::HIGH_THRESHOLD {
            Self::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            Self::Low => "#22c55e",
            Self::Medium => "#f59e0b",
            Self::High => "#ef4444",
        }
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = String::deserialize(deserializer)?;
        Self::parse(&value).ok_or_else(|| D::Error::custom(format!("unknown risk level: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Roads,
    RiskZones,
    Sensors,
}

impl LayerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roads => "roads",
            Self::RiskZones => "zones",
            Self::Sensors => "sensors",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Roads => "Roads",
            Self::RiskZones => "Risk zones",
            Self::Sensors => "Sensors",
        }
    }
}
