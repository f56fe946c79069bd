use crate::domain::RiskLevel;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// Accepts numbers and numeric strings; anything else reads as absent.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// Sensor ids arrive as strings or integers depending on the backend.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// GeoJSON feature collection. Geometry stays opaque; only properties are inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "FeatureCollection::default_kind")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Value,
}

impl FeatureCollection {
    fn default_kind() -> String {
        "FeatureCollection".to_string()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature counts per risk bucket.
    pub fn levels(&self) -> BTreeMap<RiskLevel, usize> {
        let mut counts = BTreeMap::new();
        for feature in &self.features {
            *counts.entry(feature.risk_level()).or_insert(0) += 1;
        }
        counts
    }
}

impl Feature {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Zone styling bucket from `properties.risk`, which may be a score or a level name.
    pub fn risk_level(&self) -> RiskLevel {
        match self.property("risk").or_else(|| self.property("level")) {
            Some(Value::Number(n)) => RiskLevel::from_score(n.as_f64()),
            Some(Value::String(s)) => RiskLevel::parse(s)
                .unwrap_or_else(|| RiskLevel::from_score(s.trim().parse().ok())),
            _ => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub risk: Option<f64>,
    #[serde(default)]
    pub ts: Option<String>,
}

impl SensorPoint {
    /// Stable identity: the id when present, else `lat,lon,ts`.
    pub fn key(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let coord = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{},{},{}",
            coord(self.lat),
            coord(self.lon),
            self.ts.as_deref().unwrap_or("")
        )
    }

    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk)
    }

    /// Points without both coordinates cannot be placed on the map.
    pub const fn is_placeable(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    #[serde(default)]
    pub rainfall_mm_24h: f64,
    #[serde(default)]
    pub temp_c: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub active_alerts: u32,
}

#[derive(Deserialize)]
struct RawRiskReading {
    #[serde(default, deserialize_with = "lenient_f64")]
    risk: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    score: Option<f64>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    t: Option<String>,
}

/// Latest site risk. The score arrives as `risk` or `score`; a missing or
/// unknown level is derived from the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRiskReading")]
pub struct RiskReading {
    pub score: f64,
    pub level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl From<RawRiskReading> for RiskReading {
    fn from(raw: RawRiskReading) -> Self {
        let score = raw.risk.or(raw.score);
        let level = raw
            .level
            .as_deref()
            .and_then(RiskLevel::parse)
            .unwrap_or_else(|| RiskLevel::from_score(score));
        Self {
            score: score.unwrap_or(0.0),
            level,
            location: raw.location,
            t: raw.t,
        }
    }
}
