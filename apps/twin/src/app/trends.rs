//! Aligns independently polled metric streams into one chart-ready series.
//!
//! Each metric arrives as its own sequence of samples, possibly on a
//! different sampling grid and in any order. Samples are normalized at the
//! boundary, keyed by timestamp, and the resulting records are sorted by
//! chronological value rather than string order.

use crate::api::{safe_get, DataSource, Query};
use crate::domain::Metric;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub timestamp: String,
    pub metric: Metric,
    pub value: Option<f64>,
}

/// One timestamp's values across all metric streams. Missing metrics stay absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedRecord {
    pub t: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl MergedRecord {
    pub fn new(t: impl Into<String>) -> Self {
        Self {
            t: t.into(),
            ..Self::default()
        }
    }

    pub const fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Rain => self.rain,
            Metric::Temp => self.temp,
            Metric::Humidity => self.humidity,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Rain => &mut self.rain,
            Metric::Temp => &mut self.temp,
            Metric::Humidity => &mut self.humidity,
        };
        *slot = value;
    }
}

/// Normalizes a `timeseries` body into samples.
///
/// The body is either a bare array or an object wrapping it under `points`.
/// The timestamp is read from `t` or `ts`, and the value from `value` or the
/// metric's own field name. Entries without a timestamp are dropped.
pub fn decode_samples(metric: Metric, body: &Value) -> Vec<MetricSample> {
    let entries = match body {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match map.get("points") {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| {
            let timestamp = ["t", "ts"]
                .iter()
                .find_map(|key| entry.get(key).and_then(Value::as_str))?;
            let value = entry
                .get("value")
                .filter(|v| !v.is_null())
                .or_else(|| entry.get(metric.as_str()))
                .and_then(Value::as_f64);
            Some(MetricSample {
                timestamp: timestamp.to_string(),
                metric,
                value,
            })
        })
        .collect()
}

/// Sort key for a timestamp: RFC 3339, naive ISO date-time, or a bare time of day.
fn chrono_key(timestamp: &str) -> Option<NaiveDateTime> {
    let timestamp = timestamp.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(instant.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
            return Some(naive);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(timestamp, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    for format in ["%H:%M:%S%.f", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(timestamp, format) {
            return Some(NaiveDateTime::new(NaiveDate::MIN, time));
        }
    }
    None
}

fn chronological(a: &MergedRecord, b: &MergedRecord) -> Ordering {
    match (chrono_key(&a.t), chrono_key(&b.t)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.t.cmp(&b.t),
    }
}

/// Merges metric streams into one record per distinct timestamp, ascending.
///
/// Arrival order of the streams is irrelevant. Unparseable timestamps sort
/// after every parseable one.
pub fn merge_series<I>(streams: I) -> Vec<MergedRecord>
where
    I: IntoIterator<Item = Vec<MetricSample>>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut records: Vec<MergedRecord> = Vec::new();

    for sample in streams.into_iter().flatten() {
        let slot = *index.entry(sample.timestamp.clone()).or_insert_with(|| {
            records.push(MergedRecord::new(sample.timestamp.clone()));
            records.len() - 1
        });
        records[slot].set(sample.metric, sample.value);
    }

    records.sort_by(chronological);
    records
}

/// Fetches all metrics for the trailing window and merges them.
/// A failed metric contributes nothing.
pub async fn poll_trends<S: DataSource>(source: &S, hours: u32) -> Vec<MergedRecord> {
    let fetch = |metric: Metric| async move {
        let body = safe_get(source, &Query::timeseries(metric, hours), Value::Null).await;
        decode_samples(metric, &body)
    };

    let (rain, temp, humidity) = tokio::join!(
        fetch(Metric::Rain),
        fetch(Metric::Temp),
        fetch(Metric::Humidity)
    );

    merge_series([rain, temp, humidity])
}
