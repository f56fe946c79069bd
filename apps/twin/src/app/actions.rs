use crate::api::{safe_get, DataSource, FeatureCollection, Query, RiskReading, SensorPoint};
use crate::app::state::{Effect, Event, Ticket, TwinSnapshot, TwinState};
use crate::app::trends::poll_trends;
use crate::domain::LayerKind;
use crate::geo::BoundingBox;
use futures::future::join_all;
use std::sync::Arc;

/// Fetch side of the dashboard: turns effects into result events.
///
/// Every call goes through [`safe_get`], so no method here can fail; a failed
/// fetch shows up as an absent payload in the returned event.
#[derive(Debug)]
pub struct TwinActions<S> {
    source: Arc<S>,
    trend_hours: u32,
}

impl<S> Clone for TwinActions<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            trend_hours: self.trend_hours,
        }
    }
}

impl<S: DataSource> TwinActions<S> {
    pub const fn new(source: Arc<S>, trend_hours: u32) -> Self {
        Self {
            source,
            trend_hours,
        }
    }

    pub async fn fetch(&self, ticket: Ticket) -> Event {
        let source = self.source.as_ref();
        match ticket.layer {
            LayerKind::Roads => Event::LayerLoaded {
                ticket,
                payload: safe_get::<_, Option<FeatureCollection>>(
                    source,
                    &Query::roads(&ticket.bbox),
                    None,
                )
                .await,
            },
            LayerKind::RiskZones => Event::LayerLoaded {
                ticket,
                payload: safe_get::<_, Option<FeatureCollection>>(
                    source,
                    &Query::zones(&ticket.bbox),
                    None,
                )
                .await,
            },
            LayerKind::Sensors => Event::SensorsLoaded {
                ticket,
                points: safe_get::<_, Option<Vec<SensorPoint>>>(
                    source,
                    &Query::sensors(&ticket.bbox),
                    None,
                )
                .await,
            },
        }
    }

    pub async fn trends(&self) -> Event {
        Event::TrendsMerged(poll_trends(self.source.as_ref(), self.trend_hours).await)
    }

    pub async fn kpis(&self) -> Event {
        Event::KpisLoaded(safe_get(self.source.as_ref(), &Query::kpis(), None).await)
    }

    pub async fn risk(&self) -> Event {
        let reading = safe_get(
            self.source.as_ref(),
            &Query::latest_risk(),
            RiskReading::default(),
        )
        .await;
        Event::RiskLoaded(reading)
    }

    /// Scenario risk for sustained rain, computed server-side.
    pub async fn what_if(&self, rain_mm_per_hour: f64, hours: u32) -> RiskReading {
        safe_get(
            self.source.as_ref(),
            &Query::what_if(rain_mm_per_hour, hours),
            RiskReading::default(),
        )
        .await
    }

    /// Loads every layer for `bbox` once, plus trends, KPIs and risk, without timers.
    pub async fn load_once(&self, bbox: BoundingBox) -> TwinSnapshot {
        let mut state = TwinState::new();
        let effects = state.handle(Event::Viewport(bbox));

        let fetches = effects.into_iter().filter_map(|effect| match effect {
            Effect::Fetch(ticket) => Some(self.fetch(ticket)),
            Effect::StartSensorPolling | Effect::RiskAlert(_) => None,
        });
        let (layers, trends, kpis, risk) = tokio::join!(
            join_all(fetches),
            self.trends(),
            self.kpis(),
            self.risk()
        );

        for event in layers.into_iter().chain([trends, kpis, risk]) {
            state.handle(event);
        }
        state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedSource;
    use crate::domain::RiskLevel;
    use serde_json::json;

    fn bbox() -> BoundingBox {
        "77.5,12.9,77.7,13.1".parse().unwrap()
    }

    fn features(risk: u32) -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "geometry": null, "properties": {"risk": risk}}]
        })
    }

    #[tokio::test]
    async fn load_once_fills_every_layer() {
        let source = Arc::new(ScriptedSource::new());
        source.reply("roads", features(0));
        source.reply("zones", features(90));
        source.reply("sensors/latest", json!([{"id": "s1", "lat": 13.0, "lon": 77.6, "risk": 45}]));
        source.reply("timeseries", json!([{"t": "09:00", "value": 2}]));
        source.reply("kpis", json!({"rainfall_mm_24h": 31.2, "active_alerts": 1}));
        source.reply("risk/latest", json!({"score": 72, "level": "High"}));

        let actions = TwinActions::new(Arc::clone(&source), 24);
        let snapshot = actions.load_once(bbox()).await;

        assert_eq!(snapshot.bbox, Some(bbox()));
        assert_eq!(snapshot.roads.payload.as_ref().map(FeatureCollection::len), Some(1));
        assert!(!snapshot.roads.loading);
        let zone_levels = snapshot.zones.payload.as_ref().map(FeatureCollection::levels);
        assert_eq!(zone_levels.and_then(|l| l.get(&RiskLevel::High).copied()), Some(1));
        assert_eq!(snapshot.sensors.payload.as_ref().map(Vec::len), Some(1));
        assert_eq!(snapshot.trends.len(), 1);
        assert_eq!(snapshot.kpis.as_ref().map(|k| k.active_alerts), Some(1));
        assert_eq!(snapshot.risk.as_ref().map(|r| r.level), Some(RiskLevel::High));
        assert!(source
            .calls()
            .contains(&"sensors/latest?bbox=77.5,12.9,77.7,13.1".to_string()));
    }

    #[tokio::test]
    async fn failed_fetches_leave_layers_absent() {
        let source = Arc::new(ScriptedSource::new());
        source.reply("zones", features(10));

        let actions = TwinActions::new(source, 24);
        let snapshot = actions.load_once(bbox()).await;

        assert_eq!(snapshot.roads.payload, None);
        assert!(snapshot.zones.payload.is_some());
        assert_eq!(snapshot.sensors.payload, None);
        assert!(snapshot.trends.is_empty());
        assert_eq!(snapshot.kpis, None);
        assert_eq!(snapshot.risk, Some(RiskReading::default()));
    }

    #[tokio::test]
    async fn what_if_falls_back_to_a_low_reading() {
        let source = Arc::new(ScriptedSource::new());
        let actions = TwinActions::new(Arc::clone(&source), 24);

        let reading = actions.what_if(20.0, 2).await;
        assert_eq!(reading.level, RiskLevel::Low);
        assert_eq!(source.calls(), vec!["whatif?rain_mmhr=20&hours=2".to_string()]);
    }
}
