use crate::api::{FeatureCollection, Kpis, RiskReading, SensorPoint};
use crate::app::trends::MergedRecord;
use crate::domain::{LayerKind, RiskLevel};
use crate::geo::BoundingBox;
use serde::Serialize;
use tracing::{debug, warn};

/// Identifies one layer request and the bbox it was issued for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticket {
    pub id: u64,
    pub layer: LayerKind,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Applied,
    /// Fetch failed; the previous payload stays in place.
    KeptStale,
    /// A newer bbox or a newer response already won.
    Superseded,
}

/// One independently refreshed overlay.
#[derive(Debug, Clone)]
pub struct LayerSlot<T> {
    pub payload: Option<T>,
    pub last_bbox: Option<BoundingBox>,
    outstanding: usize,
    applied: u64,
}

impl<T> Default for LayerSlot<T> {
    fn default() -> Self {
        Self {
            payload: None,
            last_bbox: None,
            outstanding: 0,
            applied: 0,
        }
    }
}

impl<T> LayerSlot<T> {
    pub const fn in_flight(&self) -> bool {
        self.outstanding > 0
    }

    fn begin(&mut self, bbox: BoundingBox) {
        self.last_bbox = Some(bbox);
        self.outstanding += 1;
    }

    /// Applies a response only if it was issued for `current` and is newer
    /// than the last applied one. Failures never clear the payload.
    fn settle(&mut self, ticket: &Ticket, current: Option<BoundingBox>, outcome: Option<T>) -> Settle {
        self.outstanding = self.outstanding.saturating_sub(1);

        if current != Some(ticket.bbox) || ticket.id <= self.applied {
            return Settle::Superseded;
        }

        match outcome {
            Some(payload) => {
                self.payload = Some(payload);
                self.applied = ticket.id;
                Settle::Applied
            }
            None => Settle::KeptStale,
        }
    }
}

#[derive(Debug)]
pub enum Event {
    /// A debounced viewport publication.
    Viewport(BoundingBox),
    SensorTick,
    LayerLoaded {
        ticket: Ticket,
        payload: Option<FeatureCollection>,
    },
    SensorsLoaded {
        ticket: Ticket,
        points: Option<Vec<SensorPoint>>,
    },
    TrendsMerged(Vec<MergedRecord>),
    KpisLoaded(Option<Kpis>),
    RiskLoaded(RiskReading),
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(Ticket),
    StartSensorPolling,
    RiskAlert(RiskReading),
}

/// Everything the dashboard shows, independent of any renderer.
///
/// `handle` is the only mutator: inputs are viewport events, timer ticks and
/// fetch results; outputs are the fetches to issue. After `Teardown` every
/// input is ignored.
#[derive(Debug, Default)]
pub struct TwinState {
    bbox: Option<BoundingBox>,
    next_request: u64,
    torn_down: bool,
    pub roads: LayerSlot<FeatureCollection>,
    pub zones: LayerSlot<FeatureCollection>,
    pub sensors: LayerSlot<Vec<SensorPoint>>,
    pub trends: Vec<MergedRecord>,
    pub kpis: Option<Kpis>,
    pub risk: Option<RiskReading>,
}

impl TwinState {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub const fn is_live(&self) -> bool {
        !self.torn_down
    }

    fn ticket(&mut self, layer: LayerKind, bbox: BoundingBox) -> Ticket {
        self.next_request += 1;
        let ticket = Ticket {
            id: self.next_request,
            layer,
            bbox,
        };
        match layer {
            LayerKind::Roads => self.roads.begin(bbox),
            LayerKind::RiskZones => self.zones.begin(bbox),
            LayerKind::Sensors => self.sensors.begin(bbox),
        }
        ticket
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        if self.torn_down {
            debug!(?event, "ignoring input after teardown");
            return Vec::new();
        }

        match event {
            Event::Viewport(bbox) => {
                let first = self.bbox.is_none();
                self.bbox = Some(bbox);

                let mut effects = vec![
                    Effect::Fetch(self.ticket(LayerKind::Roads, bbox)),
                    Effect::Fetch(self.ticket(LayerKind::RiskZones, bbox)),
                ];
                if first {
                    effects.push(Effect::StartSensorPolling);
                    effects.push(Effect::Fetch(self.ticket(LayerKind::Sensors, bbox)));
                }
                effects
            }
            Event::SensorTick => match self.bbox {
                Some(bbox) => vec![Effect::Fetch(self.ticket(LayerKind::Sensors, bbox))],
                None => Vec::new(),
            },
            Event::LayerLoaded { ticket, payload } => {
                let current = self.bbox;
                let slot = match ticket.layer {
                    LayerKind::Roads => &mut self.roads,
                    LayerKind::RiskZones => &mut self.zones,
                    LayerKind::Sensors => {
                        warn!(id = ticket.id, "feature payload tagged as sensors, dropping");
                        return Vec::new();
                    }
                };
                log_settle(&ticket, slot.settle(&ticket, current, payload));
                Vec::new()
            }
            Event::SensorsLoaded { ticket, points } => {
                let current = self.bbox;
                log_settle(&ticket, self.sensors.settle(&ticket, current, points));
                Vec::new()
            }
            Event::TrendsMerged(records) => {
                self.trends = records;
                Vec::new()
            }
            Event::KpisLoaded(kpis) => {
                if kpis.is_some() {
                    self.kpis = kpis;
                }
                Vec::new()
            }
            Event::RiskLoaded(reading) => {
                let was_high = self.risk.as_ref().is_some_and(|r| r.level == RiskLevel::High);
                let alert = reading.level == RiskLevel::High && !was_high;
                self.risk = Some(reading.clone());
                if alert {
                    vec![Effect::RiskAlert(reading)]
                } else {
                    Vec::new()
                }
            }
            Event::Teardown => {
                self.torn_down = true;
                Vec::new()
            }
        }
    }

    pub fn snapshot(&self) -> TwinSnapshot {
        TwinSnapshot {
            bbox: self.bbox,
            roads: LayerView::of(&self.roads),
            zones: LayerView::of(&self.zones),
            sensors: LayerView::of(&self.sensors),
            trends: self.trends.clone(),
            kpis: self.kpis.clone(),
            risk: self.risk.clone(),
        }
    }
}

fn log_settle(ticket: &Ticket, settle: Settle) {
    match settle {
        Settle::Applied => debug!(layer = ticket.layer.as_str(), id = ticket.id, "layer updated"),
        Settle::KeptStale => debug!(
            layer = ticket.layer.as_str(),
            id = ticket.id,
            "layer fetch failed, keeping last payload"
        ),
        Settle::Superseded => debug!(
            layer = ticket.layer.as_str(),
            id = ticket.id,
            bbox = %ticket.bbox,
            "discarding superseded response"
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerView<T> {
    pub payload: Option<T>,
    pub loading: bool,
}

impl<T: Clone> LayerView<T> {
    fn of(slot: &LayerSlot<T>) -> Self {
        Self {
            payload: slot.payload.clone(),
            loading: slot.in_flight(),
        }
    }
}

impl<T> Default for LayerView<T> {
    fn default() -> Self {
        Self {
            payload: None,
            loading: false,
        }
    }
}

/// Published, read-only copy of [`TwinState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TwinSnapshot {
    pub bbox: Option<BoundingBox>,
    pub roads: LayerView<FeatureCollection>,
    pub zones: LayerView<FeatureCollection>,
    pub sensors: LayerView<Vec<SensorPoint>>,
    pub trends: Vec<MergedRecord>,
    pub kpis: Option<Kpis>,
    pub risk: Option<RiskReading>,
}
