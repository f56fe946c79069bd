use color_eyre::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{DataSource, HttpSource};
use crate::app::state::{Effect, Event, TwinSnapshot, TwinState};
use crate::app::trends::MergedRecord;
use crate::app::TwinActions;
use crate::config::TwinConfig;
use crate::domain::{LayerKind, Metric, RiskLevel};
use crate::event::watcher::ViewportWatcher;
use crate::geo::{BoundingBox, Viewport};

/// Timer periods for the engine's polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub sensors: Duration,
    pub trends: Duration,
    pub kpis: Duration,
    pub risk: Duration,
}

impl From<&TwinConfig> for Cadence {
    fn from(config: &TwinConfig) -> Self {
        Self {
            sensors: config.sensor_interval,
            trends: config.trend_interval,
            kpis: config.kpi_interval,
            risk: config.risk_interval,
        }
    }
}

fn every(period: Duration) -> Interval {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks
}

// Pends forever until the interval exists.
async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Owns the [`TwinState`] and turns its effects into running fetch tasks.
struct Engine<S> {
    state: TwinState,
    actions: TwinActions<S>,
    cadence: Cadence,
    tasks: JoinSet<()>,
    results: mpsc::Sender<Event>,
    sensor_ticks: Option<Interval>,
    snapshots: watch::Sender<TwinSnapshot>,
}

impl<S: DataSource + 'static> Engine<S> {
    fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let results = self.results.clone();
        self.tasks.spawn(async move {
            // The receiver only goes away at teardown, when results are moot.
            let _ = results.send(job.await).await;
        });
    }

    fn dispatch(&mut self, event: Event) {
        for effect in self.state.handle(event) {
            match effect {
                Effect::Fetch(ticket) => {
                    let actions = self.actions.clone();
                    self.spawn(async move { actions.fetch(ticket).await });
                }
                Effect::StartSensorPolling => {
                    let period = self.cadence.sensors;
                    let mut ticks = interval_at(Instant::now() + period, period);
                    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.sensor_ticks = Some(ticks);
                    debug!(?period, "sensor polling started");
                }
                Effect::RiskAlert(reading) => warn!(
                    score = reading.score,
                    location = reading.location.as_deref().unwrap_or("unknown"),
                    "high rockfall risk"
                ),
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let next = self.state.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn run(
        mut self,
        mut bboxes: broadcast::Receiver<BoundingBox>,
        mut inbox: mpsc::Receiver<Event>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut trend_ticks = every(self.cadence.trends);
        let mut kpi_ticks = every(self.cadence.kpis);
        let mut risk_ticks = every(self.cadence.risk);
        let mut bboxes_open = true;

        info!("engine started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = bboxes.recv(), if bboxes_open => match received {
                    Ok(bbox) => self.dispatch(Event::Viewport(bbox)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "bbox receiver lagged");
                    }
                    Err(RecvError::Closed) => bboxes_open = false,
                },
                Some(event) = inbox.recv() => self.dispatch(event),
                () = next_tick(&mut self.sensor_ticks) => self.dispatch(Event::SensorTick),
                _ = trend_ticks.tick() => {
                    let actions = self.actions.clone();
                    self.spawn(async move { actions.trends().await });
                }
                _ = kpi_ticks.tick() => {
                    let actions = self.actions.clone();
                    self.spawn(async move { actions.kpis().await });
                }
                _ = risk_ticks.tick() => {
                    let actions = self.actions.clone();
                    self.spawn(async move { actions.risk().await });
                }
                Some(joined) = self.tasks.join_next() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(%err, "fetch task panicked");
                        }
                    }
                }
            }
        }

        self.teardown().await;
    }

    async fn teardown(mut self) {
        self.state.handle(Event::Teardown);
        self.sensor_ticks = None;
        self.tasks.shutdown().await;
        info!("engine stopped");
    }
}

/// A running dashboard: the viewport watcher plus the engine behind it.
///
/// Snapshots are published on every state change until [`Dashboard::shutdown`].
#[derive(Debug)]
pub struct Dashboard {
    watcher: ViewportWatcher,
    shutdown: Option<oneshot::Sender<()>>,
    engine: Option<JoinHandle<()>>,
    snapshots: watch::Receiver<TwinSnapshot>,
}

impl Dashboard {
    pub fn start<S>(
        source: Arc<S>,
        viewports: watch::Receiver<Viewport>,
        config: &TwinConfig,
    ) -> Self
    where
        S: DataSource + 'static,
    {
        let mut watcher = ViewportWatcher::new(config.debounce);
        let bboxes = watcher.subscribe();

        let (snapshot_tx, snapshots) = watch::channel(TwinSnapshot::default());
        let (results, inbox) = mpsc::channel(64);
        let (shutdown_tx, shutdown) = oneshot::channel();

        let engine = Engine {
            state: TwinState::new(),
            actions: TwinActions::new(source, config.trend_hours),
            cadence: Cadence::from(config),
            tasks: JoinSet::new(),
            results,
            sensor_ticks: None,
            snapshots: snapshot_tx,
        };
        let engine = tokio::spawn(engine.run(bboxes, inbox, shutdown));
        watcher.start(viewports);

        Self {
            watcher,
            shutdown: Some(shutdown_tx),
            engine: Some(engine),
            snapshots,
        }
    }

    pub fn snapshots(&self) -> watch::Receiver<TwinSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the watcher, cancels every timer and in-flight fetch, and closes
    /// the snapshot channel.
    pub async fn shutdown(mut self) {
        self.watcher.stop().await;
        if let Some(signal) = self.shutdown.take() {
            let _ = signal.send(());
        }
        if let Some(engine) = self.engine.take() {
            if let Err(err) = engine.await {
                warn!(%err, "engine ended abnormally");
            }
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.abort();
        }
    }
}

/// Fetch everything once for the configured view, print it and exit.
pub async fn run_headless(config: &TwinConfig, json: bool) -> Result<()> {
    let source = Arc::new(HttpSource::new(&config.api_url, config.timeout)?);
    let actions = TwinActions::new(source, config.trend_hours);
    let snapshot = actions.load_once(config.view).await;

    if json {
        render_headless_json(&snapshot)?;
    } else {
        render_headless_stats(&snapshot);
    }

    Ok(())
}

pub async fn run_what_if(
    config: &TwinConfig,
    rain_mm_per_hour: f64,
    hours: u32,
    json: bool,
) -> Result<()> {
    let source = Arc::new(HttpSource::new(&config.api_url, config.timeout)?);
    let actions = TwinActions::new(source, config.trend_hours);
    let reading = actions.what_if(rain_mm_per_hour, hours).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reading)?);
    } else {
        println!(
            "What-if {rain_mm_per_hour} mm/h for {hours}h: {} ({:.1}) {}",
            reading.level.label(),
            reading.score,
            reading.level.color()
        );
    }
    Ok(())
}

/// Run the live dashboard, reading one bbox per line from stdin until EOF or Ctrl-C.
pub async fn run(config: &TwinConfig, json: bool) -> Result<()> {
    let source = Arc::new(HttpSource::new(&config.api_url, config.timeout)?);
    let (map, viewports) = watch::channel(config.view.to_viewport());
    let dashboard = Dashboard::start(source, viewports, config);
    let mut snapshots = dashboard.snapshots();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match line.parse::<BoundingBox>() {
                    Ok(bbox) => {
                        map.send_replace(bbox.to_viewport());
                    }
                    Err(err) => warn!(%err, input = line.trim(), "ignoring viewport"),
                },
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if json {
                    println!("{}", serde_json::to_string(&build_headless_stats(&snapshot))?);
                } else {
                    render_headless_stats(&snapshot);
                }
            }
        }
    }

    dashboard.shutdown().await;
    Ok(())
}

fn render_headless_stats(snapshot: &TwinSnapshot) {
    let stats = build_headless_stats(snapshot);

    println!("\nRockfall Twin");
    println!("=============");
    match &stats.bbox {
        Some(bbox) => println!("View: {bbox}"),
        None => println!("View: (waiting)"),
    }

    println!("\nLayers:");
    for layer in &stats.layers {
        let count = layer
            .count
            .map_or_else(|| "(none)".to_string(), |count| count.to_string());
        let loading = if layer.loading { " (loading)" } else { "" };
        println!("- {}: {count}{loading}", layer.name);
    }
    println!("- Placeable sensors: {}", stats.placeable_sensors);

    if !stats.zones_by_level.is_empty() {
        println!("\nZones by Risk:");
        for (level, count) in &stats.zones_by_level {
            println!("- {level}: {count}");
        }
    }

    if !stats.sensors_by_level.is_empty() {
        println!("\nSensors by Risk:");
        for (level, count) in &stats.sensors_by_level {
            println!("- {level}: {count}");
        }
    }

    println!("\nTrends: {} points", stats.trend_points);
    if let Some(latest) = &stats.latest_trend {
        let fields: Vec<String> = Metric::ALL
            .iter()
            .map(|metric| {
                let value = latest
                    .get(*metric)
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
                format!("{} {value}", metric.label())
            })
            .collect();
        println!("- latest {} | {}", latest.t, fields.join(" | "));
    }

    if let Some(kpis) = &stats.kpis {
        println!("\nKPIs:");
        println!("- rainfall 24h: {:.1} mm", kpis.rainfall_mm_24h);
        println!("- temperature: {:.1} C", kpis.temp_c);
        println!("- humidity: {:.0} %", kpis.humidity);
        println!("- active alerts: {}", kpis.active_alerts);
    }

    if let Some(risk) = &stats.risk {
        println!(
            "\nRisk: {} ({:.1}) {}",
            risk.level.label(),
            risk.score,
            risk.location.as_deref().unwrap_or("")
        );
    }
}

fn render_headless_json(snapshot: &TwinSnapshot) -> Result<()> {
    let stats = build_headless_stats(snapshot);
    let json = serde_json::to_string_pretty(&stats)?;
    println!("{json}");
    Ok(())
}

fn build_headless_stats(snapshot: &TwinSnapshot) -> HeadlessStats {
    let sensors = snapshot.sensors.payload.as_deref().unwrap_or_default();

    let mut sensors_by_level: BTreeMap<RiskLevel, usize> = BTreeMap::new();
    for point in sensors {
        *sensors_by_level.entry(point.level()).or_insert(0) += 1;
    }

    let zones_by_level = snapshot
        .zones
        .payload
        .as_ref()
        .map(|zones| zones.levels())
        .unwrap_or_default();

    let by_name = |levels: BTreeMap<RiskLevel, usize>| -> Vec<(String, usize)> {
        levels
            .into_iter()
            .map(|(level, count)| (level.as_str().to_string(), count))
            .collect()
    };

    HeadlessStats {
        bbox: snapshot.bbox.map(|bbox| bbox.to_string()),
        layers: vec![
            HeadlessLayer {
                name: LayerKind::Roads.label(),
                count: snapshot.roads.payload.as_ref().map(|roads| roads.len()),
                loading: snapshot.roads.loading,
            },
            HeadlessLayer {
                name: LayerKind::RiskZones.label(),
                count: snapshot.zones.payload.as_ref().map(|zones| zones.len()),
                loading: snapshot.zones.loading,
            },
            HeadlessLayer {
                name: LayerKind::Sensors.label(),
                count: snapshot.sensors.payload.as_ref().map(Vec::len),
                loading: snapshot.sensors.loading,
            },
        ],
        placeable_sensors: sensors.iter().filter(|point| point.is_placeable()).count(),
        zones_by_level: by_name(zones_by_level),
        sensors_by_level: by_name(sensors_by_level),
        trend_points: snapshot.trends.len(),
        latest_trend: snapshot.trends.last().cloned(),
        kpis: snapshot.kpis.clone(),
        risk: snapshot.risk.clone(),
    }
}

#[derive(serde::Serialize)]
struct HeadlessStats {
    bbox: Option<String>,
    layers: Vec<HeadlessLayer>,
    placeable_sensors: usize,
    zones_by_level: Vec<(String, usize)>,
    sensors_by_level: Vec<(String, usize)>,
    trend_points: usize,
    latest_trend: Option<MergedRecord>,
    kpis: Option<crate::api::Kpis>,
    risk: Option<crate::api::RiskReading>,
}

#[derive(serde::Serialize)]
struct HeadlessLayer {
    name: &'static str,
    count: Option<usize>,
    loading: bool,
}
