use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    aggregate::{Window, aggregate_window},
    connector::EventSource,
    diff::ChangeDetector,
    error::{PulseError, Result},
    event::{Event, IngestReport, RawEvent},
    hub::BroadcastHub,
    metrics::SystemMetrics,
    score::{ScoreWeights, TrendThresholds},
    snapshot::{Snapshot, SnapshotStore},
    store::EventStore,
};

/// Drives the periodic cycle: poll the source, ingest, aggregate, score,
/// classify, atomically replace the snapshot, diff, broadcast. The steps of
/// one cycle are strictly sequential and two cycles never interleave; this
/// task is the single writer of the snapshot and the detector state.
pub struct Pipeline {
    store: Arc<RwLock<EventStore>>,
    snapshots: Arc<SnapshotStore>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<SystemMetrics>,
    detector: ChangeDetector,
    weights: ScoreWeights,
    thresholds: TrendThresholds,
    source: Option<Box<dyn EventSource>>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<RwLock<EventStore>>,
        snapshots: Arc<SnapshotStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<SystemMetrics>,
        detector: ChangeDetector,
        weights: ScoreWeights,
        thresholds: TrendThresholds,
        source: Option<Box<dyn EventSource>>,
    ) -> Self {
        Self {
            store,
            snapshots,
            hub,
            metrics,
            detector,
            weights,
            thresholds,
            source,
        }
    }

    /// Run cycles at `poll_interval` until `shutdown` flips. Errors inside
    /// a cycle are logged and contained; the loop always reaches the next
    /// scheduled cycle.
    pub async fn run(mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = poll_interval.as_secs(), "pipeline started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!("cycle failed, retaining previous snapshot: {err}");
                    }
                }
                _ = shutdown.changed() => {
                    info!("pipeline shutting down");
                    break;
                }
            }
        }
    }

    /// One full cycle against the wall clock.
    pub async fn tick(&mut self) -> Result<()> {
        if let Some(source) = self.source.as_mut() {
            match source.poll().await {
                Ok(batch) => {
                    let report = self.ingest(batch);
                    debug!(
                        accepted = report.accepted,
                        rejected = report.errors.len(),
                        "source batch ingested"
                    );
                }
                // Keep serving the stale snapshot; the cycle itself still runs.
                Err(err) => {
                    let err = PulseError::UpstreamUnavailable(err.to_string());
                    warn!("{err}");
                }
            }
        }

        self.run_cycle(Utc::now());
        Ok(())
    }

    /// Validate and retain a batch, bumping the event counter.
    pub fn ingest(&self, batch: Vec<RawEvent>) -> IngestReport {
        let (report, _) = self.store.write().ingest_batch(batch);
        self.metrics.record_events(report.accepted as u64);
        report
    }

    /// The deterministic core of one cycle, driven by an explicit `now` so
    /// tests can step it without sleeping. Returns the broadcast messages.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> usize {
        // Everything below is computed from one consistent read of the
        // retained events; the snapshot swap happens only once the full
        // view is built.
        let (aggregates, recent_events) = {
            let mut store = self.store.write();
            store.prune(now);

            let mut aggregates = BTreeMap::new();
            for window in Window::ALL {
                aggregates.insert(
                    window,
                    aggregate_window(store.events_since(now - window.duration()), window, now),
                );
            }
            let recent: Vec<Event> = store
                .events_since(now - ChangeDetector::PRIMARY_WINDOW.duration())
                .cloned()
                .collect();
            (aggregates, recent)
        };

        let snapshot = Snapshot::build(aggregates, &self.weights, &self.thresholds, now);
        self.metrics
            .set_active_repositories(snapshot.active_repositories() as u64);
        self.snapshots.replace(snapshot);

        let snapshot = self.snapshots.load();
        let messages =
            self.detector
                .detect(&snapshot, &recent_events, self.metrics.snapshot(), now);

        let count = messages.len();
        for message in &messages {
            self.hub.broadcast(message, &[]);
        }
        count
    }
}
