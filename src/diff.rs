use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    aggregate::Window,
    event::Event,
    messages::{RankDirection, WsMessage},
    metrics::MetricsSnapshot,
    score::{Momentum, TrendStatus},
    snapshot::Snapshot,
};

/// Minimum counter deltas before a metrics_update is broadcast, damping
/// fan-out volume for high-frequency counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeThresholds {
    pub total_events: u64,
    pub active_repositories: u64,
    pub total_queries: u64,
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            total_events: 10,
            active_repositories: 1,
            total_queries: 5,
        }
    }
}

impl ChangeThresholds {
    fn significant(&self, old: MetricsSnapshot, new: MetricsSnapshot) -> bool {
        old.total_events.abs_diff(new.total_events) >= self.total_events
            || old.active_repositories.abs_diff(new.active_repositories)
                >= self.active_repositories
            || old.total_queries.abs_diff(new.total_queries) >= self.total_queries
    }
}

/// Diffs each new snapshot against the previous cycle's state and emits one
/// typed message per detected change. Per-repo checks run against the 1h
/// window, the shortest and most reactive view.
pub struct ChangeDetector {
    summaries: HashMap<String, String>,
    rankings: HashMap<String, u32>,
    trends: HashMap<String, (TrendStatus, Momentum)>,
    seen_events: HashMap<String, DateTime<Utc>>,
    last_emitted_metrics: Option<MetricsSnapshot>,
    thresholds: ChangeThresholds,
}

impl ChangeDetector {
    pub const PRIMARY_WINDOW: Window = Window::OneHour;

    pub fn new(thresholds: ChangeThresholds) -> Self {
        Self {
            summaries: HashMap::new(),
            rankings: HashMap::new(),
            trends: HashMap::new(),
            seen_events: HashMap::new(),
            last_emitted_metrics: None,
            thresholds,
        }
    }

    /// Run all five change categories and persist the new state as the
    /// baseline for the next cycle, whether or not anything was emitted.
    pub fn detect(
        &mut self,
        snapshot: &Snapshot,
        recent_events: &[Event],
        metrics: MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<WsMessage> {
        let mut messages = Vec::new();

        self.detect_new_events(recent_events, now, &mut messages);
        self.detect_summary_changes(snapshot, now, &mut messages);
        self.detect_ranking_changes(snapshot, now, &mut messages);
        self.detect_trend_changes(snapshot, now, &mut messages);
        self.detect_metrics_changes(metrics, now, &mut messages);
        self.evict_expired_event_ids(now);

        messages
    }

    pub fn tracked_events(&self) -> usize {
        self.seen_events.len()
    }

    fn detect_new_events(
        &mut self,
        recent_events: &[Event],
        now: DateTime<Utc>,
        messages: &mut Vec<WsMessage>,
    ) {
        for event in recent_events {
            if self.seen_events.contains_key(&event.id) {
                continue;
            }
            self.seen_events.insert(event.id.clone(), event.timestamp);
            messages.push(WsMessage::new_event(event, now));
            debug!(repo = %event.repo_full_name, event_id = %event.id, "new event detected");
        }
    }

    fn detect_summary_changes(
        &mut self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        messages: &mut Vec<WsMessage>,
    ) {
        for entry in snapshot.entries(Self::PRIMARY_WINDOW) {
            let previous = self.summaries.get(&entry.repo_full_name);
            if previous.map(String::as_str) != Some(entry.summary.as_str()) {
                messages.push(WsMessage::SummaryUpdate {
                    repo_full_name: entry.repo_full_name.clone(),
                    summary: entry.summary.clone(),
                    activity_score: entry.activity_score as f64,
                    trend_status: entry.trend_status,
                    momentum: entry.momentum,
                    events_in_window: entry.events_in_window,
                    timestamp: now,
                });
            }
            self.summaries
                .insert(entry.repo_full_name.clone(), entry.summary.clone());
        }
    }

    fn detect_ranking_changes(
        &mut self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        messages: &mut Vec<WsMessage>,
    ) {
        let mut current: HashMap<String, u32> = HashMap::new();

        for entry in snapshot.entries(Self::PRIMARY_WINDOW) {
            let Some(new_rank) = entry.rank else { continue };
            current.insert(entry.repo_full_name.clone(), new_rank);

            let old_rank = self.rankings.get(&entry.repo_full_name).copied();
            if old_rank != Some(new_rank) {
                messages.push(WsMessage::RankingChange {
                    repo_full_name: entry.repo_full_name.clone(),
                    old_rank,
                    new_rank,
                    activity_score: entry.activity_score as f64,
                    change: RankDirection::from_ranks(old_rank, new_rank),
                    timestamp: now,
                });
            }
        }

        self.rankings = current;
    }

    fn detect_trend_changes(
        &mut self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        messages: &mut Vec<WsMessage>,
    ) {
        for entry in snapshot.entries(Self::PRIMARY_WINDOW) {
            let previous = self.trends.get(&entry.repo_full_name).copied();
            let current = (entry.trend_status, entry.momentum);

            if previous != Some(current) {
                messages.push(WsMessage::TrendChange {
                    repo_full_name: entry.repo_full_name.clone(),
                    old_trend: previous.map(|(trend, _)| trend),
                    new_trend: entry.trend_status,
                    old_momentum: previous.map(|(_, momentum)| momentum),
                    new_momentum: entry.momentum,
                    timestamp: now,
                });
            }
            self.trends.insert(entry.repo_full_name.clone(), current);
        }
    }

    /// Deltas are measured against the last emitted counters, so slow
    /// counters cannot creep past a threshold without ever broadcasting.
    fn detect_metrics_changes(
        &mut self,
        metrics: MetricsSnapshot,
        now: DateTime<Utc>,
        messages: &mut Vec<WsMessage>,
    ) {
        let should_emit = match self.last_emitted_metrics {
            None => true,
            Some(previous) => self.thresholds.significant(previous, metrics),
        };

        if should_emit {
            messages.push(WsMessage::MetricsUpdate {
                total_events: metrics.total_events,
                active_repositories: metrics.active_repositories,
                total_queries: metrics.total_queries,
                timestamp: now,
            });
            self.last_emitted_metrics = Some(metrics);
        }
    }

    /// Ids older than the retention horizon can never reappear in a window,
    /// so tracking them is pointless; evicting bounds the seen set.
    fn evict_expired_event_ids(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Window::longest().duration();
        self.seen_events.retain(|_, timestamp| *timestamp >= cutoff);
    }
}
