use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{Window, WindowAggregate},
    score::{Momentum, ScoreWeights, TrendStatus, TrendThresholds, VelocityMetrics},
};

/// The materialized view for one (repository, window) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub repo_full_name: String,
    pub window: Window,
    pub events_in_window: u64,
    pub commits_in_window: u64,
    pub prs_in_window: u64,
    pub issues_in_window: u64,
    pub releases_in_window: u64,
    pub latest_event_time: DateTime<Utc>,
    pub activity_score: u64,
    #[serde(flatten)]
    pub velocity: VelocityMetrics,
    pub trend_status: TrendStatus,
    pub momentum: Momentum,
    pub summary: String,
    pub rank: Option<u32>,
}

/// The complete materialized view for one cycle: every window's entries in
/// rank order. Immutable once built; replaced wholesale each cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    windows: BTreeMap<Window, Vec<RepoSnapshot>>,
}

impl Snapshot {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            windows: BTreeMap::new(),
        }
    }

    /// Score, classify, summarize, and rank one window's aggregates into
    /// snapshot entries. Ranking sorts by activity score descending, then
    /// repository name, and assigns 1-based ranks.
    pub fn build(
        aggregates: BTreeMap<Window, BTreeMap<String, WindowAggregate>>,
        weights: &ScoreWeights,
        thresholds: &TrendThresholds,
        taken_at: DateTime<Utc>,
    ) -> Self {
        let mut windows = BTreeMap::new();

        for (window, repos) in aggregates {
            let mut entries: Vec<RepoSnapshot> = repos
                .into_values()
                .map(|aggregate| {
                    let activity_score = weights.score(&aggregate);
                    let velocity = VelocityMetrics::compute(&aggregate, activity_score, window);
                    let trend_status = thresholds.status(velocity.score_per_hour);
                    let momentum = thresholds.momentum(velocity.score_per_hour);
                    let summary = render_summary(&aggregate, activity_score, trend_status, momentum);

                    RepoSnapshot {
                        repo_full_name: aggregate.repo_full_name,
                        window,
                        events_in_window: aggregate.events_in_window,
                        commits_in_window: aggregate.commits_in_window,
                        prs_in_window: aggregate.prs_in_window,
                        issues_in_window: aggregate.issues_in_window,
                        releases_in_window: aggregate.releases_in_window,
                        latest_event_time: aggregate.latest_event_time,
                        activity_score,
                        velocity,
                        trend_status,
                        momentum,
                        summary,
                        rank: None,
                    }
                })
                .collect();

            entries.sort_by(|a, b| {
                b.activity_score
                    .cmp(&a.activity_score)
                    .then_with(|| a.repo_full_name.cmp(&b.repo_full_name))
            });
            for (index, entry) in entries.iter_mut().enumerate() {
                entry.rank = Some(index as u32 + 1);
            }

            windows.insert(window, entries);
        }

        Self { taken_at, windows }
    }

    pub fn entries(&self, window: Window) -> &[RepoSnapshot] {
        self.windows.get(&window).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, repo_full_name: &str, window: Window) -> Option<&RepoSnapshot> {
        self.entries(window)
            .iter()
            .find(|entry| entry.repo_full_name == repo_full_name)
    }

    /// Entries for `window` in rank order, optionally score-filtered.
    pub fn top(&self, window: Window, limit: usize, min_score: Option<f64>) -> Vec<&RepoSnapshot> {
        self.entries(window)
            .iter()
            .filter(|entry| min_score.is_none_or(|min| entry.activity_score as f64 >= min))
            .take(limit)
            .collect()
    }

    /// Number of repositories with any activity in the longest window.
    pub fn active_repositories(&self) -> usize {
        self.entries(Window::longest()).len()
    }
}

fn render_summary(
    aggregate: &WindowAggregate,
    activity_score: u64,
    trend_status: TrendStatus,
    momentum: Momentum,
) -> String {
    format!(
        "{} is {} with {} events in {} window. Activity: {} commits, {} PRs, {} issues, {} releases. Score: {} points. Momentum: {}.",
        aggregate.repo_full_name,
        trend_status,
        aggregate.events_in_window,
        aggregate.window,
        aggregate.commits_in_window,
        aggregate.prs_in_window,
        aggregate.issues_in_window,
        aggregate.releases_in_window,
        activity_score,
        momentum,
    )
}

/// Holder of the current snapshot. The pipeline is the single writer and
/// replaces the whole `Arc` per cycle; readers clone the `Arc` and only
/// ever observe a fully-old or fully-new view.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty(Utc::now()))),
        }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_window;
    use crate::event::{Event, EventType};

    fn event(id: &str, repo: &str, event_type: EventType, timestamp: DateTime<Utc>) -> Event {
        Event {
            id: id.to_string(),
            repo_full_name: repo.to_string(),
            event_type,
            timestamp,
            title: String::new(),
            author: String::new(),
            url: String::new(),
        }
    }

    fn build_from(events: &[Event], now: DateTime<Utc>) -> Snapshot {
        let mut aggregates = BTreeMap::new();
        for window in Window::ALL {
            aggregates.insert(window, aggregate_window(events, window, now));
        }
        Snapshot::build(
            aggregates,
            &ScoreWeights::default(),
            &TrendThresholds::default(),
            now,
        )
    }

    #[test]
    fn ranks_by_score_descending_with_name_tiebreak() {
        let now = Utc::now();
        let events = vec![
            event("a", "acme/widget", EventType::Release, now),
            event("b", "zeta/tool", EventType::Commit, now),
            event("c", "alpha/tool", EventType::Commit, now),
        ];

        let snapshot = build_from(&events, now);
        let entries = snapshot.entries(Window::OneHour);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].repo_full_name, "acme/widget");
        assert_eq!(entries[0].rank, Some(1));
        // Equal scores break ties by repository name.
        assert_eq!(entries[1].repo_full_name, "alpha/tool");
        assert_eq!(entries[2].repo_full_name, "zeta/tool");
        assert_eq!(entries[2].rank, Some(3));
    }

    #[test]
    fn summary_follows_the_fixed_template() {
        let now = Utc::now();
        let events = vec![
            event("a", "acme/widget", EventType::Commit, now),
            event("b", "acme/widget", EventType::Commit, now),
            event("c", "acme/widget", EventType::PullRequest, now),
            event("d", "acme/widget", EventType::Issue, now),
            event("e", "acme/widget", EventType::Release, now),
        ];

        let snapshot = build_from(&events, now);
        let entry = snapshot.get("acme/widget", Window::OneHour).unwrap();
        // 2 commits + 1 PR + 1 issue + 1 release = 2 + 3 + 2 + 5 = 12
        assert_eq!(entry.activity_score, 12);
        assert_eq!(
            entry.summary,
            "acme/widget is HOT with 5 events in 1h window. Activity: 2 commits, \
             1 PRs, 1 issues, 1 releases. Score: 12 points. Momentum: ACCELERATING."
        );
    }

    #[test]
    fn top_applies_limit_and_min_score() {
        let now = Utc::now();
        let events = vec![
            event("a", "acme/widget", EventType::Release, now),
            event("b", "beta/tool", EventType::Commit, now),
        ];

        let snapshot = build_from(&events, now);
        assert_eq!(snapshot.top(Window::OneHour, 10, None).len(), 2);
        assert_eq!(snapshot.top(Window::OneHour, 1, None).len(), 1);

        let filtered = snapshot.top(Window::OneHour, 10, Some(2.0));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].repo_full_name, "acme/widget");
    }

    #[test]
    fn store_swaps_atomically() {
        let store = SnapshotStore::new();
        let before = store.load();
        assert_eq!(before.entries(Window::OneHour).len(), 0);

        let now = Utc::now();
        let snapshot = build_from(&[event("a", "acme/widget", EventType::Commit, now)], now);
        store.replace(snapshot);

        // The old handle still sees the old view; a fresh load sees the new.
        assert_eq!(before.entries(Window::OneHour).len(), 0);
        assert_eq!(store.load().entries(Window::OneHour).len(), 1);
    }
}
