use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventType};

/// A fixed lookback duration over which events are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::OneHour, Window::Day, Window::Week];

    pub fn label(&self) -> &'static str {
        match self {
            Window::OneHour => "1h",
            Window::Day => "24h",
            Window::Week => "7d",
        }
    }

    pub fn duration_hours(&self) -> u32 {
        match self {
            Window::OneHour => 1,
            Window::Day => 24,
            Window::Week => 168,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::hours(i64::from(self.duration_hours()))
    }

    pub fn parse(value: &str) -> Option<Window> {
        match value {
            "1h" => Some(Window::OneHour),
            "24h" => Some(Window::Day),
            "7d" => Some(Window::Week),
            _ => None,
        }
    }

    /// The longest window, which bounds event retention.
    pub fn longest() -> Window {
        Window::Week
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-(repository, window) event counts plus the newest event time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub repo_full_name: String,
    pub window: Window,
    pub events_in_window: u64,
    pub commits_in_window: u64,
    pub prs_in_window: u64,
    pub issues_in_window: u64,
    pub releases_in_window: u64,
    pub latest_event_time: DateTime<Utc>,
}

impl WindowAggregate {
    fn new(repo_full_name: String, window: Window, first_seen: DateTime<Utc>) -> Self {
        Self {
            repo_full_name,
            window,
            events_in_window: 0,
            commits_in_window: 0,
            prs_in_window: 0,
            issues_in_window: 0,
            releases_in_window: 0,
            latest_event_time: first_seen,
        }
    }

    fn record(&mut self, event: &Event) {
        self.events_in_window += 1;
        match event.event_type {
            EventType::Commit => self.commits_in_window += 1,
            EventType::PullRequest => self.prs_in_window += 1,
            EventType::Issue => self.issues_in_window += 1,
            EventType::Release => self.releases_in_window += 1,
        }
        if event.timestamp > self.latest_event_time {
            self.latest_event_time = event.timestamp;
        }
    }
}

/// Group events falling inside `window` (counted back from `now`) by
/// repository. Events newer than `now` are treated as in-window so a
/// connector with slight clock skew never loses activity.
pub fn aggregate_window<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    window: Window,
    now: DateTime<Utc>,
) -> BTreeMap<String, WindowAggregate> {
    let cutoff = now - window.duration();
    let mut per_repo: BTreeMap<String, WindowAggregate> = BTreeMap::new();

    for event in events {
        if event.timestamp < cutoff {
            continue;
        }
        per_repo
            .entry(event.repo_full_name.clone())
            .or_insert_with(|| {
                WindowAggregate::new(event.repo_full_name.clone(), window, event.timestamp)
            })
            .record(event);
    }

    per_repo
}
