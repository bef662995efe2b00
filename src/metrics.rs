use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time reading of the system counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub active_repositories: u64,
    pub total_queries: u64,
}

/// System-wide counters. An explicitly owned handle rather than an ambient
/// global: the pipeline owns one and shares read access with the HTTP
/// layer, which only ever increments its own counter.
#[derive(Debug, Default)]
pub struct SystemMetrics {
    total_events: AtomicU64,
    active_repositories: AtomicU64,
    total_queries: AtomicU64,
    started_at: Option<DateTime<Utc>>,
}

impl SystemMetrics {
    pub fn new() -> Self {
        Self {
            total_events: AtomicU64::new(0),
            active_repositories: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            started_at: Some(Utc::now()),
        }
    }

    pub fn record_events(&self, count: u64) {
        self.total_events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_active_repositories(&self, count: u64) {
        self.active_repositories.store(count, Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            active_repositories: self.active_repositories.load(Ordering::Relaxed),
            total_queries: self.total_queries.load(Ordering::Relaxed),
        }
    }
}
