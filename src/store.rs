use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{
    aggregate::Window,
    event::{Event, EventError, EventType, IngestReport, RawEvent},
};

/// In-memory event retention, time-indexed so window scans touch only the
/// retained range. Events older than the longest window are pruned each
/// cycle; output semantics match a full-history rescan.
#[derive(Default)]
pub struct EventStore {
    by_time: BTreeMap<(DateTime<Utc>, String), Event>,
    ids: HashSet<String>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and retain a batch. A malformed or duplicate event is
    /// reported and skipped; it never fails the batch. Returns the report
    /// plus the accepted events in arrival order.
    pub fn ingest_batch(&mut self, batch: Vec<RawEvent>) -> (IngestReport, Vec<Event>) {
        let mut report = IngestReport::default();
        let mut accepted = Vec::new();

        for raw in batch {
            let event_id = if raw.id.is_empty() {
                None
            } else {
                Some(raw.id.clone())
            };
            match raw.validate() {
                Ok(event) => {
                    if !self.ids.insert(event.id.clone()) {
                        report.errors.push(EventError {
                            event_id,
                            reason: format!("duplicate event id '{}'", event.id),
                        });
                        continue;
                    }
                    self.by_time
                        .insert((event.timestamp, event.id.clone()), event.clone());
                    report.accepted += 1;
                    accepted.push(event);
                }
                Err(err) => {
                    debug!("skipping malformed event: {err}");
                    report.errors.push(EventError {
                        event_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        (report, accepted)
    }

    /// Drop events past the retention horizon (the longest window).
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Window::longest().duration();
        let retained = self.by_time.split_off(&(cutoff, String::new()));
        let expired = std::mem::replace(&mut self.by_time, retained);
        for event in expired.values() {
            self.ids.remove(&event.id);
        }
        expired.len()
    }

    /// Events at or after `cutoff`, oldest first.
    pub fn events_since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &Event> {
        self.by_time
            .range((cutoff, String::new())..)
            .map(|(_, event)| event)
    }

    pub fn all_events(&self) -> impl Iterator<Item = &Event> {
        self.by_time.values()
    }

    /// Recent events for one repository, newest first.
    pub fn repo_events(
        &self,
        repo_full_name: &str,
        limit: usize,
        type_filter: Option<EventType>,
        since_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let cutoff = since_minutes.map(|minutes| now - Duration::minutes(minutes));

        self.by_time
            .values()
            .rev()
            .filter(|event| event.repo_full_name == repo_full_name)
            .filter(|event| type_filter.is_none_or(|t| event.event_type == t))
            .filter(|event| cutoff.is_none_or(|c| event.timestamp >= c))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, repo: &str, event_type: &str, timestamp: DateTime<Utc>) -> RawEvent {
        RawEvent {
            id: id.to_string(),
            repo_full_name: repo.to_string(),
            event_type: event_type.to_string(),
            timestamp: timestamp.to_rfc3339(),
            title: String::new(),
            author: String::new(),
            url: String::new(),
        }
    }

    #[test]
    fn malformed_event_does_not_abort_the_batch() {
        let mut store = EventStore::new();
        let now = Utc::now();
        let mut bad = raw("bad", "acme/widget", "commit", now);
        bad.timestamp = "not-a-time".to_string();

        let (report, accepted) = store.ingest_batch(vec![
            raw("a", "acme/widget", "commit", now),
            bad,
            raw("b", "acme/widget", "issue", now),
        ]);

        assert_eq!(report.accepted, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].event_id.as_deref(), Some("bad"));
        assert_eq!(accepted.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = EventStore::new();
        let now = Utc::now();

        let (first, _) = store.ingest_batch(vec![raw("a", "acme/widget", "commit", now)]);
        assert_eq!(first.accepted, 1);

        let (second, _) = store.ingest_batch(vec![raw("a", "acme/widget", "commit", now)]);
        assert_eq!(second.accepted, 0);
        assert_eq!(second.errors.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prune_drops_events_past_the_retention_horizon() {
        let mut store = EventStore::new();
        let now = Utc::now();

        store.ingest_batch(vec![
            raw("old", "acme/widget", "commit", now - Duration::days(8)),
            raw("new", "acme/widget", "commit", now),
        ]);
        assert_eq!(store.len(), 2);

        let expired = store.prune(now);
        assert_eq!(expired, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.all_events().next().unwrap().id, "new");
    }

    #[test]
    fn pruned_ids_can_be_ingested_again() {
        let mut store = EventStore::new();
        let now = Utc::now();

        store.ingest_batch(vec![raw("a", "acme/widget", "commit", now - Duration::days(8))]);
        store.prune(now);

        let (report, _) = store.ingest_batch(vec![raw("a", "acme/widget", "commit", now)]);
        assert_eq!(report.accepted, 1);
    }

    #[test]
    fn repo_events_filters_and_orders_newest_first() {
        let mut store = EventStore::new();
        let now = Utc::now();

        store.ingest_batch(vec![
            raw("a", "acme/widget", "commit", now - Duration::minutes(30)),
            raw("b", "acme/widget", "issue", now - Duration::minutes(10)),
            raw("c", "acme/widget", "commit", now - Duration::minutes(5)),
            raw("d", "other/repo", "commit", now),
        ]);

        let events = store.repo_events("acme/widget", 10, None, None, now);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, "c");
        assert_eq!(events[2].id, "a");

        let commits = store.repo_events("acme/widget", 10, Some(EventType::Commit), None, now);
        assert_eq!(commits.len(), 2);

        let recent = store.repo_events("acme/widget", 10, None, Some(15), now);
        assert_eq!(recent.len(), 2);

        let limited = store.repo_events("acme/widget", 1, None, None, now);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "c");
    }
}
