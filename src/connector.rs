use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{error::Result, event::RawEvent};

/// The upstream boundary: anything that can be polled for a batch of raw
/// events. The real GitHub connector lives outside this crate; the demo
/// connector below stands in for it.
#[async_trait]
pub trait EventSource: Send {
    async fn poll(&mut self) -> Result<Vec<RawEvent>>;
}

const SAMPLE_AUTHORS: &[&str] = &[
    "alice_dev",
    "bob_coder",
    "charlie_eng",
    "diana_tech",
    "eve_programmer",
];

const SAMPLE_COMMIT_MESSAGES: &[&str] = &[
    "Fix bug in authentication",
    "Add new feature for data processing",
    "Update documentation",
    "Refactor core module",
    "Improve performance",
    "Add unit tests",
    "Update dependencies",
    "Optimize database queries",
];

const SAMPLE_PR_TITLES: &[&str] = &[
    "Feature: Add dark mode support",
    "Fix: Memory leak in worker thread",
    "Docs: Update installation guide",
    "Refactor: Simplify authentication logic",
    "Fix: Handle edge case in parser",
    "Performance: Optimize render loop",
];

const SAMPLE_ISSUE_TITLES: &[&str] = &[
    "Bug: Application crashes on startup",
    "Feature Request: Add batch processing",
    "Question: How to configure logging?",
    "Bug: Incorrect data validation",
    "Enhancement: Better error handling needed",
    "Bug: Memory usage too high",
];

const SAMPLE_RELEASE_NAMES: &[&str] = &[
    "v1.0.0 - Initial Release",
    "v1.1.0 - Feature Update",
    "v1.1.1 - Bug Fixes",
    "v2.0.0 - Major Update",
];

/// Fabricates plausible repository events so the live system runs with no
/// credentials. Commits dominate, releases are rare.
pub struct DemoConnector {
    repositories: Vec<String>,
    events_per_batch: usize,
    counter: u64,
    rng: StdRng,
}

impl DemoConnector {
    pub fn new(repositories: Vec<String>, events_per_batch: usize) -> Self {
        Self {
            repositories,
            events_per_batch,
            counter: 0,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn with_seed(repositories: Vec<String>, events_per_batch: usize, seed: u64) -> Self {
        Self {
            repositories,
            events_per_batch,
            counter: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_event(&mut self) -> RawEvent {
        self.counter += 1;

        let repo = self
            .repositories
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "demo/repo".to_string());

        let (event_type, title, path) = match self.rng.gen_range(0..100u32) {
            0..=54 => (
                "commit",
                *SAMPLE_COMMIT_MESSAGES.choose(&mut self.rng).unwrap_or(&""),
                "commit",
            ),
            55..=74 => (
                "pull_request",
                *SAMPLE_PR_TITLES.choose(&mut self.rng).unwrap_or(&""),
                "pull",
            ),
            75..=94 => (
                "issue",
                *SAMPLE_ISSUE_TITLES.choose(&mut self.rng).unwrap_or(&""),
                "issues",
            ),
            _ => (
                "release",
                *SAMPLE_RELEASE_NAMES.choose(&mut self.rng).unwrap_or(&""),
                "releases",
            ),
        };

        let author = SAMPLE_AUTHORS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("demo_author");

        RawEvent {
            id: format!("{}_{}_{:08}", event_type, repo.replace('/', "-"), self.counter),
            url: format!("https://github.com/{repo}/{path}/{}", self.counter),
            repo_full_name: repo,
            event_type: event_type.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            title: title.to_string(),
            author: author.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for DemoConnector {
    async fn poll(&mut self) -> Result<Vec<RawEvent>> {
        Ok((0..self.events_per_batch)
            .map(|_| self.next_event())
            .collect())
    }
}
