use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{Window, WindowAggregate};

/// Weighted contribution of each event type to the activity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub commit: u64,
    pub issue: u64,
    pub pull_request: u64,
    pub release: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            commit: 1,
            issue: 2,
            pull_request: 3,
            release: 5,
        }
    }
}

impl ScoreWeights {
    /// Weighted activity score for one window aggregate. Pure and
    /// deterministic: identical counts always produce identical scores.
    pub fn score(&self, aggregate: &WindowAggregate) -> u64 {
        aggregate.commits_in_window * self.commit
            + aggregate.prs_in_window * self.pull_request
            + aggregate.issues_in_window * self.issue
            + aggregate.releases_in_window * self.release
    }
}

/// Discrete activity bucket derived from score velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendStatus {
    Hot,
    Active,
    Moderate,
    Quiet,
}

impl TrendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStatus::Hot => "HOT",
            TrendStatus::Active => "ACTIVE",
            TrendStatus::Moderate => "MODERATE",
            TrendStatus::Quiet => "QUIET",
        }
    }
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-of-change intensity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    Accelerating,
    Steady,
    Decelerating,
}

impl Momentum {
    pub fn as_str(&self) -> &'static str {
        match self {
            Momentum::Accelerating => "ACCELERATING",
            Momentum::Steady => "STEADY",
            Momentum::Decelerating => "DECELERATING",
        }
    }
}

impl fmt::Display for Momentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds on `score_per_hour`. All comparisons are strict `>`, so a
/// value exactly at a boundary falls into the lower bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendThresholds {
    pub hot: f64,
    pub active: f64,
    pub moderate: f64,
    pub accelerating: f64,
    pub steady: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            hot: 5.0,
            active: 2.0,
            moderate: 0.5,
            accelerating: 5.0,
            steady: 1.0,
        }
    }
}

impl TrendThresholds {
    pub fn status(&self, score_per_hour: f64) -> TrendStatus {
        if score_per_hour > self.hot {
            TrendStatus::Hot
        } else if score_per_hour > self.active {
            TrendStatus::Active
        } else if score_per_hour > self.moderate {
            TrendStatus::Moderate
        } else {
            TrendStatus::Quiet
        }
    }

    pub fn momentum(&self, score_per_hour: f64) -> Momentum {
        if score_per_hour > self.accelerating {
            Momentum::Accelerating
        } else if score_per_hour > self.steady {
            Momentum::Steady
        } else {
            Momentum::Decelerating
        }
    }
}

/// Window counts and score normalized to per-hour rates (releases also
/// per-day), making windows of different length comparable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VelocityMetrics {
    pub events_per_hour: f64,
    pub commits_per_hour: f64,
    pub prs_per_hour: f64,
    pub issues_per_hour: f64,
    pub releases_per_day: f64,
    pub score_per_hour: f64,
}

impl VelocityMetrics {
    pub fn compute(aggregate: &WindowAggregate, activity_score: u64, window: Window) -> Self {
        let hours = f64::from(window.duration_hours());
        Self {
            events_per_hour: aggregate.events_in_window as f64 / hours,
            commits_per_hour: aggregate.commits_in_window as f64 / hours,
            prs_per_hour: aggregate.prs_in_window as f64 / hours,
            issues_per_hour: aggregate.issues_in_window as f64 / hours,
            releases_per_day: (aggregate.releases_in_window as f64 / hours) * 24.0,
            score_per_hour: activity_score as f64 / hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn aggregate(commits: u64, prs: u64, issues: u64, releases: u64) -> WindowAggregate {
        WindowAggregate {
            repo_full_name: "acme/widget".to_string(),
            window: Window::Day,
            events_in_window: commits + prs + issues + releases,
            commits_in_window: commits,
            prs_in_window: prs,
            issues_in_window: issues,
            releases_in_window: releases,
            latest_event_time: Utc::now(),
        }
    }

    #[test]
    fn score_is_weighted_sum() {
        let weights = ScoreWeights::default();
        // 3 commits + 4 PRs + 2 issues + 1 release = 3 + 12 + 4 + 5 = 24
        assert_eq!(weights.score(&aggregate(3, 4, 2, 1)), 24);
        assert_eq!(weights.score(&aggregate(0, 0, 0, 0)), 0);
    }

    #[test]
    fn velocity_is_linear_in_window_duration() {
        let agg = aggregate(24, 0, 0, 0);
        let velocity = VelocityMetrics::compute(&agg, 24, Window::Day);
        assert_eq!(velocity.events_per_hour, 1.0);
        assert_eq!(velocity.score_per_hour, 1.0);
    }

    #[test]
    fn releases_are_annualized_per_day() {
        let agg = aggregate(0, 0, 0, 7);
        let velocity = VelocityMetrics::compute(&agg, 35, Window::Week);
        assert_eq!(velocity.releases_per_day, 1.0);
    }

    #[test]
    fn empty_window_yields_zero_velocity() {
        let agg = aggregate(0, 0, 0, 0);
        let velocity = VelocityMetrics::compute(&agg, 0, Window::OneHour);
        assert_eq!(velocity.events_per_hour, 0.0);
        assert_eq!(velocity.score_per_hour, 0.0);
    }

    #[test]
    fn boundary_values_fall_into_the_lower_bucket() {
        let thresholds = TrendThresholds::default();
        assert_eq!(thresholds.status(5.0), TrendStatus::Active);
        assert_eq!(thresholds.status(5.01), TrendStatus::Hot);
        assert_eq!(thresholds.status(2.0), TrendStatus::Moderate);
        assert_eq!(thresholds.status(0.5), TrendStatus::Quiet);
        assert_eq!(thresholds.status(0.0), TrendStatus::Quiet);

        assert_eq!(thresholds.momentum(5.0), Momentum::Steady);
        assert_eq!(thresholds.momentum(5.01), Momentum::Accelerating);
        assert_eq!(thresholds.momentum(1.0), Momentum::Decelerating);
    }
}
