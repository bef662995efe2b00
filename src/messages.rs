use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    event::{Event, EventType},
    score::{Momentum, TrendStatus},
};

/// Direction of a ranking move, from the subscriber's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDirection {
    New,
    Up,
    Down,
    Out,
    None,
}

impl RankDirection {
    /// A repo entering the rankings is "new"; falling below the top ten is
    /// "out"; otherwise the numeric comparison decides. Equal ranks map to
    /// "none", though callers only build messages when ranks differ.
    pub fn from_ranks(old_rank: Option<u32>, new_rank: u32) -> RankDirection {
        match old_rank {
            None => RankDirection::New,
            Some(_) if new_rank > 10 => RankDirection::Out,
            Some(old) if old > new_rank => RankDirection::Up,
            Some(old) if old < new_rank => RankDirection::Down,
            Some(_) => RankDirection::None,
        }
    }
}

/// Every message the hub can deliver to a subscriber. Serialized as a JSON
/// envelope with a `type` tag and flattened type-specific fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Connection {
        status: String,
        client_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NewEvent {
        event_id: String,
        repo_full_name: String,
        event_type: EventType,
        title: String,
        author: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    SummaryUpdate {
        repo_full_name: String,
        summary: String,
        activity_score: f64,
        trend_status: TrendStatus,
        momentum: Momentum,
        events_in_window: u64,
        timestamp: DateTime<Utc>,
    },
    RankingChange {
        repo_full_name: String,
        old_rank: Option<u32>,
        new_rank: u32,
        activity_score: f64,
        change: RankDirection,
        timestamp: DateTime<Utc>,
    },
    TrendChange {
        repo_full_name: String,
        old_trend: Option<TrendStatus>,
        new_trend: TrendStatus,
        old_momentum: Option<Momentum>,
        new_momentum: Momentum,
        timestamp: DateTime<Utc>,
    },
    MetricsUpdate {
        total_events: u64,
        active_repositories: u64,
        total_queries: u64,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
}

impl WsMessage {
    pub fn connection(client_id: &str, now: DateTime<Utc>) -> Self {
        WsMessage::Connection {
            status: "connected".to_string(),
            client_id: client_id.to_string(),
            message: "Connected to live updates".to_string(),
            timestamp: now,
        }
    }

    pub fn new_event(event: &Event, now: DateTime<Utc>) -> Self {
        WsMessage::NewEvent {
            event_id: event.id.clone(),
            repo_full_name: event.repo_full_name.clone(),
            event_type: event.event_type,
            title: event.title.clone(),
            author: event.author.clone(),
            url: event.url.clone(),
            timestamp: now,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WsMessage::Connection { .. } => "connection",
            WsMessage::NewEvent { .. } => "new_event",
            WsMessage::SummaryUpdate { .. } => "summary_update",
            WsMessage::RankingChange { .. } => "ranking_change",
            WsMessage::TrendChange { .. } => "trend_change",
            WsMessage::MetricsUpdate { .. } => "metrics_update",
            WsMessage::Heartbeat { .. } => "heartbeat",
            WsMessage::Pong { .. } => "pong",
        }
    }
}

/// Inbound frames from subscribers. Unknown types are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    #[serde(other)]
    Unknown,
}
