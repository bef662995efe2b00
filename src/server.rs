use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    aggregate::Window,
    config::Config,
    connector::{DemoConnector, EventSource},
    diff::ChangeDetector,
    error::{PulseError, Result},
    event::{EventType, IngestReport, RawEvent},
    hub::{BroadcastHub, HubStats},
    messages::{ClientMessage, WsMessage},
    metrics::{MetricsSnapshot, SystemMetrics},
    pipeline::Pipeline,
    snapshot::{RepoSnapshot, SnapshotStore},
    store::EventStore,
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<EventStore>>,
    snapshots: Arc<SnapshotStore>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<SystemMetrics>,
    heartbeat_interval: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<RwLock<EventStore>>,
        snapshots: Arc<SnapshotStore>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<SystemMetrics>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            store,
            snapshots,
            hub,
            metrics,
            heartbeat_interval,
        }
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        Arc::clone(&self.hub)
    }

    fn ingest(&self, batch: Vec<RawEvent>) -> IngestReport {
        let (report, _) = self.store.write().ingest_batch(batch);
        self.metrics.record_events(report.accepted as u64);
        report
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/events", post(ingest_events))
        .route("/v1/repos/top", get(top_repos))
        .route("/v1/repos/{owner}/{repo}", get(repo_details))
        .route("/v1/repos/{owner}/{repo}/events", get(repo_events))
        .route("/ws", get(ws_upgrade))
        .route("/ws/stats", get(ws_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the full service and run it until Ctrl+C/SIGTERM. The pipeline
/// task and every heartbeat task observe shutdown at their suspension
/// points; nothing is left running once this returns.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let store = Arc::new(RwLock::new(EventStore::new()));
    let snapshots = Arc::new(SnapshotStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let metrics = Arc::new(SystemMetrics::new());

    let source: Option<Box<dyn EventSource>> = if config.demo_mode {
        info!("using demo connector (simulated events)");
        Some(Box::new(DemoConnector::new(
            config.repositories.clone(),
            config.demo_events_per_batch,
        )))
    } else {
        // A real connector feeds POST /v1/events from outside.
        None
    };

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::clone(&snapshots),
        Arc::clone(&hub),
        Arc::clone(&metrics),
        ChangeDetector::new(config.change_thresholds),
        config.score_weights,
        config.trend_thresholds,
        source,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline_handle = tokio::spawn(pipeline.run(
        Duration::from_secs(config.poll_interval_secs),
        shutdown_rx,
    ));

    let state = AppState::new(
        store,
        snapshots,
        hub,
        metrics,
        Duration::from_secs(config.heartbeat_interval_secs),
    );
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = pipeline_handle.await {
        warn!("pipeline task ended abnormally: {err}");
    }

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: Option<i64>,
    active_connections: usize,
    #[serde(flatten)]
    metrics: MetricsSnapshot,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state
            .metrics
            .started_at()
            .map(|start| (Utc::now() - start).num_seconds()),
        active_connections: state.hub.connection_count(),
        metrics: state.metrics.snapshot(),
        timestamp: Utc::now(),
    })
}

async fn ingest_events(
    State(state): State<AppState>,
    Json(batch): Json<Vec<RawEvent>>,
) -> Json<IngestReport> {
    Json(state.ingest(batch))
}

fn parse_window(value: Option<&str>) -> Result<Window> {
    match value {
        None => Ok(Window::OneHour),
        Some(raw) => Window::parse(raw).ok_or_else(|| PulseError::InvalidWindow(raw.to_string())),
    }
}

fn default_top_limit() -> usize {
    10
}

#[derive(Deserialize)]
struct TopReposQuery {
    window: Option<String>,
    #[serde(default = "default_top_limit")]
    limit: usize,
    min_score: Option<f64>,
}

#[derive(Serialize)]
struct TopReposResponse {
    repositories: Vec<RepoSnapshot>,
    total_count: usize,
    time_window: Window,
    timestamp: DateTime<Utc>,
}

async fn top_repos(
    State(state): State<AppState>,
    Query(query): Query<TopReposQuery>,
) -> Result<Json<TopReposResponse>> {
    let window = parse_window(query.window.as_deref())?;
    state.metrics.record_query();

    let snapshot = state.snapshots.load();
    let repositories: Vec<RepoSnapshot> = snapshot
        .top(window, query.limit.clamp(1, 50), query.min_score)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(TopReposResponse {
        total_count: repositories.len(),
        repositories,
        time_window: window,
        timestamp: Utc::now(),
    }))
}

#[derive(Deserialize)]
struct WindowQuery {
    window: Option<String>,
}

async fn repo_details(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<RepoSnapshot>> {
    let window = parse_window(query.window.as_deref())?;
    let repo_full_name = format!("{owner}/{repo}");
    state.metrics.record_query();

    let snapshot = state.snapshots.load();
    let entry = snapshot
        .get(&repo_full_name, window)
        .cloned()
        .ok_or(PulseError::RepoNotFound(repo_full_name))?;
    Ok(Json(entry))
}

fn default_events_limit() -> usize {
    50
}

#[derive(Deserialize)]
struct RepoEventsQuery {
    #[serde(default = "default_events_limit")]
    limit: usize,
    event_type: Option<String>,
    since_minutes: Option<i64>,
}

#[derive(Serialize)]
struct RepoEventsResponse {
    repo_full_name: String,
    events: Vec<crate::event::Event>,
    total_count: usize,
    filtered_type: Option<EventType>,
    timestamp: DateTime<Utc>,
}

async fn repo_events(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<RepoEventsQuery>,
) -> Result<Json<RepoEventsResponse>> {
    let repo_full_name = format!("{owner}/{repo}");
    let type_filter = match query.event_type.as_deref() {
        None => None,
        Some(raw) => Some(
            EventType::parse(raw)
                .ok_or_else(|| PulseError::InvalidEvent(format!("unknown event type '{raw}'")))?,
        ),
    };
    state.metrics.record_query();

    let events = state.store.read().repo_events(
        &repo_full_name,
        query.limit.clamp(1, 200),
        type_filter,
        query.since_minutes,
        Utc::now(),
    );

    Ok(Json(RepoEventsResponse {
        repo_full_name,
        total_count: events.len(),
        events,
        filtered_type: type_filter,
        timestamp: Utc::now(),
    }))
}

async fn ws_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per subscriber: drains the hub channel onto the wire and
/// answers inbound frames. A failed write ends the task; the hub prunes
/// the subscriber on its next broadcast pass.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.hub.connect();
    let client_id = subscription.client_id;
    let mut rx = subscription.rx;
    let (mut sink, mut stream) = socket.split();

    let heartbeat = tokio::spawn(heartbeat_loop(
        state.hub(),
        client_id,
        state.heartbeat_interval,
    ));

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(client_id = %client_id, "failed to encode message: {err}");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state.hub, client_id, &text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    heartbeat.abort();
    state.hub.disconnect(client_id);
}

fn handle_client_message(hub: &BroadcastHub, client_id: Uuid, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => {
            hub.send_to(
                client_id,
                WsMessage::Pong {
                    timestamp: Utc::now(),
                },
            );
        }
        Ok(ClientMessage::Unknown) => {
            debug!(client_id = %client_id, "ignoring unknown client message");
        }
        Err(err) => {
            warn!(client_id = %client_id, "invalid client frame: {err}");
        }
    }
}

/// Keepalive every `interval` until the task is aborted or the subscriber
/// is no longer live. Abort lands on the sleep, never inside a send.
async fn heartbeat_loop(hub: Arc<BroadcastHub>, client_id: Uuid, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let delivered = hub.send_to(
            client_id,
            WsMessage::Heartbeat {
                timestamp: Utc::now(),
            },
        );
        if !delivered {
            break;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
