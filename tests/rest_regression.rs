use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use http_body_util::BodyExt;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tower::ServiceExt;

use repopulse::{
    config::Config,
    diff::ChangeDetector,
    hub::BroadcastHub,
    metrics::SystemMetrics,
    pipeline::Pipeline,
    score::{ScoreWeights, TrendThresholds},
    server::{AppState, build_router},
    snapshot::SnapshotStore,
    store::EventStore,
};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

struct Harness {
    router: Router,
    pipeline: Pipeline,
}

fn harness() -> Harness {
    let config = Config::default();
    let store = Arc::new(RwLock::new(EventStore::new()));
    let snapshots = Arc::new(SnapshotStore::new());
    let hub = Arc::new(BroadcastHub::new());
    let metrics = Arc::new(SystemMetrics::new());

    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::clone(&snapshots),
        Arc::clone(&hub),
        Arc::clone(&metrics),
        ChangeDetector::new(config.change_thresholds),
        ScoreWeights::default(),
        TrendThresholds::default(),
        None,
    );

    let state = AppState::new(store, snapshots, hub, metrics, Duration::from_secs(30));
    Harness {
        router: build_router(state),
        pipeline,
    }
}

fn raw_event(id: &str, repo: &str, event_type: &str) -> Value {
    json!({
        "id": id,
        "repo_full_name": repo,
        "event_type": event_type,
        "timestamp": Utc::now().to_rfc3339(),
        "title": "Fix parser edge case",
        "author": "alice_dev",
        "url": format!("https://github.com/{repo}/commit/{id}"),
    })
}

async fn get_json(router: &Router, uri: &str) -> TestResult<(StatusCode, Value)> {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

async fn post_json(router: &Router, uri: &str, payload: &Value) -> TestResult<(StatusCode, Value)> {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(payload)?))?,
        )
        .await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn health_reports_counters_and_connections() -> TestResult<()> {
    let harness = harness();

    let (status, body) = get_json(&harness.router, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_connections"], 0);
    assert_eq!(body["total_events"], 0);
    assert_eq!(body["total_queries"], 0);
    Ok(())
}

#[tokio::test]
async fn ingest_reports_acceptance_and_rejects_invalid_rows() -> TestResult<()> {
    let harness = harness();

    let payload = json!([
        raw_event("e1", "acme/widget", "commit"),
        raw_event("e1", "acme/widget", "commit"),
        raw_event("e2", "not-a-repo", "commit"),
        raw_event("e3", "acme/widget", "deploy"),
    ]);
    let (status, body) = post_json(&harness.router, "/v1/events", &payload).await?;
    assert_eq!(status, StatusCode::OK);
    // One valid row, one duplicate id, one bad repo name, one unknown type.
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn top_repos_orders_by_score_and_validates_window() -> TestResult<()> {
    let mut harness = harness();

    let payload = json!([
        raw_event("r1", "acme/widget", "release"),
        raw_event("c1", "beta/tool", "commit"),
    ]);
    post_json(&harness.router, "/v1/events", &payload).await?;
    harness.pipeline.run_cycle(Utc::now());

    let (status, body) = get_json(&harness.router, "/v1/repos/top?window=1h&limit=10").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["time_window"], "1h");
    assert_eq!(body["total_count"], 2);
    let repos = body["repositories"].as_array().unwrap();
    assert_eq!(repos[0]["repo_full_name"], "acme/widget");
    assert_eq!(repos[0]["activity_score"], 5);
    assert_eq!(repos[0]["rank"], 1);
    assert_eq!(repos[1]["repo_full_name"], "beta/tool");

    let (status, _) = get_json(&harness.router, "/v1/repos/top?min_score=2").await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get_json(&harness.router, "/v1/repos/top?window=2h").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn repo_details_returns_snapshot_or_404() -> TestResult<()> {
    let mut harness = harness();

    post_json(
        &harness.router,
        "/v1/events",
        &json!([raw_event("c1", "acme/widget", "commit")]),
    )
    .await?;
    harness.pipeline.run_cycle(Utc::now());

    let (status, body) = get_json(&harness.router, "/v1/repos/acme/widget?window=24h").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["repo_full_name"], "acme/widget");
    assert_eq!(body["window"], "24h");
    assert_eq!(body["events_in_window"], 1);
    assert_eq!(body["commits_in_window"], 1);
    assert_eq!(body["activity_score"], 1);
    assert!(body["summary"].as_str().unwrap().contains("acme/widget is"));

    let (status, _) = get_json(&harness.router, "/v1/repos/acme/unknown").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn repo_events_filters_by_type() -> TestResult<()> {
    let harness = harness();

    post_json(
        &harness.router,
        "/v1/events",
        &json!([
            raw_event("c1", "acme/widget", "commit"),
            raw_event("p1", "acme/widget", "pull_request"),
            raw_event("c2", "beta/tool", "commit"),
        ]),
    )
    .await?;

    let (status, body) = get_json(&harness.router, "/v1/repos/acme/widget/events").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 2);

    let (status, body) = get_json(
        &harness.router,
        "/v1/repos/acme/widget/events?event_type=pull_request",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["filtered_type"], "pull_request");
    assert_eq!(body["events"][0]["id"], "p1");

    let (status, _) = get_json(
        &harness.router,
        "/v1/repos/acme/widget/events?event_type=deploy",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn queries_bump_the_query_counter() -> TestResult<()> {
    let harness = harness();

    get_json(&harness.router, "/v1/repos/top").await?;
    get_json(&harness.router, "/v1/repos/acme/widget/events").await?;

    let (_, body) = get_json(&harness.router, "/health").await?;
    assert_eq!(body["total_queries"], 2);
    Ok(())
}

#[tokio::test]
async fn ws_stats_starts_empty() -> TestResult<()> {
    let harness = harness();

    let (status, body) = get_json(&harness.router, "/ws/stats").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_connections"], 0);
    assert_eq!(body["total_messages_sent"], 0);
    assert!(body["clients"].as_array().unwrap().is_empty());
    Ok(())
}
