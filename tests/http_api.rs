//! The JSON API driven through the router, without a socket.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_subscriber::{fmt, EnvFilter};
use voting_backend::{
    clock::SystemClock,
    config::Config,
    feed::ChangeFeed,
    identity::{USER_ID_HEADER, USER_NAME_HEADER, VOTER_ID_HEADER},
    routes::create_routes,
    services::VotingService,
    state::AppState,
    store::MemoryStore,
};

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voting_backend=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn app() -> Router {
    init_tracing();

    let config = Config::in_memory("http://localhost:3030/");
    let store = MemoryStore::new(ChangeFeed::new(config.feed_capacity));
    let service = VotingService::new(store, Arc::new(SystemClock), &config.public_base_url);
    create_routes(AppState::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

fn json_request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
}

fn voting_body(reveal_mode: &str) -> Value {
    json!({
        "title": "Team offsite",
        "description": "Pick a city",
        "end_at": Utc::now() + Duration::hours(2),
        "reveal_mode": reveal_mode,
        "options": ["Lisbon", "Oslo"],
    })
}

async fn create_voting(app: &Router, reveal_mode: &str) -> Value {
    let body = voting_body(reveal_mode);
    let request = json_request(Method::POST, "/api/votings")
        .header(USER_ID_HEADER, "owner-1")
        .header(USER_NAME_HEADER, "Owner")
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, voting) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    voting
}

async fn vote(app: &Router, voting_id: &str, voter: &str, option_ids: Value) -> (StatusCode, Value) {
    let body = json!({ "option_ids": option_ids });
    let request = json_request(Method::POST, &format!("/api/votings/{voting_id}/votes"))
        .header(VOTER_ID_HEADER, voter)
        .body(Body::from(body.to_string()))
        .unwrap();

    send(app, request).await
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method(Method::GET).uri(uri)
}

#[tokio::test]
async fn health_check() {
    let app = app();
    let (status, body) = send(&app, get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn creating_requires_a_signed_in_user() {
    let app = app();
    let body = voting_body("after_vote");
    let request = json_request(Method::POST, "/api/votings")
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn voters_get_distinct_identities() {
    let app = app();
    let mint = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/voters")
            .body(Body::empty())
            .unwrap()
    };

    let (status, first) = send(&app, mint()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = send(&app, mint()).await;

    assert!(first["voter_id"].is_string());
    assert_ne!(first["voter_id"], second["voter_id"]);
}

#[tokio::test]
async fn vote_then_see_results() {
    let app = app();
    let voting = create_voting(&app, "after_vote").await;
    let id = voting["id"].as_str().unwrap().to_string();
    let lisbon = voting["options"][0]["id"].clone();

    assert_eq!(
        voting["share_url"],
        format!("http://localhost:3030/vote/{id}")
    );

    let (status, view) = send(
        &app,
        get(&format!("/api/votings/{id}"))
            .header(VOTER_ID_HEADER, "device-x")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(view["results"].is_null());
    assert_eq!(view["eligibility"]["status"], "allowed");

    let stats_uri = format!("/api/votings/{id}/stats?voter=device-x");
    let (status, _) = send(&app, get(&stats_uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, receipt) = vote(&app, &id, "device-x", json!([lisbon])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["recorded"], 1);

    let (status, receipt) = vote(&app, &id, "device-x", json!([lisbon])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["already_recorded"], true);

    let (status, stats) = send(&app, get(&stats_uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_votes"], 1);
    assert_eq!(stats["unique_voters"], 1);
    assert_eq!(stats["options"][0]["percentage"], 100.0);

    let (_, view) = send(
        &app,
        get(&format!("/api/votings/{id}"))
            .header(VOTER_ID_HEADER, "device-x")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(view["has_voted"], true);
    assert_eq!(view["eligibility"]["status"], "denied");
    assert_eq!(view["eligibility"]["reason"], "already_voted");
    assert_eq!(view["results"]["total_votes"], 1);
}

#[tokio::test]
async fn bad_votes_are_rejected() {
    let app = app();
    let voting = create_voting(&app, "after_end").await;
    let id = voting["id"].as_str().unwrap().to_string();

    let (status, body) = vote(&app, &id, "device-x", json!([])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let both = json!([voting["options"][0]["id"], voting["options"][1]["id"]]);
    let (status, _) = vote(&app, &id, "device-x", both).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/api/votings/{}/votes", uuid::Uuid::new_v4());
    let body = json!({ "option_ids": [voting["options"][0]["id"]] });
    let request = json_request(Method::POST, &missing)
        .header(VOTER_ID_HEADER, "device-x")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn voting_without_identity_is_rejected() {
    let app = app();
    let voting = create_voting(&app, "after_vote").await;
    let id = voting["id"].as_str().unwrap();

    let body = json!({ "option_ids": [voting["options"][0]["id"]] });
    let request = json_request(Method::POST, &format!("/api/votings/{id}/votes"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn owner_manages_the_voting() {
    let app = app();
    let voting = create_voting(&app, "after_end").await;
    let id = voting["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/votings/{id}/end"))
            .header(USER_ID_HEADER, "intruder")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, ended) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri(format!("/api/votings/{id}/end"))
            .header(USER_ID_HEADER, "owner-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(ended["end_at"], voting["end_at"]);

    // after_end results are now public
    let (status, stats) = send(
        &app,
        get(&format!("/api/votings/{id}/stats")).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["is_ended"], true);
    assert_eq!(stats["total_votes"], 0);

    let (status, listed) = send(
        &app,
        get("/api/votings?creator=owner-1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["is_ended"], true);

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/votings/{id}"))
            .header(USER_ID_HEADER, "owner-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/api/votings/{id}")).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn end_time_cannot_be_extended_over_http() {
    let app = app();
    let voting = create_voting(&app, "after_vote").await;
    let id = voting["id"].as_str().unwrap();

    let body = json!({ "end_at": Utc::now() + Duration::days(30) });
    let request = json_request(Method::PATCH, &format!("/api/votings/{id}"))
        .header(USER_ID_HEADER, "owner-1")
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_option_id_is_a_validation_error() {
    let app = app();
    let voting = create_voting(&app, "after_vote").await;
    let id = voting["id"].as_str().unwrap();

    let (status, body) = vote(&app, id, "device-x", json!(["not-a-uuid"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("option_ids"));

    let request = json_request(Method::POST, &format!("/api/votings/{id}/votes"))
        .header(VOTER_ID_HEADER, "device-x")
        .body(Body::from("{\"option_ids\": ["))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_voting_id_is_not_found() {
    let app = app();

    let (status, body) = send(&app, get("/api/votings/not-a-uuid").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = vote(&app, "42", "device-x", json!([uuid::Uuid::new_v4()])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_stream_for_unknown_voting_is_not_found() {
    let app = app();
    let uri = format!("/api/votings/{}/live", uuid::Uuid::new_v4());

    let (status, body) = send(&app, get(&uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn live_stream_reads_the_voter_from_the_query() {
    let app = app();
    let voting = create_voting(&app, "after_vote").await;
    let id = voting["id"].as_str().unwrap().to_string();

    let (status, _) = vote(&app, &id, "device-x", json!([voting["options"][1]["id"]])).await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            get(&format!("/api/votings/{id}/live?voter=device-x"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(std::time::Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(first.to_vec()).unwrap();

    assert!(frame.starts_with("event: voting"));
    assert!(frame.contains("\"has_voted\":true"));
    assert!(frame.contains("\"total_votes\":1"));
}
