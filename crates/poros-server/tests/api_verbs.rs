//! Verb relay tests against a live server and live loopback agents:
//! discover matching and filters, then query/propose/commit/cancel
//! relayed end to end.

use axum::{routing::post, Json, Router};
use poros_db::{open_pool, run_migrations, DbPool, DbSettings};
use poros_orchestrator::{Orchestrator, OrchestratorSettings, SessionSettings, SessionStore};
use poros_ranking::Ranker;
use poros_server::{app, config::RateLimitConfig, middleware::RateLimiter, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn test_pool() -> (DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poros.db");
    let pool = open_pool(path.to_str().unwrap(), DbSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    (pool, dir)
}

async fn serve_api(pool: DbPool) -> String {
    let http = reqwest::Client::new();
    let state = AppState {
        pool: pool.clone(),
        orchestrator: Arc::new(Orchestrator::new(
            pool,
            Ranker::keyword_only(),
            http.clone(),
            SessionStore::new(SessionSettings::default()),
            OrchestratorSettings::default(),
        )),
        http,
        relay_timeout: Duration::from_secs(2),
        rate_limiter: RateLimiter::new(),
        rate_limits: RateLimitConfig::default(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

/// A stand-in negotiating agent that answers all four relayed verbs.
async fn booking_agent() -> String {
    let router = Router::new()
        .route(
            "/query",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"status": "success", "answer": body, "signature": "sig-123"}))
            }),
        )
        .route(
            "/propose",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"proposalId": "prop-1", "status": "accepted", "terms": body}))
            }),
        )
        .route(
            "/commit",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"commitmentId": "commit-1", "status": "confirmed", "received": body}))
            }),
        )
        .route(
            "/cancel",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"status": "cancelled", "refundIssued": true, "received": body}))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn register_card(client: &reqwest::Client, api: &str, card: Value) {
    let response = client
        .post(format!("{api}/api/registry/agents"))
        .json(&json!({"agentCard": card}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

fn hotel_card(url: &str) -> Value {
    json!({
        "id": "hotel-lisbon",
        "name": "Lisbon Hotels",
        "description": "Hotel booking in Portugal",
        "url": url,
        "skills": [{"id": "room-search", "name": "Room Search", "tags": ["booking", "travel"]}],
        "capabilities": [{"name": "hotel_booking", "description": "Book rooms"}],
        "pricing": {"model": "per-call", "amount": 0.05},
        "metadata": {"location": "Lisbon, Portugal"},
    })
}

fn flights_card(url: &str) -> Value {
    json!({
        "id": "berlin-flights",
        "name": "Berlin Flights",
        "description": "Flight booking",
        "url": url,
        "skills": [{"id": "flight-search", "name": "Flight Search", "tags": ["flights", "travel"]}],
        "pricing": {"model": "per-call", "amount": 0.5},
        "metadata": {"location": "Berlin, Germany"},
    })
}

async fn discover(client: &reqwest::Client, api: &str, body: Value) -> Vec<Value> {
    let response = client
        .post(format!("{api}/orchestrate/discover"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    body["agents"].as_array().unwrap().clone()
}

#[tokio::test]
async fn discover_matches_tags_capability_names_and_skill_ids() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;
    register_card(&client, &api, hotel_card(&agent_url)).await;
    register_card(&client, &api, flights_card(&agent_url)).await;

    let agents = discover(&client, &api, json!({"capability": "booking"})).await;
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["agentId"], "hotel-lisbon");
    // Unsigned registrations get a directory-derived DID.
    assert_eq!(agents[0]["did"], "did:poros:legacy:hotel-lisbon");
    assert_eq!(agents[0]["reputationScore"], 1.0);
    assert_eq!(agents[0]["pricing"]["amount"], 0.05);

    let by_capability_name =
        discover(&client, &api, json!({"capability": "hotel_booking"})).await;
    assert_eq!(by_capability_name.len(), 1);

    let by_skill_id = discover(&client, &api, json!({"capability": "flight-search"})).await;
    assert_eq!(by_skill_id.len(), 1);
    assert_eq!(by_skill_id[0]["agentId"], "berlin-flights");

    let nothing = discover(&client, &api, json!({"capability": "catering"})).await;
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn discover_filters_narrow_by_price_and_location() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;
    register_card(&client, &api, hotel_card(&agent_url)).await;
    register_card(&client, &api, flights_card(&agent_url)).await;

    // Both carry the shared travel tag; filters cut the set down.
    let all = discover(&client, &api, json!({"capability": "travel"})).await;
    assert_eq!(all.len(), 2);

    let affordable = discover(
        &client,
        &api,
        json!({"capability": "travel", "filters": {"maxPrice": 0.1}}),
    )
    .await;
    assert_eq!(affordable.len(), 1);
    assert_eq!(affordable[0]["agentId"], "hotel-lisbon");

    let in_berlin = discover(
        &client,
        &api,
        json!({"capability": "travel", "filters": {"location": "berlin"}}),
    )
    .await;
    assert_eq!(in_berlin.len(), 1);
    assert_eq!(in_berlin[0]["agentId"], "berlin-flights");
}

#[tokio::test]
async fn query_relays_and_lifts_the_signature() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;
    register_card(&client, &api, hotel_card(&agent_url)).await;

    let response = client
        .post(format!("{api}/orchestrate/query"))
        .json(&json!({
            "agentDid": "did:poros:legacy:hotel-lisbon",
            "query": {"question": "any rooms in march?"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["agentDid"], "did:poros:legacy:hotel-lisbon");
    assert_eq!(body["response"]["answer"]["question"], "any rooms in march?");
    assert_eq!(body["signature"], "sig-123");
}

#[tokio::test]
async fn signed_registrations_resolve_by_their_did() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;

    let mut card = hotel_card(&agent_url);
    card["did"] = json!("did:poros:ed25519:AbCdEf123");
    register_card(&client, &api, card).await;

    let response = client
        .post(format!("{api}/orchestrate/query"))
        .json(&json!({
            "agentDid": "did:poros:ed25519:AbCdEf123",
            "query": {"question": "still there?"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["agentDid"], "did:poros:ed25519:AbCdEf123");
}

#[tokio::test]
async fn propose_commit_cancel_pass_the_agent_answer_through() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;
    register_card(&client, &api, hotel_card(&agent_url)).await;
    let did = "did:poros:legacy:hotel-lisbon";

    let proposal = json!({"roomType": "double", "nights": 3, "budget": 240});
    let response = client
        .post(format!("{api}/orchestrate/propose"))
        .json(&json!({"agentDid": did, "proposal": proposal}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["proposalId"], "prop-1");
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["terms"], proposal);

    let response = client
        .post(format!("{api}/orchestrate/commit"))
        .json(&json!({
            "agentDid": did,
            "proposalId": "prop-1",
            "paymentProof": "payment-token-9",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["commitmentId"], "commit-1");
    assert_eq!(body["received"]["proposalId"], "prop-1");
    assert_eq!(body["received"]["paymentProof"], "payment-token-9");

    let response = client
        .post(format!("{api}/orchestrate/cancel"))
        .json(&json!({
            "agentDid": did,
            "commitmentId": "commit-1",
            "reason": "plans changed",
            "refundRequested": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["received"]["commitmentId"], "commit-1");
    assert_eq!(body["received"]["reason"], "plans changed");
    assert_eq!(body["received"]["refundRequested"], true);
}

#[tokio::test]
async fn unknown_dids_are_404() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{api}/orchestrate/query"))
        .json(&json!({
            "agentDid": "did:poros:ed25519:nobody",
            "query": {"question": "hello?"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Agent with DID did:poros:ed25519:nobody not found"
    );
}

#[tokio::test]
async fn inactive_agents_refuse_every_verb() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool.clone()).await;
    let client = reqwest::Client::new();
    let agent_url = booking_agent().await;
    register_card(&client, &api, hotel_card(&agent_url)).await;
    {
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE agents SET is_active = 0 WHERE agent_id = 'hotel-lisbon'",
            [],
        )
        .unwrap();
    }
    let did = "did:poros:legacy:hotel-lisbon";

    let response = client
        .post(format!("{api}/orchestrate/query"))
        .json(&json!({"agentDid": did, "query": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Agent is not active");

    let response = client
        .post(format!("{api}/orchestrate/propose"))
        .json(&json!({"agentDid": did, "proposal": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // And a deactivated agent disappears from discovery.
    let agents = discover(&client, &api, json!({"capability": "booking"})).await;
    assert!(agents.is_empty());
}

#[tokio::test]
async fn unreachable_agents_are_a_502() {
    let (pool, _dir) = test_pool();
    let api = serve_api(pool).await;
    let client = reqwest::Client::new();
    register_card(&client, &api, hotel_card(&dead_url())).await;

    let response = client
        .post(format!("{api}/orchestrate/query"))
        .json(&json!({
            "agentDid": "did:poros:legacy:hotel-lisbon",
            "query": {"question": "anyone?"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to communicate with agent"));
}
