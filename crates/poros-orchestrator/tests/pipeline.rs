//! End-to-end pipeline tests against live loopback agents.

use axum::{routing::post, Json, Router};
use poros_db::agents::NewAgent;
use poros_db::logs::LogFilter;
use poros_db::{open_pool, run_migrations, DbPool, DbSettings};
use poros_orchestrator::{
    OrchestrateError, Orchestrator, OrchestratorSettings, SessionSettings, SessionStore,
};
use poros_ranking::Ranker;
use poros_types::{AgentMetrics, CallStatus, OrchestrateRequest, RankStrategy};
use serde_json::json;
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

fn orchestrator(pool: DbPool, settings: OrchestratorSettings) -> Orchestrator {
    Orchestrator::new(
        pool,
        Ranker::keyword_only(),
        reqwest::Client::new(),
        SessionStore::new(SessionSettings::default()),
        settings,
    )
}

fn register(pool: &DbPool, id: &str, url: &str, tags: &[&str]) {
    let conn = pool.get().unwrap();
    poros_db::agents::insert_agent(
        &conn,
        &NewAgent {
            agent_id: id.to_string(),
            did: None,
            name: format!("{id} agent"),
            description: "pipeline fixture".to_string(),
            url: url.to_string(),
            preferred_transport: "JSONRPC".to_string(),
            skills_tags: tags.iter().map(|t| t.to_string()).collect(),
            card: json!({
                "name": format!("{id} agent"),
                "skills": [{"id": id, "name": format!("{id} skill")}]
            }),
        },
    )
    .unwrap();
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn echo_agent() -> String {
    serve(Router::new().route(
        "/query",
        post(|Json(body): Json<serde_json::Value>| async move {
            Json(json!({"status": "success", "result": {"echo": body["query"]}}))
        }),
    ))
    .await
}

async fn failing_agent() -> String {
    serve(Router::new().route(
        "/query",
        post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await
}

async fn slow_agent(delay: Duration) -> String {
    serve(Router::new().route(
        "/query",
        post(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({"status": "success"}))
        }),
    ))
    .await
}

/// A base URL nobody is listening on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn fan_out_aggregates_results_and_records_the_transaction() {
    let (pool, _dir) = test_pool();
    let weather_url = echo_agent().await;
    let news_url = echo_agent().await;
    register(&pool, "weather", &weather_url, &["weather"]);
    register(&pool, "news", &news_url, &["news"]);

    let orch = orchestrator(pool.clone(), OrchestratorSettings::default());
    let response = orch
        .orchestrate(OrchestrateRequest::new("what happened today"))
        .await
        .unwrap();

    assert_eq!(response.query, "what happened today");
    assert_eq!(response.selected_agents.len(), 2);
    assert_eq!(response.results.len(), 2);
    for (selected, result) in response.selected_agents.iter().zip(&response.results) {
        assert_eq!(selected.agent_id, result.agent_id);
        assert_eq!(result.status, CallStatus::Success);
        assert!(result.latency_ms > 0.0);
        assert_eq!(result.result.as_ref().unwrap()["result"]["echo"], "what happened today");
    }
    assert!(response.summary.contains("Agents responded: 2/2"));
    assert!(response.latency_ms > 0.0);

    // Metrics absorbed one successful call each.
    let conn = pool.get().unwrap();
    let weather = poros_db::agents::get_agent(&conn, "weather").unwrap().unwrap();
    assert_eq!(weather.total_calls, 1);
    assert_eq!(weather.success_rate, 1.0);
    assert!(weather.avg_latency_ms > 0.0);

    // Exactly one audit record.
    let logs = poros_db::logs::query_logs(&conn, &LogFilter::default()).unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].success);
    assert_eq!(logs[0].selected_agent_ids.len(), 2);
    assert_eq!(logs[0].results.len(), 2);
}

#[tokio::test]
async fn one_failing_agent_does_not_disturb_the_others() {
    let (pool, _dir) = test_pool();
    let good_url = echo_agent().await;
    let bad_url = failing_agent().await;
    register(&pool, "good", &good_url, &["test"]);
    register(&pool, "bad", &bad_url, &["test"]);

    let orch = orchestrator(pool.clone(), OrchestratorSettings::default());
    let response = orch
        .orchestrate(OrchestrateRequest::new("anything"))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    let by_id = |id: &str| response.results.iter().find(|r| r.agent_id == id).unwrap();
    assert_eq!(by_id("good").status, CallStatus::Success);
    assert_eq!(by_id("bad").status, CallStatus::Error);
    assert!(by_id("bad").error.as_ref().unwrap().contains("HTTP 500"));
    assert_eq!(by_id("bad").latency_ms, 0.0);

    let conn = pool.get().unwrap();
    let good = poros_db::agents::get_agent(&conn, "good").unwrap().unwrap();
    let bad = poros_db::agents::get_agent(&conn, "bad").unwrap().unwrap();
    assert_eq!(good.success_rate, 1.0);
    assert!((bad.success_rate - 0.9).abs() < 1e-9);
    assert_eq!(bad.avg_latency_ms, 0.0);

    let logs = poros_db::logs::query_logs(&conn, &LogFilter::default()).unwrap();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);
}

#[tokio::test]
async fn unreachable_agents_become_error_outcomes() {
    let (pool, _dir) = test_pool();
    let gone = dead_url().await;
    register(&pool, "gone", &gone, &[]);

    let orch = orchestrator(pool, OrchestratorSettings::default());
    let response = orch.orchestrate(OrchestrateRequest::new("hello")).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].status, CallStatus::Error);
    assert!(response.results[0].error.as_ref().unwrap().contains("agent unreachable"));
    assert_eq!(response.summary, "No agents successfully responded to your query.");
}

#[tokio::test]
async fn slow_agents_time_out_in_isolation() {
    let (pool, _dir) = test_pool();
    let fast_url = echo_agent().await;
    let slow_url = slow_agent(Duration::from_secs(5)).await;
    register(&pool, "fast", &fast_url, &[]);
    register(&pool, "slow", &slow_url, &[]);

    let settings = OrchestratorSettings {
        dispatch_timeout: Duration::from_millis(300),
        ..OrchestratorSettings::default()
    };
    let orch = orchestrator(pool, settings);
    let response = orch.orchestrate(OrchestrateRequest::new("quick")).await.unwrap();

    let by_id = |id: &str| response.results.iter().find(|r| r.agent_id == id).unwrap();
    assert_eq!(by_id("fast").status, CallStatus::Success);
    assert_eq!(by_id("slow").status, CallStatus::Error);
    assert!(by_id("slow").error.as_ref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn discovery_filters_by_tag_and_fails_when_empty() {
    let (pool, _dir) = test_pool();
    let url = echo_agent().await;
    register(&pool, "weather", &url, &["weather"]);

    let orch = orchestrator(pool, OrchestratorSettings::default());

    let mut request = OrchestrateRequest::new("forecast please");
    request.skill_tags = vec!["weather".to_string()];
    let response = orch.orchestrate(request).await.unwrap();
    assert_eq!(response.selected_agents[0].agent_id, "weather");

    let mut request = OrchestrateRequest::new("forecast please");
    request.skill_tags = vec!["finance".to_string()];
    let err = orch.orchestrate(request).await.unwrap_err();
    assert!(matches!(err, OrchestrateError::NoAgentsFound));
    assert_eq!(err.to_string(), "No agents found matching criteria");
}

#[tokio::test]
async fn preferred_agents_are_dispatched_first() {
    let (pool, _dir) = test_pool();
    let alpha_url = echo_agent().await;
    let beta_url = echo_agent().await;
    register(&pool, "alpha", &alpha_url, &["test"]);
    register(&pool, "beta", &beta_url, &["test"]);

    // Give beta clearly worse metrics so ranking alone would not pick it.
    {
        let conn = pool.get().unwrap();
        poros_db::agents::update_metrics(
            &conn,
            "beta",
            &AgentMetrics {
                total_calls: 50,
                success_rate: 0.4,
                avg_latency_ms: 4500.0,
            },
        )
        .unwrap();
    }

    let orch = orchestrator(pool, OrchestratorSettings::default());
    let mut request = OrchestrateRequest::new("anything");
    request.strategy = RankStrategy::Performance;
    request.prefer_agent_ids = vec!["beta".to_string()];
    request.max_agents = Some(1);

    let response = orch.orchestrate(request).await.unwrap();
    assert_eq!(response.selected_agents.len(), 1);
    assert_eq!(response.selected_agents[0].agent_id, "beta");
}

#[tokio::test]
async fn sessions_prefer_agents_that_served_them_before() {
    let (pool, _dir) = test_pool();
    let alpha_url = echo_agent().await;
    let beta_url = echo_agent().await;
    register(&pool, "alpha", &alpha_url, &["test"]);
    register(&pool, "beta", &beta_url, &["test"]);
    {
        let conn = pool.get().unwrap();
        poros_db::agents::update_metrics(
            &conn,
            "beta",
            &AgentMetrics {
                total_calls: 50,
                success_rate: 0.4,
                avg_latency_ms: 4500.0,
            },
        )
        .unwrap();
    }

    let orch = orchestrator(pool, OrchestratorSettings::default());

    // First request pins beta explicitly; its success is remembered.
    let mut first = OrchestrateRequest::new("hello");
    first.strategy = RankStrategy::Performance;
    first.prefer_agent_ids = vec!["beta".to_string()];
    first.max_agents = Some(1);
    first.session_id = Some("s-1".to_string());
    orch.orchestrate(first).await.unwrap();
    assert_eq!(orch.sessions().preferred_agents("s-1"), vec!["beta".to_string()]);

    // Follow-up in the same session sticks with beta without being asked.
    let mut second = OrchestrateRequest::new("hello again");
    second.strategy = RankStrategy::Performance;
    second.max_agents = Some(1);
    second.session_id = Some("s-1".to_string());
    let response = orch.orchestrate(second).await.unwrap();
    assert_eq!(response.selected_agents[0].agent_id, "beta");

    // A fresh session ranks normally.
    let mut other = OrchestrateRequest::new("hello");
    other.strategy = RankStrategy::Performance;
    other.max_agents = Some(1);
    other.session_id = Some("s-2".to_string());
    let response = orch.orchestrate(other).await.unwrap();
    assert_eq!(response.selected_agents[0].agent_id, "alpha");
}
