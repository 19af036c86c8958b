//! Integration tests for the onboarding REST API.
//!
//! Each test spins up an Axum server on a random port backed by mock
//! integrations and exercises the real HTTP contract with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use onboard_agent::config::EngineConfig;
use onboard_agent::integrations::Dispatcher;
use onboard_agent::onboarding::{Orchestrator, onboarding_routes};
use onboard_agent::store::Store;
use onboard_agent::workflow::TemplateSet;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an Axum server on a random port, return (base url, orchestrator).
async fn start_server() -> (String, Orchestrator) {
    let config = EngineConfig {
        base_backoff: Duration::from_millis(1),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::new(Store::in_memory()),
        Arc::new(TemplateSet::builtin().unwrap()),
        Arc::new(Dispatcher::new(&config)),
        config,
    );
    let app = onboarding_routes(orchestrator.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), orchestrator)
}

async fn onboard(client: &reqwest::Client, base: &str, body: Value) -> (u16, Value) {
    let resp = client
        .post(format!("{base}/api/onboard"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Poll the employee view until no task is pending or in progress, or
/// only manual work is left.
async fn wait_settled(client: &reqwest::Client, base: &str, id: &str) -> Value {
    timeout(TEST_TIMEOUT, async {
        loop {
            let view: Value = client
                .get(format!("{base}/api/employees/{id}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let busy = view["tasks"].as_array().unwrap().iter().any(|t| {
                t["status"] == "in_progress" || (t["status"] == "pending" && t["manual"] != true)
            });
            if !busy {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("employee did not settle in time")
}

#[tokio::test]
async fn health_reports_backend_modes() {
    let (base, _o) = start_server().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["integrations"]["slack"], "mock");
    assert_eq!(body["employees"], 0);
}

#[tokio::test]
async fn onboard_and_track_to_completion() {
    let (base, _o) = start_server().await;
    let client = reqwest::Client::new();

    let (status, created) = onboard(
        &client,
        &base,
        json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "role": "Software Engineer",
            "team": "Platform",
            "github_username": "ada",
            "start_date": "2026-11-02"
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(created["role_key"], "engineering");
    assert_eq!(created["total_tasks"], 10);
    assert_eq!(created["start_date"], "2026-11-02");

    let id = created["id"].as_str().unwrap().to_string();
    let done = wait_settled(&client, &base, &id).await;
    assert_eq!(done["progress_percent"], 100);
    assert_eq!(done["completed_tasks"], 10);

    let list: Value = client
        .get(format!("{base}/api/employees"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["employees"][0]["name"], "Ada Lovelace");
    assert_eq!(list["employees"][0]["progress_percent"], 100);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (base, o) = start_server().await;
    let client = reqwest::Client::new();

    let (status, body) = onboard(
        &client,
        &base,
        json!({ "name": "Ada", "email": "nope", "role": "Engineer", "team": "Platform" }),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("email"));

    let (status, _) = onboard(&client, &base, json!({ "name": "Ada" })).await;
    assert_eq!(status, 400);
    assert!(o.list().await.is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let (base, _o) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/employees/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client
        .get(format!("{base}/api/employees/{}", uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = client
        .post(format!(
            "{base}/api/employees/{}/tasks/abc/complete",
            uuid::Uuid::new_v4()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn complete_manual_task_over_http() {
    let (base, _o) = start_server().await;
    let client = reqwest::Client::new();

    let (_, created) = onboard(
        &client,
        &base,
        json!({ "name": "Grace", "email": "grace@example.com", "role": "Designer", "team": "Brand" }),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let view = wait_settled(&client, &base, &id).await;
    assert!(view["progress_percent"].as_u64().unwrap() < 100);

    let manual = view["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["manual"] == true)
        .unwrap();
    let task_id = manual["id"].as_str().unwrap();
    let url = format!("{base}/api/employees/{id}/tasks/{task_id}/complete");

    let resp = client
        .post(&url)
        .json(&json!({ "details": "Met the team on Thursday" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["changed"], true);
    assert_eq!(body["progress_percent"], 100);
    assert_eq!(body["task"]["detail"], "Met the team on Thursday");

    // Completing again is a harmless no-op.
    let body: Value = client
        .post(&url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["changed"], false);

    // A completed task cannot be retried.
    let resp = client
        .post(format!("{base}/api/employees/{id}/tasks/{task_id}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn checklist_lookup() {
    let (base, _o) = start_server().await;
    let body: Value = reqwest::get(format!("{base}/api/checklist/Senior%20Backend%20Developer"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["role_key"], "engineering");
    assert_eq!(body["repos"], json!(["platform-api", "web-app"]));
    assert!(
        body["channels"]
            .as_array()
            .unwrap()
            .contains(&json!("#engineering"))
    );
}
