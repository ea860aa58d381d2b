use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode as AxumStatus;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use drtrigger_api::app::{build_app, AppState};
use drtrigger_infra::jobs::{Dispatcher, DispatcherConfig, DispatcherHandle, InMemoryJobStore, JobStore};
use drtrigger_infra::secrets::VaultSecretResolver;
use drtrigger_infra::trigger::WebhookTrigger;

/// Serve a router on an ephemeral port; aborted on drop.
struct Served {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Served {
    async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for Served {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Downstream webhook whose response status can be changed mid-test.
#[derive(Clone, Default)]
struct WebhookTarget {
    status: Arc<Mutex<u16>>,
    calls: Arc<Mutex<Vec<(HashMap<String, String>, Value)>>>,
}

impl WebhookTarget {
    fn respond_with(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    fn calls(&self) -> Vec<(HashMap<String, String>, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

async fn webhook(
    State(target): State<WebhookTarget>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> AxumStatus {
    target.calls.lock().unwrap().push((query, body));
    let status = *target.status.lock().unwrap();
    AxumStatus::from_u16(status).unwrap()
}

struct TestEnv {
    api: Served,
    _vault: Served,
    _jenkins: Served,
    target: WebhookTarget,
    store: Arc<InMemoryJobStore>,
    dispatcher: Option<DispatcherHandle>,
}

impl TestEnv {
    /// API + dispatcher wired to a fake Vault and a fake Jenkins webhook.
    async fn spawn() -> Self {
        let target = WebhookTarget::default();
        target.respond_with(200);
        let jenkins = Served::spawn(
            Router::new()
                .route("/generic-webhook-trigger/invoke", post(webhook))
                .with_state(target.clone()),
        )
        .await;

        let hook_url = format!("{}/generic-webhook-trigger/invoke", jenkins.base_url);
        let vault = Served::spawn(Router::new().route(
            "/v1/secret/data/jenkins/DR-Pipeline",
            get(move || {
                let hook_url = hook_url.clone();
                async move {
                    Json(json!({
                        "data": { "data": { "webhook_url": hook_url, "webhook_token": "dr-token" } }
                    }))
                }
            }),
        ))
        .await;

        let store = InMemoryJobStore::arc();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let secrets = Arc::new(VaultSecretResolver::new(client.clone(), vault.base_url.clone(), "root", "secret"));
        let trigger = Arc::new(WebhookTrigger::new(client, secrets, "DR-Pipeline"));

        let config = DispatcherConfig::default()
            .with_dequeue_timeout(Duration::from_millis(50))
            .with_backoff(Duration::from_millis(5), Duration::from_millis(20));
        let dispatcher = Dispatcher::new(store.clone(), trigger).spawn(config, CancellationToken::new());

        let api = Served::spawn(build_app(AppState::new(store.clone()))).await;

        Self {
            api,
            _vault: vault,
            _jenkins: jenkins,
            target,
            store,
            dispatcher: Some(dispatcher),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.base_url, path)
    }

    async fn shutdown(mut self) {
        if let Some(d) = self.dispatcher.take() {
            d.shutdown().await;
        }
    }
}

/// API only, no dispatcher: queued jobs stay queued.
async fn api_only(store: Arc<InMemoryJobStore>) -> Served {
    Served::spawn(build_app(AppState::new(store))).await
}

async fn trigger(client: &reqwest::Client, url: String, body: Value) -> Value {
    let res = client.post(url).json(&body).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn status_eventually(client: &reqwest::Client, url: String, expected: &str) -> Value {
    // Dispatch is asynchronous; poll until the status table catches up.
    for _ in 0..200 {
        let res = client.get(&url).send().await.unwrap();
        if res.status() == StatusCode::OK {
            let body: Value = res.json().await.unwrap();
            if body["status"] == expected {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not reach status {expected} in time");
}

fn is_job_id(id: &str) -> bool {
    let mut parts = id.splitn(3, '-');
    parts.next() == Some("dr")
        && parts.next().is_some_and(|ms| !ms.is_empty() && ms.chars().all(|c| c.is_ascii_digit()))
        && parts
            .next()
            .is_some_and(|s| s.len() == 9 && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[tokio::test]
async fn trigger_then_dispatch_success_and_failure() {
    let env = TestEnv::spawn().await;
    let client = reqwest::Client::new();

    let queued = trigger(&client, env.url("/trigger"), json!({ "parameters": { "skip_tests": "true" } })).await;
    assert_eq!(queued["statusCode"], 200);
    assert_eq!(queued["message"], "DR job queued successfully");
    assert!(queued["queue_position"].as_u64().unwrap() >= 1);
    assert_eq!(queued["parameters"]["skip_tests"], "true");
    assert_eq!(queued["parameters"]["deploy_standby_only"], "false");
    let job_id = queued["job_id"].as_str().unwrap().to_string();
    assert!(is_job_id(&job_id), "unexpected job id {job_id}");

    let done = status_eventually(&client, env.url(&format!("/job/{job_id}/status")), "triggered").await;
    assert_eq!(done["id"], job_id.as_str());
    assert_eq!(done["jenkins_response_status"], 200);
    assert!(done["jenkins_triggered_at"].is_string());

    let calls = env.target.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.get("token").map(String::as_str), Some("dr-token"));
    assert_eq!(calls[0].1["parameters"]["skip_tests"], "true");

    env.target.respond_with(500);
    let queued = trigger(&client, env.url("/trigger"), json!({})).await;
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    let failed = status_eventually(&client, env.url(&format!("/job/{job_id}/status")), "failed").await;
    assert_eq!(failed["error"], "Jenkins returned status 500");
    assert!(failed["failed_at"].is_string());

    // Failures are terminal: nothing was put back on the queue.
    assert_eq!(env.store.queue_depth().await.unwrap(), 0);
    assert_eq!(env.store.processing_depth().await.unwrap(), 0);
    assert_eq!(env.target.calls().len(), 2);

    env.shutdown().await;
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let api = api_only(InMemoryJobStore::arc()).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/job/dr-0-doesnotex/status", api.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Job not found" }));
}

#[tokio::test]
async fn queued_job_is_not_visible_until_dispatched() {
    let store = InMemoryJobStore::arc();
    let api = api_only(store.clone()).await;
    let client = reqwest::Client::new();

    let queued = trigger(&client, format!("{}/trigger", api.base_url), json!({})).await;
    let job_id = queued["job_id"].as_str().unwrap();

    let res = client
        .get(format!("{}/job/{}/status", api.base_url, job_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_store_connectivity() {
    let store = InMemoryJobStore::arc();
    let api = api_only(store.clone()).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", api.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["redis"], "connected");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    store.set_offline(true);
    let body: Value = client
        .get(format!("{}/health", api.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["redis"], "disconnected");
}

#[tokio::test]
async fn queue_status_counts_waiting_jobs() {
    let store = InMemoryJobStore::arc();
    let api = api_only(store.clone()).await;
    let client = reqwest::Client::new();

    for expected in 1..=3u64 {
        let queued = trigger(&client, format!("{}/trigger", api.base_url), json!({})).await;
        assert_eq!(queued["queue_position"], expected);
    }
    store.mark_processing("in-flight").await.unwrap();

    let body: Value = client
        .get(format!("{}/queue/status", api.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["queued"], 3);
    assert_eq!(body["processing"], 1);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn empty_and_malformed_bodies() {
    let api = api_only(InMemoryJobStore::arc()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/trigger", api.base_url))
        .header("user-agent", "dr-cli/1.0")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["parameters"], json!({
        "deploy_standby_only": "false",
        "destroy_after_apply": "false",
        "skip_tests": "false"
    }));

    let res = client
        .post(format!("{}/trigger", api.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");

    for mistyped in [
        json!({ "parameters": "yes" }),
        json!({ "parameters": { "skip_tests": { "x": 1 } } }),
        json!({ "parameters": { "skip_tests": ["true"] } }),
    ] {
        let body = trigger(&client, format!("{}/trigger", api.base_url), mistyped).await;
        assert_eq!(body["parameters"]["skip_tests"], "false");
    }
}

#[tokio::test]
async fn store_outage_fails_the_trigger_call() {
    let store = InMemoryJobStore::arc();
    let api = api_only(store.clone()).await;
    let client = reqwest::Client::new();
    store.set_offline(true);

    let res = client
        .post(format!("{}/trigger", api.base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Trigger execution failed");
    assert!(body["message"].as_str().unwrap().contains("unavailable"));

    let res = client.get(format!("{}/queue/status", api.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
