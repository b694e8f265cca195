//! Integration tests for the invocation engine's HTTP surface
//!
//! Functions lifecycle endpoints run against a real bound axum router, no
//! docker required. Invocation endpoints need a live docker daemon and a
//! runtime image, so they're gated behind `#[ignore]` — run them with
//! `cargo test -- --ignored` on a machine that has docker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use barq_runtime::function::RuntimeFamily;
use barq_runtime::handlers::{self, EngineState};
use barq_runtime::registry::{FanOutTelemetrySink, InMemoryRegistry};
use barq_runtime::runtimes::python::PythonRuntime;
use barq_runtime::runtimes::RuntimeAdapter;
use barq_runtime::{ContainerDriver, Invoker, WarmPool, WorkspaceStore};
use tokio::net::TcpListener;

async fn start_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let registry = Arc::new(InMemoryRegistry::new());
    let driver = Arc::new(ContainerDriver::new("bridge"));
    let pool = Arc::new(WarmPool::new((*driver).clone(), 5, Duration::from_secs(300)));
    let telemetry = Arc::new(FanOutTelemetrySink::new());
    let workspace = Arc::new(WorkspaceStore::new().unwrap());

    let mut adapters: HashMap<RuntimeFamily, Arc<dyn RuntimeAdapter>> = HashMap::new();
    adapters.insert(RuntimeFamily::Python, Arc::new(PythonRuntime::new(driver.clone())));

    let invoker = Arc::new(Invoker::new(
        registry.clone(),
        pool.clone(),
        telemetry.clone(),
        workspace.clone(),
        adapters,
    ));

    let state = Arc::new(EngineState {
        registry,
        pool,
        telemetry,
        workspace,
        invoker,
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/functions/runtimes", get(handlers::list_runtimes))
        .route("/functions", post(handlers::create_function).get(handlers::list_functions))
        .route(
            "/functions/:func_id",
            get(handlers::get_function).delete(handlers::delete_function),
        )
        .route("/functions/:func_id/invoke", post(handlers::invoke_function))
        .route("/functions/:func_id/stats", get(handlers::function_stats))
        .route("/pool/stats", get(handlers::pool_stats))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn health_check_responds_ok() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn create_get_list_delete_function_round_trips() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let create_resp = client
        .post(format!("{base}/functions"))
        .json(&serde_json::json!({
            "func_id": "greet",
            "runtime": "python3.11",
            "entrypoint": "handler.main",
            "code": "def main(event, context):\n    return {'ok': True}\n",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(create_resp.status(), 201);

    let get_resp = client.get(format!("{base}/functions/greet")).send().await.unwrap();
    assert_eq!(get_resp.status(), 200);

    let list_resp: Vec<serde_json::Value> = client
        .get(format!("{base}/functions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list_resp.len(), 1);

    let delete_resp = client.delete(format!("{base}/functions/greet")).send().await.unwrap();
    assert_eq!(delete_resp.status(), 204);

    let missing_resp = client.get(format!("{base}/functions/greet")).send().await.unwrap();
    assert_eq!(missing_resp.status(), 404);
}

#[tokio::test]
async fn create_function_rejects_unknown_runtime() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/functions"))
        .json(&serde_json::json!({
            "func_id": "bad",
            "runtime": "ruby3.2",
            "entrypoint": "handler.main",
            "code": "",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn create_function_rejects_duplicate_func_id() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "func_id": "dup",
        "runtime": "python3.11",
        "entrypoint": "handler.main",
        "code": "def main(event, context):\n    return event\n",
    });
    let first = client.post(format!("{base}/functions")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 201);
    let second = client.post(format!("{base}/functions")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
#[ignore = "requires a running docker daemon with the python:3.11-slim image"]
async fn invoke_runs_a_cold_python_function() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/functions"))
        .json(&serde_json::json!({
            "func_id": "echo",
            "runtime": "python3.11",
            "entrypoint": "handler.main",
            "code": "def main(event, context):\n    return event\n",
        }))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/functions/echo/invoke"))
        .json(&serde_json::json!({"hello": "world"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
#[ignore = "requires a running docker daemon with the python:3.11-slim image"]
async fn second_invoke_reuses_the_warm_container() {
    let (base, _handle) = start_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/functions"))
        .json(&serde_json::json!({
            "func_id": "echo2",
            "runtime": "python3.11",
            "entrypoint": "handler.main",
            "code": "def main(event, context):\n    return event\n",
        }))
        .send()
        .await
        .unwrap();

    let first: serde_json::Value = client
        .post(format!("{base}/functions/echo2/invoke"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["execution_type"], "cold");

    // Give the opportunistic warm-up a moment to finish.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let second: serde_json::Value = client
        .post(format!("{base}/functions/echo2/invoke"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["execution_type"], "reused");
}
