// Integration tests for the remote automation backend client, against a
// loopback HTTP server speaking the backend's wire protocol.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use sevafill::resolver::{ProfileData, ResolvedValueMap, resolve};
use sevafill::{AutomationBridge, BridgeConfig, SiteRegistry, TaskStatus};

/// Scripted backend: one task, reported as running once and completed on
/// every later status read.
#[derive(Default)]
struct Backend {
    polls: AtomicUsize,
    start_request: Mutex<Option<Value>>,
}

async fn health() -> &'static str {
    "ok"
}

async fn start_automation(
    State(backend): State<Arc<Backend>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    *backend.start_request.lock().unwrap() = Some(body);
    Json(json!({
        "task_id": "remote-task-1",
        "status": "queued",
        "message": "Automation queued"
    }))
}

async fn task_status(
    State(backend): State<Arc<Backend>>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    let poll = backend.polls.fetch_add(1, Ordering::SeqCst);
    if poll == 0 {
        Json(json!({
            "task_id": task_id,
            "status": "running",
            "progress": 40,
            "log": ["Opened portal", "Filling consumer number"]
        }))
    } else {
        Json(json!({
            "task_id": task_id,
            "status": "completed",
            "progress": 100,
            "log": ["Opened portal", "Filling consumer number", "Form ready for review"],
            "result": { "confirmation": "CN-99", "fields_filled": 3 }
        }))
    }
}

async fn spawn_backend() -> (SocketAddr, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/selenium/start-automation", post(start_automation))
        .route("/api/selenium/task-status/:task_id", get(task_status))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend)
}

fn fast_bridge(addr: SocketAddr) -> AutomationBridge {
    let mut config = BridgeConfig::new(&format!("http://{addr}/"));
    config.poll_interval = Duration::from_millis(10);
    config.poll_deadline = Duration::from_secs(5);
    AutomationBridge::new(config)
}

fn gas_values() -> ResolvedValueMap {
    let registry = SiteRegistry::builtin();
    let site = registry.lookup("www.gujaratgas.com").unwrap();
    let profile = ProfileData::from_pairs(&[
        ("consumer_number", "CN123"),
        ("mobile", "9876543210"),
        ("email", "user@example.in"),
    ]);
    resolve(site, Some(&profile), None, &HashMap::new())
        .unwrap()
        .values
}

#[tokio::test]
async fn test_health_check_against_live_and_dead_backends() {
    let (addr, _backend) = spawn_backend().await;
    assert!(fast_bridge(addr).health_check().await);

    let dead = AutomationBridge::new(BridgeConfig::new("http://127.0.0.1:9"));
    assert!(!dead.health_check().await);
}

#[tokio::test]
async fn test_request_automation_ships_form_data_and_adopts_remote_id() {
    let (addr, backend) = spawn_backend().await;
    let bridge = fast_bridge(addr);

    let task = bridge
        .request_automation("gas_name_change", &gas_values())
        .await
        .unwrap();

    assert_eq!(task.id, "remote-task-1");
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.log, vec!["Automation queued".to_string()]);

    let request = backend.start_request.lock().unwrap().clone().unwrap();
    assert_eq!(request["service_type"], "gas_name_change");
    assert_eq!(request["source"], "library");
    assert_eq!(request["form_data"]["consumer_number"], "CN123");
    assert_eq!(request["form_data"]["mobile"], "9876543210");
}

#[tokio::test]
async fn test_wait_for_completion_follows_the_status_sequence() {
    let (addr, backend) = spawn_backend().await;
    let bridge = fast_bridge(addr);

    let task = bridge
        .request_automation("gas_name_change", &gas_values())
        .await
        .unwrap();
    let done = bridge.wait_for_completion(&task).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    let result = done.result.unwrap();
    assert_eq!(result.confirmation.as_deref(), Some("CN-99"));
    assert_eq!(result.fields_filled, 3);
    // The backend's log snapshot replaced the locally seeded one.
    assert_eq!(
        done.log,
        vec![
            "Opened portal".to_string(),
            "Filling consumer number".to_string(),
            "Form ready for review".to_string(),
        ]
    );
    assert!(backend.polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_unreachable_backend_fails_fast_before_any_task() {
    let bridge = AutomationBridge::new(BridgeConfig::new("http://127.0.0.1:9"));

    let err = bridge
        .request_automation("gas_name_change", &gas_values())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("127.0.0.1:9"));
}

#[tokio::test]
async fn test_poll_deadline_surfaces_as_failed_task() {
    // A backend that never reaches a terminal state.
    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/api/selenium/task-status/:task_id",
            get(|Path(task_id): Path<String>| async move {
                Json(json!({ "task_id": task_id, "status": "running", "progress": 10 }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = BridgeConfig::new(&format!("http://{addr}"));
    config.poll_interval = Duration::from_millis(10);
    config.poll_deadline = Duration::from_millis(50);
    let bridge = AutomationBridge::new(config);

    let mut task = sevafill::AutomationTask::new("gas_name_change");
    task.id = "stuck-task".to_string();
    task.start();

    let done = bridge.wait_for_completion(&task).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.unwrap().contains("stopped polling"));
}

#[tokio::test]
async fn test_subscribe_publishes_until_terminal() {
    let (addr, _backend) = spawn_backend().await;
    let bridge = fast_bridge(addr);

    let task = bridge
        .request_automation("gas_name_change", &gas_values())
        .await
        .unwrap();
    let subscription = bridge.subscribe(&task);
    let mut receiver = subscription.receiver();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            receiver.changed().await.unwrap();
            let snapshot = receiver.borrow().clone();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.result.unwrap().confirmation.as_deref(), Some("CN-99"));
    subscription.stop();
}
