use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use arith_api::{create_app, AppState};
use arith_core::ApiConfig;
use arith_domain::{FixedPriority, SeededPriority, TaskScheduleService, TaskService};
use arith_infrastructure::InMemoryDispatchQueue;
use arith_testing_utils::TestDatabase;

struct TestApp {
    db: TestDatabase,
    queue: InMemoryDispatchQueue,
    router: Router,
}

async fn setup() -> TestApp {
    setup_with(Arc::new(FixedPriority(5))).await
}

async fn setup_with(priority: Arc<dyn arith_domain::PriorityResolver>) -> TestApp {
    let db = TestDatabase::sqlite().await.unwrap();
    let queue = InMemoryDispatchQueue::new();
    let tasks = db.manager.task_repository();

    let state = AppState {
        task_service: Arc::new(TaskService::new(
            tasks.clone(),
            Arc::new(queue.clone()),
            priority,
        )),
        task_schedule_service: Arc::new(TaskScheduleService::new(
            db.manager.task_schedule_repository(),
            tasks,
        )),
    };
    let router = create_app(state, &ApiConfig::default());
    TestApp { db, queue, router }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_task_is_accepted_and_enqueued() {
    let app = setup().await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/tasks",
        Some(json!({"operation": "1+1", "priority": 7})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["operation"], "1+1");
    assert_eq!(body["data"]["priority"], 7);
    assert_eq!(body["data"]["status"], "PENDING");
    assert!(body["data"]["result"].is_null());

    let task_id = body["data"]["task_id"].as_i64().unwrap();
    let queued = app.queue.snapshot();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].task_id, task_id);
    assert_eq!(queued[0].priority, 7);
}

#[tokio::test]
async fn test_missing_priority_uses_resolver() {
    let app = setup_with(Arc::new(SeededPriority::new(7))).await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/tasks",
        Some(json!({"operation": "3.5+1"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["data"]["priority"].as_u64().unwrap() <= 9);
}

#[tokio::test]
async fn test_invalid_task_payloads_are_rejected() {
    let app = setup().await;
    let cases = vec![
        json!({"operation": "1-1"}),
        json!({"operation": "1+1+1"}),
        json!({"operation": "invalid+operation"}),
        json!({"operation": "1+1", "priority": 10}),
        json!({"operation": "1+1", "priority": -1}),
        json!({"operation": "1+1", "priority": "high"}),
        json!({"operation": 123}),
        json!({"priority": 3}),
    ];

    for payload in cases {
        let (status, body) = send(&app.router, "POST", "/api/tasks", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert_eq!(body["error"]["code"], 400);
    }
    assert!(app.queue.is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = setup().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tasks")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_create() {
    let app = setup().await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/tasks/batch",
        Some(json!([
            {"operation": "1+1", "priority": 5},
            {"operation": "2+2", "priority": 3}
        ])),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["operation"], "1+1");
    assert_eq!(data[1]["priority"], 3);
    assert_eq!(app.queue.len(), 2);
}

#[tokio::test]
async fn test_batch_with_one_invalid_item_creates_nothing() {
    let app = setup().await;
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/tasks/batch",
        Some(json!([
            {"operation": "1+1", "priority": 5},
            {"operation": "invalid_operation"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.queue.is_empty());

    let (status, _) = send(&app.router, "GET", "/api/tasks/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_limit_and_empty_batch() {
    let app = setup().await;
    let too_many: Vec<Value> = (0..101)
        .map(|i| json!({"operation": format!("{i}+{i}")}))
        .collect();
    let (status, _) = send(&app.router, "POST", "/api/tasks/batch", Some(json!(too_many))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.queue.is_empty());

    let (status, body) = send(&app.router, "POST", "/api/tasks/batch", Some(json!([]))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_non_numeric_id_uses_error_envelope() {
    let app = setup().await;
    for (method, uri) in [
        ("GET", "/api/tasks/abc"),
        ("DELETE", "/api/tasks/abc"),
        ("GET", "/api/task-schedules/abc"),
        ("DELETE", "/api/task-schedules/abc"),
    ] {
        let (status, body) = send(&app.router, method, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(body["error"]["type"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_get_and_delete_task() {
    let app = setup().await;
    let (_, body) = send(
        &app.router,
        "POST",
        "/api/tasks",
        Some(json!({"operation": "1+1"})),
    )
    .await;
    let task_id = body["data"]["task_id"].as_i64().unwrap();

    let (status, body) = send(&app.router, "GET", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["task_id"], task_id);

    let (status, _) = send(&app.router, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app.router, "GET", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "TASK_NOT_FOUND");

    let (status, _) = send(&app.router, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_finished_task_cannot_be_deleted() {
    let app = setup().await;
    let (_, body) = send(
        &app.router,
        "POST",
        "/api/tasks",
        Some(json!({"operation": "1+1"})),
    )
    .await;
    let task_id = body["data"]["task_id"].as_i64().unwrap();

    let tasks = app.db.manager.task_repository();
    tasks.mark_started(task_id).await.unwrap();
    tasks
        .finish(task_id, &arith_domain::TaskOutcome::Success(2.0))
        .await
        .unwrap();

    let (status, body) = send(&app.router, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "TASK_NOT_DELETABLE");

    let (status, body) = send(&app.router, "GET", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SUCCESS");
    assert_eq!(body["data"]["result"], 2.0);
}

#[tokio::test]
async fn test_task_schedule_lifecycle() {
    let app = setup().await;
    let (status, body) = send(
        &app.router,
        "POST",
        "/api/task-schedules",
        Some(json!({
            "operation": "1+1",
            "priority": 5,
            "every_x_days": 2,
            "schedule_x_times": 3
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["every_x_days"], 2);
    assert!(body["data"]["every_x_hours"].is_null());
    assert_eq!(body["data"]["schedule_x_times"], 3);
    let id = body["data"]["task_schedule_id"].as_i64().unwrap();

    let task = app
        .db
        .manager
        .task_repository()
        .create(&arith_domain::NewTask::new("1+1", 5).for_schedule(id))
        .await
        .unwrap();

    let uri = format!("/api/task-schedules/{id}");
    let (status, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["task_schedule_id"], id);
    assert_eq!(body["data"]["tasks"][0]["task_id"], task.task_id);

    let (status, _) = send(&app.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // 任务保留，解除关联
    let (status, body) = send(&app.router, "GET", &format!("/api/tasks/{}", task.task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["task_schedule_id"].is_null());
}

#[tokio::test]
async fn test_task_schedule_validation() {
    let app = setup().await;
    let cases = vec![
        json!({"operation": "1+1"}),
        json!({"operation": "1+1", "every_x_hours": 0}),
        json!({"operation": "1+1", "every_x_days": 1, "schedule_x_times": 0}),
        json!({"operation": "1*1", "every_x_days": 1}),
        json!({"operation": "1+1", "every_x_days": 1, "priority": 11}),
        json!({"operation": "1+1", "every_x_days": 100_000_000}),
        json!({"operation": "1+1", "every_x_hours": 4_000_000_000_i64}),
        json!({"operation": "1+1", "every_x_days": 1, "schedule_x_times": 3_000_000_000_i64}),
    ];
    for payload in cases {
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/task-schedules",
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
    }
}
