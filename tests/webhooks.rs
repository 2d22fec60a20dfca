//! Webhook subscription, dispatch matching, and signed delivery tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post as axum_post;
use common::*;
use crewdeck::jobs::{JobQueue, spawn_delivery_workers};
use crewdeck::webhooks::delivery::{
    MAX_DELIVERY_ATTEMPTS, SIGNATURE_HEADER, process_delivery, sign_payload,
};
use crewdeck::webhooks::dispatcher;
use tokio::sync::Mutex;
use tower::ServiceExt;

// ------------------------------------------------------------------------
// Subscription management
// ------------------------------------------------------------------------

#[tokio::test]
async fn create_subscription_rejects_unknown_event_names() {
    let (state, _rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let response = app(state)
        .oneshot(
            post("/webhooks")
                .api_key(&key)
                .org(&org.id)
                .json(serde_json::json!({
                    "url": "https://example.com/hook",
                    "events": ["task.created", "task.exploded"],
                }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_responses_never_contain_the_secret() {
    let (state, _rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "Acme");

    let response = app(state.clone())
        .oneshot(
            post("/webhooks")
                .api_key(&key)
                .org(&org.id)
                .json(serde_json::json!({
                    "url": "https://example.com/hook",
                    "events": ["task.created"],
                }))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert!(body.get("secret").is_none());

    let response = app(state)
        .oneshot(get("/webhooks").api_key(&key).org(&org.id).build())
        .await
        .unwrap();
    let body = response_json(response).await;
    for sub in body.as_array().unwrap() {
        assert!(sub.get("secret").is_none());
    }
}

#[tokio::test]
async fn subscription_management_requires_manager_role() {
    let (state, _rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let (member, member_key) = register_test_user(&state, "member@example.com");
    let org = create_test_org(&state, &owner, "Acme");
    add_test_member(&state, &org, &owner, &member, MembershipRole::Member);

    let response = app(state)
        .oneshot(
            post("/webhooks")
                .api_key(&member_key)
                .org(&org.id)
                .json(serde_json::json!({
                    "url": "https://example.com/hook",
                    "events": ["task.created"],
                }))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ------------------------------------------------------------------------
// Dispatcher matching
// ------------------------------------------------------------------------

#[tokio::test]
async fn emit_schedules_exactly_one_job_for_the_matching_subscription() {
    let (state, mut rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "org1");

    let task_sub = create_test_subscription(
        &state,
        &org,
        "https://example.com/tasks",
        &[WebhookEvent::TaskCreated],
        "s1",
    );
    let _comment_sub = create_test_subscription(
        &state,
        &org,
        "https://example.com/comments",
        &[WebhookEvent::CommentAdded],
        "s2",
    );

    dispatcher::emit(
        &state,
        &org.id,
        WebhookEvent::TaskCreated,
        serde_json::json!({"task_id": "t1"}),
    );

    let job = rx.try_recv().expect("one delivery job should be scheduled");
    assert_eq!(job.subscription_id, task_sub.id);
    assert_eq!(job.event, WebhookEvent::TaskCreated);
    assert_eq!(job.attempt, 0);

    assert!(rx.try_recv().is_err(), "no further jobs expected");
}

#[tokio::test]
async fn inactive_subscription_never_receives_a_job() {
    let (state, mut rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "org1");

    let sub = create_test_subscription(
        &state,
        &org,
        "https://example.com/tasks",
        &[WebhookEvent::TaskCreated],
        "s1",
    );
    {
        let conn = state.db.get().unwrap();
        queries::disable_webhook_subscription(&conn, &sub.id).unwrap();
    }

    dispatcher::emit(
        &state,
        &org.id,
        WebhookEvent::TaskCreated,
        serde_json::json!({"task_id": "t1"}),
    );

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn events_do_not_cross_tenants() {
    let (state, mut rx) = create_test_app_state();
    let (owner, _) = register_test_user(&state, "owner@example.com");
    let org1 = create_test_org(&state, &owner, "org1");
    let org2 = create_test_org(&state, &owner, "org2");

    create_test_subscription(
        &state,
        &org2,
        "https://example.com/other",
        &[WebhookEvent::TaskCreated],
        "s2",
    );

    dispatcher::emit(
        &state,
        &org1.id,
        WebhookEvent::TaskCreated,
        serde_json::json!({"task_id": "t1"}),
    );

    assert!(rx.try_recv().is_err());
}

// ------------------------------------------------------------------------
// Delivery worker
// ------------------------------------------------------------------------

#[derive(Clone)]
struct CaptureState {
    /// (signature header, body bytes) per request, in arrival order.
    hits: Arc<Mutex<Vec<(Option<String>, Vec<u8>)>>>,
    /// Statuses to answer with; the last one repeats once exhausted.
    statuses: Arc<Mutex<Vec<u16>>>,
}

async fn capture_handler(
    State(state): State<CaptureState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.hits.lock().await.push((signature, body.to_vec()));

    let mut statuses = state.statuses.lock().await;
    let status = if statuses.len() > 1 {
        statuses.remove(0)
    } else {
        statuses[0]
    };
    StatusCode::from_u16(status).unwrap()
}

/// Spawn a local capture server answering with the scripted statuses.
async fn spawn_capture_server(statuses: Vec<u16>) -> (String, CaptureState) {
    let capture = CaptureState {
        hits: Arc::new(Mutex::new(Vec::new())),
        statuses: Arc::new(Mutex::new(statuses)),
    };
    let router = axum::Router::new()
        .route("/hook", axum_post(capture_handler))
        .with_state(capture.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}/hook", addr), capture)
}

#[tokio::test(flavor = "multi_thread")]
async fn delivery_retries_with_backoff_until_success() {
    // Three 500s, then 200 on the fourth attempt - inside the 5-attempt cap.
    let (url, capture) = spawn_capture_server(vec![500, 500, 500, 200]).await;

    let (queue, rx) = JobQueue::new();
    spawn_delivery_workers(queue.clone(), rx, reqwest::Client::new(), 2);

    let payload = serde_json::json!({"task_id": "t1", "title": "Ship it"});
    queue.enqueue(DeliveryJob {
        subscription_id: "sub1".to_string(),
        url,
        secret: "whsec_test".to_string(),
        event: WebhookEvent::TaskCreated,
        payload,
        attempt: 0,
    });

    // Backoff between the four attempts is 1s + 2s + 4s.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        if capture.hits.lock().await.len() >= 4 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "delivery did not reach 4 attempts in time"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // No fifth attempt after the success.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let hits = capture.hits.lock().await;
    assert_eq!(hits.len(), 4, "delivery must stop after the first success");

    // Signature round-trip: recomputing the HMAC over the received bytes
    // matches the received header, for every attempt.
    for (signature, body) in hits.iter() {
        let signature = signature.as_ref().expect("signature header missing");
        assert_eq!(signature, &sign_payload("whsec_test", body));
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed["event"], "task.created");
        assert_eq!(parsed["payload"]["title"], "Ship it");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn final_attempt_failure_drops_the_job() {
    let (url, capture) = spawn_capture_server(vec![500]).await;

    // Fresh queue with the receiver held: if process_delivery rescheduled,
    // the job would land here.
    let (queue, mut rx) = JobQueue::new();

    let job = DeliveryJob {
        subscription_id: "sub1".to_string(),
        url,
        secret: "whsec_test".to_string(),
        event: WebhookEvent::TaskDeleted,
        payload: serde_json::json!({"task_id": "t1"}),
        attempt: MAX_DELIVERY_ATTEMPTS - 1,
    };
    process_delivery(&reqwest::Client::new(), &queue, job).await;

    assert_eq!(capture.hits.lock().await.len(), 1);
    assert!(
        rx.try_recv().is_err(),
        "exhausted job must not be rescheduled"
    );
}

// ------------------------------------------------------------------------
// End to end: mutation -> dispatcher -> queue
// ------------------------------------------------------------------------

#[tokio::test]
async fn task_creation_over_http_schedules_matching_delivery() {
    let (state, mut rx) = create_test_app_state();
    let (owner, key) = register_test_user(&state, "owner@example.com");
    let org = create_test_org(&state, &owner, "org1");
    let project = create_test_project(&state, &org, &owner, "Backend", true);
    let sub = create_test_subscription(
        &state,
        &org,
        "https://example.com/tasks",
        &[WebhookEvent::TaskCreated, WebhookEvent::TaskUpdated],
        "s1",
    );

    let response = app(state)
        .oneshot(
            post(format!("/projects/{}/tasks", project.id))
                .api_key(&key)
                .org(&org.id)
                .json(serde_json::json!({ "title": "Write the spec" }))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let job = rx.try_recv().expect("task.created job should be scheduled");
    assert_eq!(job.subscription_id, sub.id);
    assert_eq!(job.event, WebhookEvent::TaskCreated);
    assert_eq!(job.payload["title"], "Write the spec");
}
