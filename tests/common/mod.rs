//! Test utilities and fixtures for Crewdeck integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::mpsc::UnboundedReceiver;

// Re-export the main library crate
pub use crewdeck::db::{AppState, DbPool, init_audit_db, init_db, queries};
pub use crewdeck::email::Notifier;
pub use crewdeck::handlers;
pub use crewdeck::jobs::JobQueue;
pub use crewdeck::middleware::TENANT_HEADER;
pub use crewdeck::models::*;
pub use crewdeck::webhooks::delivery::DeliveryJob;

/// Create a pool over a shared in-memory database. Each test gets its own
/// database (unique URI name); all pool connections see the same data.
pub fn memory_pool() -> DbPool {
    let uri = format!(
        "file:testdb_{}?mode=memory&cache=shared",
        uuid::Uuid::new_v4().as_simple()
    );
    let manager = SqliteConnectionManager::file(uri).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    Pool::builder().max_size(4).build(manager).unwrap()
}

/// Create an AppState for testing with in-memory databases.
///
/// The returned receiver is the delivery job queue's consumer end: tests
/// that assert on dispatch inspect it directly instead of spawning the
/// worker pool.
pub fn create_test_app_state() -> (AppState, UnboundedReceiver<DeliveryJob>) {
    let pool = memory_pool();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let audit_pool = memory_pool();
    {
        let conn = audit_pool.get().unwrap();
        init_audit_db(&conn).unwrap();
    }

    let (jobs, jobs_rx) = JobQueue::new();
    let state = AppState {
        db: pool,
        audit: audit_pool,
        jobs,
        notifier: Arc::new(Notifier::new(
            reqwest::Client::new(),
            None,
            "test@crewdeck.local".to_string(),
        )),
        base_url: "http://localhost:3000".to_string(),
        audit_log_enabled: true,
    };
    (state, jobs_rx)
}

/// Build the full application router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::router(state.clone()))
        .with_state(state)
}

/// Register a user and return it with its raw API key.
pub fn register_test_user(state: &AppState, email: &str) -> (User, String) {
    let conn = state.db.get().unwrap();
    queries::create_user(
        &conn,
        &RegisterUser {
            email: email.to_string(),
            name: format!("Test User {}", email),
        },
    )
    .expect("Failed to create test user")
}

/// Create an organization owned by `owner` (owner membership included).
pub fn create_test_org(state: &AppState, owner: &User, name: &str) -> Organization {
    let mut conn = state.db.get().unwrap();
    queries::create_organization(
        &mut conn,
        owner,
        &CreateOrganization {
            name: name.to_string(),
            slug: None,
            plan_id: None,
        },
    )
    .expect("Failed to create test organization")
}

/// Give `user` an active membership in `org` by inviting and accepting.
pub fn add_test_member(
    state: &AppState,
    org: &Organization,
    inviter: &User,
    user: &User,
    role: MembershipRole,
) -> Membership {
    let mut conn = state.db.get().unwrap();
    let invitation = queries::create_invitation(
        &conn,
        &org.id,
        &inviter.id,
        Some(&user.id),
        &CreateInvitation {
            email: user.email.clone(),
            role,
            expires_in_days: None,
        },
    )
    .expect("Failed to create test invitation");
    let (_, membership) = queries::accept_invitation(&mut conn, user, &invitation.id)
        .expect("Failed to accept test invitation");
    membership
}

pub fn create_test_project(
    state: &AppState,
    org: &Organization,
    owner: &User,
    name: &str,
    is_public: bool,
) -> Project {
    let mut conn = state.db.get().unwrap();
    queries::create_project(
        &mut conn,
        &org.id,
        owner,
        &CreateProject {
            name: name.to_string(),
            slug: None,
            description: String::new(),
            is_public,
        },
    )
    .expect("Failed to create test project")
}

pub fn create_test_task(
    state: &AppState,
    org: &Organization,
    project: &Project,
    creator: &User,
    title: &str,
) -> Task {
    let conn = state.db.get().unwrap();
    queries::create_task(
        &conn,
        &project.id,
        &org.id,
        &creator.id,
        &CreateTask {
            title: title.to_string(),
            description: String::new(),
            priority: TaskPriority::Medium,
            status: TaskStatus::Todo,
            assigned_to: None,
            due_date: None,
        },
    )
    .expect("Failed to create test task")
}

pub fn create_test_subscription(
    state: &AppState,
    org: &Organization,
    url: &str,
    events: &[WebhookEvent],
    secret: &str,
) -> WebhookSubscription {
    let conn = state.db.get().unwrap();
    queries::create_webhook_subscription(&conn, &org.id, url, events, secret)
        .expect("Failed to create test subscription")
}

/// Count audit records for an org with the given action.
pub fn count_audit_records(state: &AppState, org_id: &str, action: &str) -> i64 {
    let conn = state.audit.get().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM audit_logs WHERE org_id = ?1 AND action = ?2",
        rusqlite::params![org_id, action],
        |row| row.get(0),
    )
    .unwrap()
}

// ------------------------------------------------------------------------
// Request helpers
// ------------------------------------------------------------------------

pub struct RequestBuilder {
    method: &'static str,
    uri: String,
    api_key: Option<String>,
    org_id: Option<String>,
    body: Option<serde_json::Value>,
}

impl RequestBuilder {
    pub fn new(method: &'static str, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            api_key: None,
            org_id: None,
            body: None,
        }
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn org(mut self, org_id: &str) -> Self {
        self.org_id = Some(org_id.to_string());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(org_id) = self.org_id {
            builder = builder.header(TENANT_HEADER, org_id);
        }
        match self.body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

pub fn get(uri: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new("GET", uri)
}

pub fn post(uri: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new("POST", uri)
}

pub fn put(uri: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new("PUT", uri)
}

pub fn patch(uri: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new("PATCH", uri)
}

pub fn delete(uri: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new("DELETE", uri)
}

/// Read a response body as JSON.
pub async fn response_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}
