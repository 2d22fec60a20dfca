mod schema;
pub mod queries;

pub use schema::{init_audit_db, init_db};

pub mod from_row;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::Notifier;
use crate::jobs::JobQueue;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and shared services
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (users, orgs, projects, tasks, webhooks, etc.)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    /// Queue feeding the webhook delivery workers
    pub jobs: JobQueue,
    /// Outbound notification sender (email webhook or log-only)
    pub notifier: Arc<Notifier>,
    /// Base URL for links in notifications (e.g., https://api.example.com)
    pub base_url: String,
    pub audit_log_enabled: bool,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // foreign_keys and busy_timeout are per-connection settings
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    Pool::builder().max_size(10).build(manager)
}
