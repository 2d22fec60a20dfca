use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crewdeck::config::Config;
use crewdeck::db::{AppState, create_pool, init_audit_db, init_db, queries};
use crewdeck::email::Notifier;
use crewdeck::handlers;
use crewdeck::jobs::{JobQueue, spawn_delivery_workers};
use crewdeck::models::{CreateOrganization, CreateProject, RegisterUser};

#[derive(Parser, Debug)]
#[command(name = "crewdeck")]
#[command(about = "Multi-tenant project/task management backend")]
struct Cli {
    /// Seed the database with dev data (plans, user, org, project)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seed");

    let user_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("Failed to count users");
    if user_count > 0 {
        tracing::info!("Database already has users, skipping seed");
        return;
    }

    for (name, max_users) in [("Free", 5), ("Pro", 25), ("Enterprise", 500)] {
        queries::create_plan(&conn, name, max_users).expect("Failed to seed plan");
    }

    let (user, api_key) = queries::create_user(
        &conn,
        &RegisterUser {
            email: "dev@crewdeck.local".to_string(),
            name: "Dev User".to_string(),
        },
    )
    .expect("Failed to seed user");

    let org = queries::create_organization(
        &mut conn,
        &user,
        &CreateOrganization {
            name: "Dev Org".to_string(),
            slug: None,
            plan_id: None,
        },
    )
    .expect("Failed to seed organization");

    let project = queries::create_project(
        &mut conn,
        &org.id,
        &user,
        &CreateProject {
            name: "Getting Started".to_string(),
            slug: None,
            description: "Seeded dev project".to_string(),
            is_public: true,
        },
    )
    .expect("Failed to seed project");

    tracing::info!("Seeded dev data:");
    tracing::info!("  user:    {} ({})", user.email, user.id);
    tracing::info!("  api key: {}", api_key);
    tracing::info!("  org:     {} ({})", org.name, org.id);
    tracing::info!("  project: {} ({})", project.name, project.id);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crewdeck=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let http_client = reqwest::Client::new();
    let (jobs, jobs_rx) = JobQueue::new();
    let notifier = Arc::new(Notifier::new(
        http_client.clone(),
        config.notifier_webhook_url.clone(),
        config.notifier_from.clone(),
    ));

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        jobs: jobs.clone(),
        notifier,
        base_url: config.base_url.clone(),
        audit_log_enabled: config.audit_log_enabled,
    };

    // Start the webhook delivery worker pool
    spawn_delivery_workers(jobs, jobs_rx, http_client, config.delivery_workers);

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CREWDECK_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Build the application router
    let app = Router::new()
        .merge(handlers::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Crewdeck server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            // Also remove WAL and SHM files if they exist
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
