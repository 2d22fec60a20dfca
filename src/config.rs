use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub audit_log_enabled: bool,
    /// Optional webhook URL for outbound notification emails.
    /// When unset, notification emails are logged instead of sent.
    pub notifier_webhook_url: Option<String>,
    pub notifier_from: String,
    /// Number of webhook delivery worker tasks.
    pub delivery_workers: usize,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("CREWDECK_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "crewdeck.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "crewdeck_audit.db".to_string()),
            base_url,
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(true),
            notifier_webhook_url: env::var("NOTIFIER_WEBHOOK_URL").ok(),
            notifier_from: env::var("NOTIFIER_FROM")
                .unwrap_or_else(|_| "noreply@crewdeck.local".to_string()),
            delivery_workers: env::var("DELIVERY_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
