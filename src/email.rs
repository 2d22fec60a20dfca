//! Outbound notification email support.
//!
//! Two modes:
//! 1. POST to a configured notifier webhook URL (DIY email delivery)
//! 2. Disabled (no email sent, log only)
//!
//! All sends are fire-and-forget background tasks with quick retries;
//! the operations that trigger them never depend on their success.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::models::{Invitation, Notification};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

/// Payload POSTed to the notifier webhook URL.
#[derive(Debug, Serialize)]
pub struct EmailMessage {
    pub event: &'static str,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
    from: String,
}

impl Notifier {
    pub fn new(client: Client, webhook_url: Option<String>, from: String) -> Self {
        Self {
            client,
            webhook_url,
            from,
        }
    }

    pub fn message(&self, event: &'static str, to: String, subject: String, body: String) -> EmailMessage {
        EmailMessage {
            event,
            from: self.from.clone(),
            to,
            subject,
            body,
        }
    }

    /// Deliver a message. Returns true when the notifier webhook accepted
    /// it; false when disabled or after exhausting retries.
    pub async fn send(&self, message: &EmailMessage) -> bool {
        let Some(url) = &self.webhook_url else {
            tracing::info!(
                to = %message.to,
                subject = %message.subject,
                "notifier disabled, logging email instead of sending"
            );
            return false;
        };

        for (attempt, delay_secs) in std::iter::once(&0u64)
            .chain(RETRY_DELAYS.iter())
            .enumerate()
        {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self
                .client
                .post(url)
                .json(message)
                .timeout(Duration::from_secs(5))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    if attempt > 0 {
                        tracing::debug!("notifier webhook succeeded after {} retries", attempt);
                    }
                    return true;
                }
                Ok(resp) => {
                    tracing::debug!("notifier webhook returned {}", resp.status());
                }
                Err(e) => {
                    tracing::debug!("notifier webhook failed: {}", e);
                }
            }
        }

        tracing::warn!(
            to = %message.to,
            "notifier webhook failed after {} attempts",
            RETRY_DELAYS.len() + 1
        );
        false
    }
}

/// Fire-and-forget email for an in-app notification (task assignment).
/// Marks the notification as emailed on success.
pub fn spawn_notification_email(state: AppState, notification: Notification, to_email: String) {
    tokio::spawn(async move {
        let body = notification
            .data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or(notification.title.as_str())
            .to_string();
        let message = state.notifier.message(
            "notification",
            to_email,
            notification.title.clone(),
            body,
        );

        if state.notifier.send(&message).await {
            match state.db.get() {
                Ok(conn) => {
                    if let Err(e) = queries::mark_notification_email_sent(&conn, &notification.id) {
                        tracing::warn!("failed to mark notification {} emailed: {}", notification.id, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to mark notification {} emailed: {}", notification.id, e);
                }
            }
        }
    });
}

/// Fire-and-forget email telling an invitee about a pending invitation.
pub fn spawn_invitation_email(state: AppState, invitation: Invitation, org_name: String) {
    tokio::spawn(async move {
        let subject = format!("You've been invited to {}", org_name);
        let body = format!(
            "You have been invited to join {} as {}. Sign in to accept or decline.",
            org_name,
            invitation.role.as_str()
        );
        let message = state
            .notifier
            .message("invitation", invitation.email.clone(), subject, body);
        state.notifier.send(&message).await;
    });
}
