//! Domain event fan-out.
//!
//! `emit` is called explicitly at the end of each mutating operation,
//! after its database work has committed - never from a persistence-layer
//! hook. It finds the organization's active subscriptions matching the
//! event and schedules one delivery job per match. The triggering request
//! never waits on (or fails because of) delivery.

use crate::db::{AppState, queries};
use crate::models::WebhookEvent;
use crate::webhooks::delivery::DeliveryJob;

/// Fan an event out to every active subscription of the organization
/// whose event set contains it. At-least-once per matching subscription;
/// errors are logged, never propagated.
pub fn emit(state: &AppState, org_id: &str, event: WebhookEvent, payload: serde_json::Value) {
    let conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(
                org_id,
                event = event.as_str(),
                "event fan-out skipped, pool error: {}",
                e
            );
            return;
        }
    };

    let subscriptions = match queries::find_active_subscriptions_for_event(&conn, org_id, event) {
        Ok(subs) => subs,
        Err(e) => {
            tracing::error!(
                org_id,
                event = event.as_str(),
                "event fan-out skipped, subscription lookup failed: {}",
                e
            );
            return;
        }
    };

    if subscriptions.is_empty() {
        tracing::debug!(org_id, event = event.as_str(), "no subscriptions match event");
        return;
    }

    for subscription in subscriptions {
        state.jobs.enqueue(DeliveryJob {
            subscription_id: subscription.id,
            url: subscription.url,
            secret: subscription.secret,
            event,
            payload: payload.clone(),
            attempt: 0,
        });
    }
}
