use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// The closed vocabulary of domain events eligible for webhook fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "comment.added")]
    CommentAdded,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 4] = [
        WebhookEvent::TaskCreated,
        WebhookEvent::TaskUpdated,
        WebhookEvent::TaskDeleted,
        WebhookEvent::CommentAdded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::TaskCreated => "task.created",
            WebhookEvent::TaskUpdated => "task.updated",
            WebhookEvent::TaskDeleted => "task.deleted",
            WebhookEvent::CommentAdded => "comment.added",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task.created" => Some(WebhookEvent::TaskCreated),
            "task.updated" => Some(WebhookEvent::TaskUpdated),
            "task.deleted" => Some(WebhookEvent::TaskDeleted),
            "comment.added" => Some(WebhookEvent::CommentAdded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub org_id: String,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    /// HMAC signing secret. Never serialized in responses.
    #[serde(skip_serializing)]
    pub secret: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl WebhookSubscription {
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateWebhookSubscription {
    pub url: String,
    pub events: Vec<String>,
    /// Optional explicit secret; generated when absent.
    #[serde(default)]
    pub secret: Option<String>,
}

impl CreateWebhookSubscription {
    /// Validate and parse the event list against the fixed vocabulary.
    pub fn validated_events(&self) -> Result<Vec<WebhookEvent>> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(AppError::BadRequest("url must be http(s)".into()));
        }
        if self.events.is_empty() {
            return Err(AppError::BadRequest(
                "at least one event is required".into(),
            ));
        }
        self.events
            .iter()
            .map(|name| {
                WebhookEvent::from_str(name)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown event: {}", name)))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookSubscription {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl UpdateWebhookSubscription {
    pub fn validated_events(&self) -> Result<Option<Vec<WebhookEvent>>> {
        if let Some(ref url) = self.url
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(AppError::BadRequest("url must be http(s)".into()));
        }
        match &self.events {
            None => Ok(None),
            Some(names) => {
                if names.is_empty() {
                    return Err(AppError::BadRequest(
                        "at least one event is required".into(),
                    ));
                }
                names
                    .iter()
                    .map(|name| {
                        WebhookEvent::from_str(name).ok_or_else(|| {
                            AppError::BadRequest(format!("unknown event: {}", name))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Some)
            }
        }
    }
}
