use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "critical" => Some(TaskPriority::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub org_id: String,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    /// Due date as a Unix timestamp (midnight UTC of the due day).
    pub due_date: Option<i64>,
    pub is_archived: bool,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Serializable representation used as the webhook event payload.
    pub fn webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "task_id": self.id,
            "project_id": self.project_id,
            "title": self.title,
            "description": self.description,
            "status": self.status,
            "priority": self.priority,
            "assigned_to": self.assigned_to,
            "due_date": self.due_date,
            "updated_at": self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub due_date: Option<i64>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

fn default_status() -> TaskStatus {
    TaskStatus::Todo
}

impl CreateTask {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("title cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    /// Absent = unchanged, null = unassign, value = reassign.
    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub assigned_to: Option<Option<String>>,
    /// Absent = unchanged, null = clear, value = set.
    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub due_date: Option<Option<i64>>,
}

impl UpdateTask {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref title) = self.title
            && title.trim().is_empty()
        {
            return Err(AppError::BadRequest("title cannot be empty".into()));
        }
        Ok(())
    }
}

/// Deserialize a field that can be:
/// - absent (None) - leave unchanged
/// - null (Some(None)) - clear the value
/// - present (Some(Some(value))) - set to value
fn deserialize_optional_field<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComment {
    pub id: String,
    pub task_id: String,
    pub user_id: Option<String>,
    pub body: String,
    pub created_at: i64,
}

impl TaskComment {
    pub fn webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "comment_id": self.id,
            "task_id": self.task_id,
            "user_id": self.user_id,
            "comment": self.body,
            "created_at": self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskComment {
    pub body: String,
}

impl CreateTaskComment {
    pub fn validate(&self) -> Result<()> {
        if self.body.trim().is_empty() {
            return Err(AppError::BadRequest("body cannot be empty".into()));
        }
        Ok(())
    }
}
