use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::slugify;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub org_id: String,
    pub name: String,
    /// Unique per organization.
    pub slug: String,
    pub description: String,
    pub owner_id: String,
    pub is_public: bool,
    pub archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

impl CreateProject {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        Ok(())
    }

    pub fn slug(&self) -> String {
        match &self.slug {
            Some(s) => s.trim().to_lowercase(),
            None => slugify(&self.name),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub archived: Option<bool>,
}

impl UpdateProject {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        Ok(())
    }
}

/// Project-level roles are an independent role space from organization
/// roles; never compare one against the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectMemberRole {
    Owner,
    Member,
    Viewer,
}

impl ProjectMemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectMemberRole::Owner => "owner",
            ProjectMemberRole::Member => "member",
            ProjectMemberRole::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(ProjectMemberRole::Owner),
            "member" => Some(ProjectMemberRole::Member),
            "viewer" => Some(ProjectMemberRole::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMember {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub role: ProjectMemberRole,
    pub joined_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectMember {
    pub user_id: String,
    #[serde(default = "default_project_role")]
    pub role: ProjectMemberRole,
}

fn default_project_role() -> ProjectMemberRole {
    ProjectMemberRole::Member
}
