use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub owner_id: Option<String>,
    pub plan_id: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    /// Optional explicit slug; derived from the name when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
}

impl CreateOrganization {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        if let Some(ref slug) = self.slug
            && slug.trim().is_empty()
        {
            return Err(AppError::BadRequest("slug cannot be empty".into()));
        }
        Ok(())
    }

    /// The slug to store: explicit slug, or the name lowercased with
    /// non-alphanumeric runs collapsed to single hyphens.
    pub fn slug(&self) -> String {
        match &self.slug {
            Some(s) => s.trim().to_lowercase(),
            None => slugify(&self.name),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub plan_id: Option<String>,
}

impl UpdateOrganization {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        Ok(())
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
