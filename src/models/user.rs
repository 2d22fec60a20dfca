use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub name: String,
}

impl RegisterUser {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::BadRequest("invalid email address".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
}

impl UpdateUser {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest("name cannot be empty".into()));
        }
        Ok(())
    }
}

/// Returned once at registration - the raw API key is never stored.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    #[serde(flatten)]
    pub user: User,
    pub api_key: String,
}
