//! Crewdeck - multi-tenant project/task management backend
//!
//! This library provides the core functionality for the Crewdeck backend,
//! including tenant resolution, role-based authorization, the organization
//! invitation lifecycle, and signed webhook delivery for domain events.

pub mod authz;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod util;
pub mod webhooks;
