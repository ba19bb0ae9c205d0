//! BotDesk backend: tenant-isolated storage for multi-platform chat agents
//! and the daily analytics rolled up from their conversations.

pub mod analytics;
pub mod config;
pub mod controllers;
pub mod db;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod models;
pub mod service;
pub mod tenancy;

use std::sync::Arc;

pub use config::Config;
pub use db::Database;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use service::BotDesk;
pub use tenancy::TenantId;

/// Shared state handed to every actix handler
pub struct AppState {
    pub desk: Arc<BotDesk>,
    pub config: Config,
}
