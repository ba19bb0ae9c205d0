pub mod agents;
pub mod analytics;
pub mod conversations;
pub mod dashboard;
pub mod gateway;
pub mod health;
pub mod knowledge;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::{CoreError, ErrorKind};
use crate::tenancy::TenantId;

/// Header set by the upstream identity proxy once the user is authenticated
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Register every route group on the app
pub fn configure_all(cfg: &mut web::ServiceConfig) {
    health::config(cfg);
    agents::config(cfg);
    conversations::config(cfg);
    knowledge::config(cfg);
    analytics::config(cfg);
    dashboard::config(cfg);
    gateway::config(cfg);
}

/// Shared tenant extraction for controller handlers.
pub fn tenant_from_request(req: &HttpRequest) -> Result<TenantId, HttpResponse> {
    let tenant = req
        .headers()
        .get(TENANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match tenant {
        Some(t) => Ok(TenantId::new(t)),
        None => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "No tenant provided"
        }))),
    }
}

/// Map a core error onto an HTTP response. Storage details only go to the log.
pub fn error_response(err: &CoreError, action: &str) -> HttpResponse {
    let body = |message: String| {
        serde_json::json!({
            "success": false,
            "error": message
        })
    };

    match err.kind() {
        ErrorKind::NotFound => HttpResponse::NotFound().json(body(err.to_string())),
        ErrorKind::InvalidInput => HttpResponse::BadRequest().json(body(err.to_string())),
        ErrorKind::Conflict => HttpResponse::Conflict().json(body(err.to_string())),
        ErrorKind::Unavailable => {
            match std::error::Error::source(err) {
                Some(source) => log::error!("Failed to {}: {}", action, source),
                None => log::error!("Failed to {}: {}", action, err),
            }
            HttpResponse::ServiceUnavailable().json(body(format!("Failed to {}", action)))
        }
    }
}
