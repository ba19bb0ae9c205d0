//! Entry point for normalized events from the messaging-platform gateway.
//!
//! The gateway is a trusted service, not a tenant: events name an agent or a
//! conversation and ownership is resolved from the stored records.

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use super::error_response;
use crate::ingest::GatewayEvent;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/gateway/events").route(web::post().to(receive_event)));
}

/// Check the bearer token when one is configured
fn validate_gateway(state: &AppState, req: &HttpRequest) -> Result<(), HttpResponse> {
    let Some(expected) = state.config.gateway_token.as_deref() else {
        return Ok(());
    };

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match token {
        Some(t) if t == expected => Ok(()),
        Some(_) => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "Invalid gateway token"
        }))),
        None => Err(HttpResponse::Unauthorized().json(serde_json::json!({
            "success": false,
            "error": "No authorization token provided"
        }))),
    }
}

async fn receive_event(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<GatewayEvent>,
) -> impl Responder {
    if let Err(resp) = validate_gateway(&state, &req) {
        return resp;
    }

    match state.desk.ingest_event(body.into_inner()) {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "outcome": outcome
        })),
        Err(e) => {
            log::warn!("[INGEST] Rejected gateway event: {}", e);
            error_response(&e, "ingest event")
        }
    }
}
