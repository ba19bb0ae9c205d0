use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::{error_response, tenant_from_request};
use crate::models::DashboardSummary;
use crate::AppState;

#[derive(Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub summary: DashboardSummary,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/dashboard").route(web::get().to(get_dashboard)));
}

async fn get_dashboard(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.dashboard_summary(&tenant) {
        Ok(summary) => HttpResponse::Ok().json(DashboardResponse {
            success: true,
            summary,
        }),
        Err(e) => error_response(&e, "load dashboard"),
    }
}
