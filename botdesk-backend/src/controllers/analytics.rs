use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{error_response, tenant_from_request};
use crate::models::{AgentId, AnalyticsTotals, DailyAnalytics, DateRange};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub agent_id: Option<AgentId>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Serialize)]
pub struct RangeResponse {
    pub success: bool,
    pub rows: Vec<DailyAnalytics>,
}

#[derive(Serialize)]
pub struct TotalsResponse {
    pub success: bool,
    pub totals: AnalyticsTotals,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/analytics")
            .route("/range", web::get().to(get_range))
            .route("/totals", web::get().to(get_totals))
            .route("/import", web::post().to(import_rows)),
    );
}

async fn get_range(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RangeQuery>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let rows = DateRange::new(query.from, query.to)
        .and_then(|range| state.desk.get_analytics_range(&tenant, query.agent_id, range));

    match rows {
        Ok(rows) => HttpResponse::Ok().json(RangeResponse { success: true, rows }),
        Err(e) => error_response(&e, "load analytics"),
    }
}

async fn get_totals(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RangeQuery>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let totals = DateRange::new(query.from, query.to)
        .and_then(|range| state.desk.get_analytics_totals(&tenant, query.agent_id, range));

    match totals {
        Ok(totals) => HttpResponse::Ok().json(TotalsResponse { success: true, totals }),
        Err(e) => error_response(&e, "load analytics totals"),
    }
}

/// Rows are imported one by one; the first failure stops the import and
/// reports how many rows went in before it.
async fn import_rows(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<Vec<DailyAnalytics>>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    for (imported, row) in body.iter().enumerate() {
        if let Err(e) = state.desk.import_analytics_row(&tenant, row) {
            log::warn!("[ANALYTICS] Import stopped after {} rows: {}", imported, e);
            return error_response(&e, "import analytics");
        }
    }
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "imported": body.len()
    }))
}
