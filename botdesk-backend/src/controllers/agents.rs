use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::{error_response, tenant_from_request};
use crate::models::{AgentChanges, AgentId, AgentResponse, AgentStatus, NewAgent, StatusAction};
use crate::AppState;

#[derive(Serialize)]
pub struct AgentsListResponse {
    pub success: bool,
    pub agents: Vec<AgentResponse>,
}

#[derive(Serialize)]
pub struct AgentOperationResponse {
    pub success: bool,
    pub agent: AgentResponse,
}

#[derive(Serialize)]
pub struct AgentStatusResponse {
    pub success: bool,
    pub id: AgentId,
    pub status: AgentStatus,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/agents")
            .route("", web::get().to(list_agents))
            .route("", web::post().to(create_agent))
            .route("/{id}", web::get().to(get_agent))
            .route("/{id}", web::put().to(update_agent))
            .route("/{id}", web::delete().to(delete_agent))
            .route("/{id}/toggle", web::post().to(toggle_agent))
            .route("/{id}/activate", web::post().to(activate_agent))
            .route("/{id}/pause", web::post().to(pause_agent))
            .route("/{id}/resume", web::post().to(resume_agent))
            .route("/{id}/deactivate", web::post().to(deactivate_agent)),
    );
}

async fn list_agents(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.list_agents(&tenant) {
        Ok(agents) => HttpResponse::Ok().json(AgentsListResponse {
            success: true,
            agents: agents.into_iter().map(AgentResponse::from).collect(),
        }),
        Err(e) => error_response(&e, "list agents"),
    }
}

async fn create_agent(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<NewAgent>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let created = state
        .desk
        .create_agent(&tenant, body.into_inner())
        .and_then(|id| state.desk.get_agent(&tenant, id));

    match created {
        Ok(agent) => HttpResponse::Created().json(AgentOperationResponse {
            success: true,
            agent: agent.into(),
        }),
        Err(e) => error_response(&e, "create agent"),
    }
}

async fn get_agent(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<AgentId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.get_agent(&tenant, path.into_inner()) {
        Ok(agent) => HttpResponse::Ok().json(AgentOperationResponse {
            success: true,
            agent: agent.into(),
        }),
        Err(e) => error_response(&e, "get agent"),
    }
}

async fn update_agent(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<AgentId>,
    body: web::Json<AgentChanges>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.update_agent(&tenant, path.into_inner(), body.into_inner()) {
        Ok(agent) => HttpResponse::Ok().json(AgentOperationResponse {
            success: true,
            agent: agent.into(),
        }),
        Err(e) => error_response(&e, "update agent"),
    }
}

async fn delete_agent(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<AgentId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.delete_agent(&tenant, path.into_inner()) {
        Ok(name) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": format!("Agent \"{}\" deleted", name)
        })),
        Err(e) => error_response(&e, "delete agent"),
    }
}

fn change_status(state: &AppState, req: &HttpRequest, id: AgentId, action: StatusAction) -> HttpResponse {
    let tenant = match tenant_from_request(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.change_status(&tenant, id, action) {
        Ok(status) => HttpResponse::Ok().json(AgentStatusResponse {
            success: true,
            id,
            status,
        }),
        Err(e) => error_response(&e, "change agent status"),
    }
}

async fn toggle_agent(state: web::Data<AppState>, req: HttpRequest, path: web::Path<AgentId>) -> impl Responder {
    change_status(&state, &req, path.into_inner(), StatusAction::Toggle)
}

async fn activate_agent(state: web::Data<AppState>, req: HttpRequest, path: web::Path<AgentId>) -> impl Responder {
    change_status(&state, &req, path.into_inner(), StatusAction::Activate)
}

async fn pause_agent(state: web::Data<AppState>, req: HttpRequest, path: web::Path<AgentId>) -> impl Responder {
    change_status(&state, &req, path.into_inner(), StatusAction::Pause)
}

async fn resume_agent(state: web::Data<AppState>, req: HttpRequest, path: web::Path<AgentId>) -> impl Responder {
    change_status(&state, &req, path.into_inner(), StatusAction::Resume)
}

async fn deactivate_agent(state: web::Data<AppState>, req: HttpRequest, path: web::Path<AgentId>) -> impl Responder {
    change_status(&state, &req, path.into_inner(), StatusAction::Deactivate)
}
