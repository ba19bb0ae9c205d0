use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{error_response, tenant_from_request};
use crate::models::{AgentId, DocumentId, KnowledgeDocument};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub agent_id: AgentId,
}

/// Upload notification from the document processor: the file is already
/// stored and `file_ref` points at it.
#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub agent_id: AgentId,
    pub filename: String,
    #[serde(default)]
    pub file_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractedTextRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct DocumentsListResponse {
    pub success: bool,
    pub documents: Vec<KnowledgeDocument>,
}

#[derive(Serialize)]
pub struct DocumentOperationResponse {
    pub success: bool,
    pub document: KnowledgeDocument,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/knowledge")
            .route("", web::get().to(list_documents))
            .route("", web::post().to(upload_document))
            .route("/{id}", web::get().to(get_document))
            .route("/{id}", web::delete().to(delete_document))
            .route("/{id}/text", web::put().to(record_text)),
    );
}

async fn list_documents(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<DocumentListQuery>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.list_knowledge_documents(&tenant, query.agent_id) {
        Ok(documents) => HttpResponse::Ok().json(DocumentsListResponse {
            success: true,
            documents,
        }),
        Err(e) => error_response(&e, "list documents"),
    }
}

async fn upload_document(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<UploadDocumentRequest>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let stored = state
        .desk
        .upload_knowledge_document(&tenant, body.agent_id, &body.filename, &body.file_ref)
        .and_then(|id| state.desk.get_knowledge_document(&tenant, id));

    match stored {
        Ok(document) => HttpResponse::Created().json(DocumentOperationResponse {
            success: true,
            document,
        }),
        Err(e) => error_response(&e, "store document"),
    }
}

async fn get_document(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<DocumentId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.get_knowledge_document(&tenant, path.into_inner()) {
        Ok(document) => HttpResponse::Ok().json(DocumentOperationResponse {
            success: true,
            document,
        }),
        Err(e) => error_response(&e, "get document"),
    }
}

async fn record_text(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<DocumentId>,
    body: web::Json<ExtractedTextRequest>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.record_extracted_text(&tenant, path.into_inner(), &body.text) {
        Ok(document) => HttpResponse::Ok().json(DocumentOperationResponse {
            success: true,
            document,
        }),
        Err(e) => error_response(&e, "record extracted text"),
    }
}

async fn delete_document(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<DocumentId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.delete_knowledge_document(&tenant, path.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => error_response(&e, "delete document"),
    }
}
