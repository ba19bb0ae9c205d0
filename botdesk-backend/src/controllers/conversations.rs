use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::{error_response, tenant_from_request};
use crate::models::{AgentId, Conversation, ConversationFilter, ConversationId, Message, PageWindow};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub leads_only: bool,
    pub search: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ConversationListQuery {
    fn filter(&self) -> ConversationFilter {
        ConversationFilter {
            leads_only: self.leads_only,
            search: self.search.clone(),
        }
    }

    fn page(&self) -> PageWindow {
        let default = PageWindow::default();
        PageWindow::new(
            self.offset.unwrap_or(default.offset),
            self.limit.unwrap_or(default.limit),
        )
    }
}

#[derive(Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub label: String,
}

impl From<Conversation> for ConversationView {
    fn from(conversation: Conversation) -> Self {
        Self {
            label: conversation.label(),
            conversation,
        }
    }
}

#[derive(Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub preview: String,
}

#[derive(Serialize)]
pub struct ConversationsListResponse {
    pub success: bool,
    pub conversations: Vec<ConversationView>,
}

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    pub success: bool,
    pub conversation: ConversationView,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageView>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/conversations")
            .route("", web::get().to(list_conversations))
            .route("/{id}", web::get().to(get_conversation))
            .route("/{id}/messages", web::get().to(get_messages)),
    );
}

async fn list_conversations(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ConversationListQuery>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state
        .desk
        .list_agent_conversations(&tenant, query.agent_id, &query.filter(), query.page())
    {
        Ok(conversations) => HttpResponse::Ok().json(ConversationsListResponse {
            success: true,
            conversations: conversations.into_iter().map(ConversationView::from).collect(),
        }),
        Err(e) => error_response(&e, "list conversations"),
    }
}

async fn get_conversation(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<ConversationId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.get_conversation(&tenant, path.into_inner()) {
        Ok(conversation) => HttpResponse::Ok().json(ConversationDetailResponse {
            success: true,
            conversation: conversation.into(),
        }),
        Err(e) => error_response(&e, "get conversation"),
    }
}

async fn get_messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<ConversationId>,
) -> impl Responder {
    let tenant = match tenant_from_request(&req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    match state.desk.get_conversation_messages(&tenant, path.into_inner()) {
        Ok(messages) => HttpResponse::Ok().json(MessagesResponse {
            success: true,
            messages: messages
                .into_iter()
                .map(|message| MessageView {
                    preview: message.preview(),
                    message,
                })
                .collect(),
        }),
        Err(e) => error_response(&e, "get messages"),
    }
}
