use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use super::AgentId;
use crate::error::CoreError;

pub type ConversationId = i64;
pub type MessageId = i64;

/// Characters kept by [`Message::preview`]
const PREVIEW_CHARS: usize = 50;

/// Default and maximum page sizes for conversation listings
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub agent_id: AgentId,
    /// Platform-specific user identifier
    pub user_id: String,
    pub user_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub message_count: i64,
    pub is_lead: bool,
    pub lead_email: String,
    pub lead_phone: String,
    pub lead_captured_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// "Conversation with Alice", falling back to the platform user id
    pub fn label(&self) -> String {
        let who = self
            .user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.user_id);
        format!("Conversation with {}", who)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        s.parse().map_err(|_| CoreError::InvalidRole(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// First 50 characters of the content, with "..." when truncated
    pub fn preview(&self) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// Offset/limit window for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageWindow {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl PageWindow {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Limit clamped to 1..=MAX_PAGE_LIMIT
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

/// Optional narrowing for conversation listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationFilter {
    /// Only conversations flagged as leads
    #[serde(default)]
    pub leads_only: bool,
    /// Case-insensitive substring over user name, user id and lead email
    #[serde(default)]
    pub search: Option<String>,
}
