use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::error::CoreError;

pub type AgentId = i64;

/// Messaging platform an agent is bound to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Telegram,
    Whatsapp,
    Vk,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Human-readable platform name, e.g. "WhatsApp"
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Telegram => "Telegram",
            Platform::Whatsapp => "WhatsApp",
            Platform::Vk => "VK",
            Platform::Instagram => "Instagram",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        s.trim()
            .parse()
            .map_err(|_| CoreError::InvalidPlatform(s.to_string()))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agent status. `Paused` is only reachable through an explicit pause.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Inactive,
    Active,
    Paused,
}

/// Explicit status changes an operator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Toggle,
    Activate,
    Pause,
    Resume,
    Deactivate,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Transition table. Any (status, action) pair not listed is rejected.
    pub fn apply(self, action: StatusAction) -> Result<AgentStatus, CoreError> {
        use AgentStatus::*;
        use StatusAction::*;

        let next = match (self, action) {
            (Active, Toggle) => Some(Inactive),
            (Inactive | Paused, Toggle) => Some(Active),
            (Inactive, Activate) => Some(Active),
            (Active, Pause) => Some(Paused),
            (Paused, Resume) => Some(Active),
            (Active | Paused, Deactivate) => Some(Inactive),
            _ => None,
        };

        next.ok_or(CoreError::InvalidTransition {
            from: self.as_str(),
            to: action.target().as_str(),
        })
    }
}

impl StatusAction {
    /// Status the action aims for (used for error text)
    fn target(&self) -> AgentStatus {
        match self {
            StatusAction::Toggle | StatusAction::Activate | StatusAction::Resume => AgentStatus::Active,
            StatusAction::Pause => AgentStatus::Paused,
            StatusAction::Deactivate => AgentStatus::Inactive,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversion rate as a percentage with two decimals, stored in hundredths
/// of a percent (1250 == 12.50%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ConversionRate(u32);

impl ConversionRate {
    /// leads / conversations * 100, rounded half up. Zero when there are no
    /// conversations.
    pub fn from_counts(leads: i64, conversations: i64) -> Self {
        if conversations <= 0 || leads <= 0 {
            return Self(0);
        }
        let scaled = (leads as i128 * 10_000 * 2 + conversations as i128) / (conversations as i128 * 2);
        Self(scaled.min(u32::MAX as i128) as u32)
    }
}

impl std::fmt::Display for ConversionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for ConversionRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: String,
    pub name: String,
    pub platform: Platform,
    #[serde(skip_serializing)]
    pub bot_token: String,
    pub status: AgentStatus,
    pub description: String,
    pub timezone: String,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub total_leads: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn conversion_rate(&self) -> ConversionRate {
        ConversionRate::from_counts(self.total_leads, self.total_conversations)
    }

    /// "Support Bot (telegram)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.platform)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("name", &self.name)
            .field("platform", &self.platform)
            .field("bot_token", &"<redacted>")
            .field("status", &self.status)
            .field("timezone", &self.timezone)
            .field("total_conversations", &self.total_conversations)
            .field("total_messages", &self.total_messages)
            .field("total_leads", &self.total_leads)
            .finish()
    }
}

/// Response type for agent API endpoints (hides the platform credential)
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub id: AgentId,
    pub name: String,
    pub platform: Platform,
    pub platform_label: &'static str,
    pub status: AgentStatus,
    pub description: String,
    pub timezone: String,
    pub has_bot_token: bool,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub conversion_rate: ConversionRate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        let conversion_rate = agent.conversion_rate();
        Self {
            id: agent.id,
            name: agent.name,
            platform: agent.platform,
            platform_label: agent.platform.label(),
            status: agent.status,
            description: agent.description,
            timezone: agent.timezone,
            has_bot_token: !agent.bot_token.is_empty(),
            total_conversations: agent.total_conversations,
            total_messages: agent.total_messages,
            conversion_rate,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}

/// Request type for creating an agent. No `Debug`: it carries the credential.
#[derive(Clone, Default, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Request type for updating an agent. `None` leaves a field untouched.
#[derive(Clone, Default, Deserialize)]
pub struct AgentChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub bot_token: Option<String>,
    pub timezone: Option<String>,
}
