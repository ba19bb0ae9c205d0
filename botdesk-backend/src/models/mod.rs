pub mod agent;
pub mod analytics;
pub mod conversation;
pub mod knowledge;

pub use agent::{
    Agent, AgentChanges, AgentId, AgentResponse, AgentStatus, ConversionRate, NewAgent, Platform,
    StatusAction,
};
pub use analytics::{
    AnalyticsTotals, DailyAnalytics, DashboardSummary, DateRange, EventKind, RecomputeOutcome,
    RecomputeReport,
};
pub use conversation::{
    Conversation, ConversationFilter, ConversationId, Message, MessageId, MessageRole, PageWindow,
};
pub use knowledge::{DocumentId, KnowledgeDocument};
