//! Read side for conversations and their messages.

use super::BotDesk;
use crate::error::CoreResult;
use crate::models::{AgentId, Conversation, ConversationFilter, ConversationId, Message, PageWindow};
use crate::tenancy::{AgentScope, TenantId};

impl BotDesk {
    /// Conversations of one agent, or of every agent of the tenant, most
    /// recently active first.
    pub fn list_agent_conversations(
        &self,
        tenant: &TenantId,
        agent_id: Option<AgentId>,
        filter: &ConversationFilter,
        page: PageWindow,
    ) -> CoreResult<Vec<Conversation>> {
        match agent_id {
            Some(id) => {
                let agent = self.db.guard_agent(tenant, id)?;
                self.db.list_conversations(AgentScope::Agent(&agent), filter, page)
            }
            None => self.db.list_conversations(AgentScope::Tenant(tenant), filter, page),
        }
    }

    pub fn get_conversation(&self, tenant: &TenantId, conversation_id: ConversationId) -> CoreResult<Conversation> {
        let conversation = self.db.guard_conversation(tenant, conversation_id)?;
        self.db.get_conversation(&conversation)
    }

    /// Messages in chronological order
    pub fn get_conversation_messages(
        &self,
        tenant: &TenantId,
        conversation_id: ConversationId,
    ) -> CoreResult<Vec<Message>> {
        let conversation = self.db.guard_conversation(tenant, conversation_id)?;
        self.db.list_messages(&conversation)
    }
}
