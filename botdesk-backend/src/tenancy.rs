//! Tenancy guard.
//!
//! Every entity belongs to exactly one tenant through its agent. The guard is
//! the only place that turns a raw id into an ownership proof
//! ([`OwnedAgent`], [`OwnedConversation`], [`OwnedDocument`]); store methods
//! that read or write descendants of an agent take one of those proofs, so a
//! query that skipped the ownership check does not compile.
//!
//! A mismatched tenant is reported as `NotFound`, exactly like a missing row.

use chrono_tz::Tz;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{AgentId, ConversationId, DocumentId};

/// Already-authenticated tenant identifier handed over by the identity
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that an agent exists and belongs to `tenant`
#[derive(Debug, Clone)]
pub struct OwnedAgent {
    id: AgentId,
    tenant: TenantId,
    timezone: Tz,
}

impl OwnedAgent {
    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Time zone used to bucket this agent's events into calendar days
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Proof that a conversation exists and belongs to an owned agent
#[derive(Debug, Clone)]
pub struct OwnedConversation {
    id: ConversationId,
    agent: OwnedAgent,
}

impl OwnedConversation {
    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn agent(&self) -> &OwnedAgent {
        &self.agent
    }
}

/// Proof that a knowledge document exists and belongs to an owned agent
#[derive(Debug, Clone)]
pub struct OwnedDocument {
    id: DocumentId,
    agent: OwnedAgent,
}

impl OwnedDocument {
    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn agent(&self) -> &OwnedAgent {
        &self.agent
    }
}

/// Which agents a tenant-level read covers
#[derive(Debug, Clone, Copy)]
pub(crate) enum AgentScope<'a> {
    /// Every agent owned by the tenant
    Tenant(&'a TenantId),
    /// A single, already-guarded agent
    Agent(&'a OwnedAgent),
}

impl AgentScope<'_> {
    /// SQL predicate over an `agents` table aliased `a`, binding one
    /// parameter at position `idx`.
    pub(crate) fn predicate(&self, idx: usize) -> String {
        match self {
            AgentScope::Tenant(_) => format!("a.tenant_id = ?{}", idx),
            AgentScope::Agent(_) => format!("a.id = ?{}", idx),
        }
    }

    pub(crate) fn param(&self) -> Box<dyn rusqlite::ToSql> {
        match self {
            AgentScope::Tenant(t) => Box::new(t.as_str().to_string()),
            AgentScope::Agent(a) => Box::new(a.id()),
        }
    }
}

/// Parse a stored IANA zone name. Names are validated on write, so a bad
/// value here means the row was edited by hand; fall back to UTC.
pub(crate) fn zone_or_utc(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        log::warn!("[TENANCY] Unparseable stored time zone '{}', using UTC", name);
        Tz::UTC
    })
}

impl Database {
    /// Resolve `agent_id` for `tenant`
    pub(crate) fn guard_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<OwnedAgent> {
        match self.lookup_agent_owner(agent_id)? {
            Some(owned) if owned.tenant == *tenant => Ok(owned),
            _ => Err(CoreError::NotFound),
        }
    }

    /// Resolve a conversation through its owning agent
    pub(crate) fn guard_conversation(
        &self,
        tenant: &TenantId,
        conversation_id: ConversationId,
    ) -> CoreResult<OwnedConversation> {
        match self.lookup_conversation_owner(conversation_id)? {
            Some(owned) if owned.agent.tenant == *tenant => Ok(owned),
            _ => Err(CoreError::NotFound),
        }
    }

    /// Resolve a knowledge document through its owning agent
    pub(crate) fn guard_document(
        &self,
        tenant: &TenantId,
        document_id: DocumentId,
    ) -> CoreResult<OwnedDocument> {
        let conn = self.conn()?;
        let agent_id: Option<AgentId> = conn
            .query_row(
                "SELECT agent_id FROM knowledge_documents WHERE id = ?1",
                [document_id],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        let agent_id = agent_id.ok_or(CoreError::NotFound)?;
        let agent = self.guard_agent(tenant, agent_id)?;
        Ok(OwnedDocument { id: document_id, agent })
    }

    /// Gateway path: events carry no tenant, the owner is whoever owns the
    /// agent.
    pub(crate) fn resolve_agent_for_gateway(&self, agent_id: AgentId) -> CoreResult<OwnedAgent> {
        self.lookup_agent_owner(agent_id)?
            .ok_or(CoreError::UnknownAgent)
    }

    pub(crate) fn resolve_conversation_for_gateway(
        &self,
        conversation_id: ConversationId,
    ) -> CoreResult<OwnedConversation> {
        self.lookup_conversation_owner(conversation_id)?
            .ok_or(CoreError::UnknownConversation)
    }

    fn lookup_agent_owner(&self, agent_id: AgentId) -> CoreResult<Option<OwnedAgent>> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT tenant_id, timezone FROM agents WHERE id = ?1",
                [agent_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(tenant, tz)| OwnedAgent {
            id: agent_id,
            tenant: TenantId(tenant),
            timezone: zone_or_utc(&tz),
        }))
    }

    fn lookup_conversation_owner(
        &self,
        conversation_id: ConversationId,
    ) -> CoreResult<Option<OwnedConversation>> {
        let conn = self.conn()?;
        let row: Option<(AgentId, String, String)> = conn
            .query_row(
                "SELECT a.id, a.tenant_id, a.timezone
                 FROM conversations c JOIN agents a ON a.id = c.agent_id
                 WHERE c.id = ?1",
                [conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map(|(agent_id, tenant, tz)| OwnedConversation {
            id: conversation_id,
            agent: OwnedAgent {
                id: agent_id,
                tenant: TenantId(tenant),
                timezone: zone_or_utc(&tz),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;

    fn insert_agent(db: &Database, tenant: &str) -> AgentId {
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO agents (tenant_id, name, platform, timezone, created_at, updated_at)
             VALUES (?1, 'Bot', 'telegram', 'Europe/Moscow', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            [tenant],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_guard_agent_checks_owner() {
        let (_dir, db) = temp_db();
        let id = insert_agent(&db, "t1");

        let owned = db.guard_agent(&TenantId::new("t1"), id).unwrap();
        assert_eq!(owned.id(), id);
        assert_eq!(owned.timezone(), chrono_tz::Europe::Moscow);

        assert!(matches!(
            db.guard_agent(&TenantId::new("t2"), id),
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            db.guard_agent(&TenantId::new("t1"), id + 100),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn test_gateway_resolution_errors() {
        let (_dir, db) = temp_db();
        assert!(matches!(
            db.resolve_agent_for_gateway(7),
            Err(CoreError::UnknownAgent)
        ));
        assert!(matches!(
            db.resolve_conversation_for_gateway(7),
            Err(CoreError::UnknownConversation)
        ));
    }

    #[test]
    fn test_zone_or_utc() {
        assert_eq!(zone_or_utc("Asia/Tokyo"), chrono_tz::Asia::Tokyo);
        assert_eq!(zone_or_utc("Mars/Olympus"), Tz::UTC);
    }
}
