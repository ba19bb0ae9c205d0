//! Agent database operations

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::{parsed_at, time_at, to_db_time, Database};
use crate::error::{CoreError, CoreResult};
use crate::models::{Agent, AgentId, AgentStatus, DashboardSummary, EventKind, Platform};
use crate::tenancy::{OwnedAgent, TenantId};

const AGENT_COLUMNS: &str = "id, tenant_id, name, platform, bot_token, status, description, timezone,
     total_conversations, total_messages, total_leads, created_at, updated_at";

/// Validated field values for an agent update
pub(crate) struct AgentUpdate<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub bot_token: Option<&'a str>,
    pub timezone: Option<&'a str>,
}

impl Database {
    /// Insert a new agent (status inactive, zero counters)
    pub(crate) fn insert_agent(
        &self,
        tenant: &TenantId,
        name: &str,
        platform: Platform,
        bot_token: &str,
        description: &str,
        timezone: &str,
    ) -> CoreResult<AgentId> {
        let conn = self.conn()?;
        let now = to_db_time(&Utc::now());

        conn.execute(
            "INSERT INTO agents (tenant_id, name, platform, bot_token, status, description, timezone, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                tenant.as_str(),
                name,
                platform.as_str(),
                bot_token,
                AgentStatus::Inactive.as_str(),
                description,
                timezone,
                &now,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn get_agent(&self, agent: &OwnedAgent) -> CoreResult<Agent> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS);
        conn.query_row(&sql, [agent.id()], Self::row_to_agent)
            .optional()?
            .ok_or(CoreError::NotFound)
    }

    /// All agents of a tenant, newest first
    pub(crate) fn list_agents(&self, tenant: &TenantId) -> CoreResult<Vec<Agent>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM agents WHERE tenant_id = ?1 ORDER BY created_at DESC, id DESC",
            AGENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let agents = stmt
            .query_map([tenant.as_str()], Self::row_to_agent)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(agents)
    }

    pub(crate) fn get_agent_status(&self, agent: &OwnedAgent) -> CoreResult<AgentStatus> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT status FROM agents WHERE id = ?1",
            [agent.id()],
            |row| parsed_at(row, 0),
        )
        .optional()?
        .ok_or(CoreError::NotFound)
    }

    /// Compare-and-set the status. Returns false when the stored status is no
    /// longer `expected` (a concurrent change won).
    pub(crate) fn swap_agent_status(
        &self,
        agent: &OwnedAgent,
        expected: AgentStatus,
        next: AgentStatus,
    ) -> CoreResult<bool> {
        let conn = self.conn()?;
        let now = to_db_time(&Utc::now());
        let rows = conn.execute(
            "UPDATE agents SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            rusqlite::params![next.as_str(), &now, agent.id(), expected.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub(crate) fn update_agent(&self, agent: &OwnedAgent, update: &AgentUpdate<'_>) -> CoreResult<Agent> {
        let conn = self.conn()?;
        let now = to_db_time(&Utc::now());

        // Build dynamic update query
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

        let fields = [
            ("name", update.name),
            ("description", update.description),
            ("bot_token", update.bot_token),
            ("timezone", update.timezone),
        ];
        for (column, value) in fields {
            if let Some(v) = value {
                params.push(Box::new(v.to_string()));
                updates.push(format!("{} = ?{}", column, params.len()));
            }
        }
        params.push(Box::new(agent.id()));

        let sql = format!(
            "UPDATE agents SET {} WHERE id = ?{}",
            updates.join(", "),
            params.len()
        );
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_ref.as_slice())?;

        drop(conn);
        self.get_agent(agent)
    }

    /// Delete an agent and everything it owns. Returns the agent's name.
    pub(crate) fn delete_agent(&self, agent: &OwnedAgent) -> CoreResult<String> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let name: String = tx
            .query_row("SELECT name FROM agents WHERE id = ?1", [agent.id()], |row| row.get(0))
            .optional()?
            .ok_or(CoreError::NotFound)?;

        // knowledge_documents, conversations (-> messages), daily_analytics cascade
        tx.execute("DELETE FROM agents WHERE id = ?1", [agent.id()])?;
        tx.commit()?;

        Ok(name)
    }

    pub(crate) fn agent_present(conn: &Connection, agent_id: AgentId) -> CoreResult<bool> {
        let found = conn
            .query_row("SELECT 1 FROM agents WHERE id = ?1", [agent_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Bump the cached total for `kind` inside an ingestion transaction
    pub(crate) fn bump_agent_counter(conn: &Connection, agent_id: AgentId, kind: EventKind) -> CoreResult<()> {
        let column = kind.agent_column();
        let sql = format!("UPDATE agents SET {0} = {0} + 1 WHERE id = ?1", column);
        conn.execute(&sql, [agent_id])?;
        Ok(())
    }

    /// Overwrite the cached totals with values re-derived from raw tables
    pub(crate) fn refresh_agent_counters(conn: &Connection, agent_id: AgentId) -> CoreResult<()> {
        conn.execute(
            "UPDATE agents SET
                total_conversations = (SELECT COUNT(*) FROM conversations WHERE agent_id = ?1),
                total_messages = (SELECT COUNT(*) FROM messages m
                                  JOIN conversations c ON c.id = m.conversation_id
                                  WHERE c.agent_id = ?1),
                total_leads = (SELECT COUNT(*) FROM conversations WHERE agent_id = ?1 AND is_lead = 1)
             WHERE id = ?1",
            [agent_id],
        )?;
        Ok(())
    }

    /// Agent counts by status and summed cached counters. Conversion rate and
    /// document count are left for the caller.
    pub(crate) fn dashboard_counts(&self, tenant: &TenantId) -> CoreResult<DashboardSummary> {
        let conn = self.conn()?;
        let summary = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'active'), 0),
                    COALESCE(SUM(status = 'paused'), 0),
                    COALESCE(SUM(status = 'inactive'), 0),
                    COALESCE(SUM(total_conversations), 0),
                    COALESCE(SUM(total_messages), 0),
                    COALESCE(SUM(total_leads), 0)
             FROM agents WHERE tenant_id = ?1",
            [tenant.as_str()],
            |row| {
                Ok(DashboardSummary {
                    total_agents: row.get(0)?,
                    active_agents: row.get(1)?,
                    paused_agents: row.get(2)?,
                    inactive_agents: row.get(3)?,
                    total_conversations: row.get(4)?,
                    total_messages: row.get(5)?,
                    total_leads: row.get(6)?,
                    ..Default::default()
                })
            },
        )?;
        Ok(summary)
    }

    /// (id, timezone) of every agent with id >= `from`, ascending
    pub(crate) fn list_agent_zones(&self, from: AgentId) -> CoreResult<Vec<(AgentId, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, timezone FROM agents WHERE id >= ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([from], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
        Ok(Agent {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
            platform: parsed_at(row, 3)?,
            bot_token: row.get(4)?,
            status: parsed_at(row, 5)?,
            description: row.get(6)?,
            timezone: row.get(7)?,
            total_conversations: row.get(8)?,
            total_messages: row.get(9)?,
            total_leads: row.get(10)?,
            created_at: time_at(row, 11)?,
            updated_at: time_at(row, 12)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id)
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, db) = temp_db();
        let id = db
            .insert_agent(&tenant("t1"), "Support Bot", Platform::Telegram, "tok", "desc", "UTC")
            .unwrap();
        let owned = db.guard_agent(&tenant("t1"), id).unwrap();
        let agent = db.get_agent(&owned).unwrap();

        assert_eq!(agent.name, "Support Bot");
        assert_eq!(agent.platform, Platform::Telegram);
        assert_eq!(agent.status, AgentStatus::Inactive);
        assert_eq!(agent.total_conversations, 0);
        assert_eq!(agent.bot_token, "tok");
    }

    #[test]
    fn test_list_is_tenant_scoped_and_newest_first() {
        let (_dir, db) = temp_db();
        let a = db.insert_agent(&tenant("t1"), "A", Platform::Vk, "", "", "UTC").unwrap();
        let b = db.insert_agent(&tenant("t1"), "B", Platform::Vk, "", "", "UTC").unwrap();
        db.insert_agent(&tenant("t2"), "C", Platform::Vk, "", "", "UTC").unwrap();

        let ids: Vec<AgentId> = db.list_agents(&tenant("t1")).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_swap_status_is_compare_and_set() {
        let (_dir, db) = temp_db();
        let id = db.insert_agent(&tenant("t1"), "A", Platform::Vk, "", "", "UTC").unwrap();
        let owned = db.guard_agent(&tenant("t1"), id).unwrap();

        assert!(db.swap_agent_status(&owned, AgentStatus::Inactive, AgentStatus::Active).unwrap());
        assert!(!db.swap_agent_status(&owned, AgentStatus::Inactive, AgentStatus::Active).unwrap());
        assert_eq!(db.get_agent_status(&owned).unwrap(), AgentStatus::Active);
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let (_dir, db) = temp_db();
        let id = db.insert_agent(&tenant("t1"), "A", Platform::Vk, "secret", "old", "UTC").unwrap();
        let owned = db.guard_agent(&tenant("t1"), id).unwrap();

        let agent = db
            .update_agent(
                &owned,
                &AgentUpdate {
                    name: None,
                    description: Some("new"),
                    bot_token: None,
                    timezone: Some("Europe/Berlin"),
                },
            )
            .unwrap();
        assert_eq!(agent.name, "A");
        assert_eq!(agent.description, "new");
        assert_eq!(agent.bot_token, "secret");
        assert_eq!(agent.timezone, "Europe/Berlin");
    }

    #[test]
    fn test_delete_returns_name() {
        let (_dir, db) = temp_db();
        let id = db.insert_agent(&tenant("t1"), "Sales Bot", Platform::Instagram, "", "", "UTC").unwrap();
        let owned = db.guard_agent(&tenant("t1"), id).unwrap();

        assert_eq!(db.delete_agent(&owned).unwrap(), "Sales Bot");
        assert!(matches!(db.delete_agent(&owned), Err(CoreError::NotFound)));
        assert!(db.list_agents(&tenant("t1")).unwrap().is_empty());
    }
}
