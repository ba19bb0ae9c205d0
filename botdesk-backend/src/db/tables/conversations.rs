//! Conversation database operations

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::{opt_time_at, time_at, to_db_time, Database};
use crate::error::{CoreError, CoreResult};
use crate::models::{AgentId, Conversation, ConversationFilter, ConversationId, PageWindow};
use crate::tenancy::{AgentScope, OwnedConversation};

const CONVERSATION_COLUMNS: &str = "c.id, c.agent_id, c.user_id, c.user_name, c.started_at, c.last_message_at,
     c.message_count, c.is_lead, c.lead_email, c.lead_phone, c.lead_captured_at";

/// Ordering state of a conversation, read inside a write transaction
pub(crate) struct ConversationClock {
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub message_count: i64,
}

impl Database {
    /// Insert a conversation whose first activity is `at`
    pub(crate) fn insert_conversation(
        conn: &Connection,
        agent_id: AgentId,
        user_id: &str,
        user_name: Option<&str>,
        at: &DateTime<Utc>,
    ) -> CoreResult<ConversationId> {
        let ts = to_db_time(at);
        conn.execute(
            "INSERT INTO conversations (agent_id, user_id, user_name, started_at, last_message_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![agent_id, user_id, user_name, &ts],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn conversation_clock(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> CoreResult<ConversationClock> {
        conn.query_row(
            "SELECT started_at, last_message_at, message_count FROM conversations WHERE id = ?1",
            [conversation_id],
            |row| {
                Ok(ConversationClock {
                    started_at: time_at(row, 0)?,
                    last_message_at: time_at(row, 1)?,
                    message_count: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or(CoreError::UnknownConversation)
    }

    /// Record a new message timestamp. `last_message_at` only ever moves
    /// forward, whatever order concurrent writers commit in.
    pub(crate) fn advance_conversation(
        conn: &Connection,
        conversation_id: ConversationId,
        at: &DateTime<Utc>,
    ) -> CoreResult<()> {
        conn.execute(
            "UPDATE conversations
             SET last_message_at = MAX(last_message_at, ?2), message_count = message_count + 1
             WHERE id = ?1",
            rusqlite::params![conversation_id, to_db_time(at)],
        )?;
        Ok(())
    }

    /// Flip `is_lead` false -> true. Returns false if it already was a lead.
    pub(crate) fn mark_lead(
        conn: &Connection,
        conversation_id: ConversationId,
        at: &DateTime<Utc>,
    ) -> CoreResult<bool> {
        let rows = conn.execute(
            "UPDATE conversations SET is_lead = 1, lead_captured_at = ?2 WHERE id = ?1 AND is_lead = 0",
            rusqlite::params![conversation_id, to_db_time(at)],
        )?;
        Ok(rows > 0)
    }

    /// Merge lead contact details; empty values never replace recorded ones.
    pub(crate) fn merge_lead_contacts(
        conn: &Connection,
        conversation_id: ConversationId,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> CoreResult<()> {
        conn.execute(
            "UPDATE conversations SET
                lead_email = CASE WHEN ?2 <> '' THEN ?2 ELSE lead_email END,
                lead_phone = CASE WHEN ?3 <> '' THEN ?3 ELSE lead_phone END
             WHERE id = ?1",
            rusqlite::params![
                conversation_id,
                email.map(str::trim).unwrap_or(""),
                phone.map(str::trim).unwrap_or(""),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_conversation(&self, conversation: &OwnedConversation) -> CoreResult<Conversation> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM conversations c WHERE c.id = ?1", CONVERSATION_COLUMNS);
        conn.query_row(&sql, [conversation.id()], Self::row_to_conversation)
            .optional()?
            .ok_or(CoreError::NotFound)
    }

    /// Conversations in scope, most recently active first
    pub(crate) fn list_conversations(
        &self,
        scope: AgentScope<'_>,
        filter: &ConversationFilter,
        page: PageWindow,
    ) -> CoreResult<Vec<Conversation>> {
        let conn = self.conn()?;

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![scope.param()];
        let mut clauses = vec![scope.predicate(1)];

        if filter.leads_only {
            clauses.push("c.is_lead = 1".to_string());
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(Box::new(like_pattern(term)));
            let idx = params.len();
            clauses.push(format!(
                "(LOWER(COALESCE(c.user_name, '')) LIKE ?{0} ESCAPE '\\'
                  OR LOWER(c.user_id) LIKE ?{0} ESCAPE '\\'
                  OR LOWER(c.lead_email) LIKE ?{0} ESCAPE '\\')",
                idx
            ));
        }

        params.push(Box::new(page.effective_limit()));
        let limit_idx = params.len();
        params.push(Box::new(page.offset));
        let offset_idx = params.len();

        let sql = format!(
            "SELECT {} FROM conversations c JOIN agents a ON a.id = c.agent_id
             WHERE {}
             ORDER BY c.last_message_at DESC, c.id DESC
             LIMIT ?{} OFFSET ?{}",
            CONVERSATION_COLUMNS,
            clauses.join(" AND "),
            limit_idx,
            offset_idx
        );

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let conversations = stmt
            .query_map(params_ref.as_slice(), Self::row_to_conversation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            user_id: row.get(2)?,
            user_name: row.get(3)?,
            started_at: time_at(row, 4)?,
            last_message_at: time_at(row, 5)?,
            message_count: row.get(6)?,
            is_lead: row.get::<_, i64>(7)? != 0,
            lead_email: row.get(8)?,
            lead_phone: row.get(9)?,
            lead_captured_at: opt_time_at(row, 10)?,
        })
    }
}

/// `%term%`, lower-cased, with LIKE wildcards escaped
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Alice"), "%alice%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
