//! Message database operations (append-only)

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::{parsed_at, time_at, to_db_time, Database};
use crate::error::CoreResult;
use crate::models::{ConversationId, Message, MessageId, MessageRole};
use crate::tenancy::OwnedConversation;

impl Database {
    pub(crate) fn insert_message(
        conn: &Connection,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
        created_at: &DateTime<Utc>,
    ) -> CoreResult<MessageId> {
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![conversation_id, role.as_str(), content, to_db_time(created_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Messages of a conversation in chronological order
    pub(crate) fn list_messages(&self, conversation: &OwnedConversation) -> CoreResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let messages = stmt
            .query_map([conversation.id()], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: parsed_at(row, 2)?,
                    content: row.get(3)?,
                    created_at: time_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }
}
