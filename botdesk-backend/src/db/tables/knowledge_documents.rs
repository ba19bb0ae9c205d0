//! Knowledge base document metadata

use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::{opt_time_at, time_at, to_db_time, Database};
use crate::error::{CoreError, CoreResult};
use crate::models::{DocumentId, KnowledgeDocument};
use crate::tenancy::{OwnedAgent, OwnedDocument, TenantId};

const DOCUMENT_COLUMNS: &str =
    "id, agent_id, title, file_ref, file_type, content_extracted, extracted_at, created_at";

impl Database {
    pub(crate) fn insert_document(
        &self,
        agent: &OwnedAgent,
        title: &str,
        file_ref: &str,
        file_type: &str,
    ) -> CoreResult<DocumentId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO knowledge_documents (agent_id, title, file_ref, file_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![agent.id(), title, file_ref, file_type, to_db_time(&Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn get_document(&self, document: &OwnedDocument) -> CoreResult<KnowledgeDocument> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM knowledge_documents WHERE id = ?1", DOCUMENT_COLUMNS);
        conn.query_row(&sql, [document.id()], Self::row_to_document)
            .optional()?
            .ok_or(CoreError::NotFound)
    }

    /// Documents attached to an agent, newest first
    pub(crate) fn list_documents(&self, agent: &OwnedAgent) -> CoreResult<Vec<KnowledgeDocument>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM knowledge_documents WHERE agent_id = ?1 ORDER BY created_at DESC, id DESC",
            DOCUMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let docs = stmt
            .query_map([agent.id()], Self::row_to_document)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Store extracted text. Only the first call for a document succeeds;
    /// returns false if text was already recorded.
    pub(crate) fn set_extracted_text(&self, document: &OwnedDocument, text: &str) -> CoreResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE knowledge_documents SET content_extracted = ?1, extracted_at = ?2
             WHERE id = ?3 AND extracted_at IS NULL",
            rusqlite::params![text, to_db_time(&Utc::now()), document.id()],
        )?;
        Ok(rows > 0)
    }

    pub(crate) fn delete_document(&self, document: &OwnedDocument) -> CoreResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM knowledge_documents WHERE id = ?1", [document.id()])?;
        Ok(rows > 0)
    }

    pub(crate) fn count_documents(&self, tenant: &TenantId) -> CoreResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM knowledge_documents k JOIN agents a ON a.id = k.agent_id
             WHERE a.tenant_id = ?1",
            [tenant.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn row_to_document(row: &Row<'_>) -> rusqlite::Result<KnowledgeDocument> {
        Ok(KnowledgeDocument {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            title: row.get(2)?,
            file_ref: row.get(3)?,
            file_type: row.get(4)?,
            content_extracted: row.get(5)?,
            extracted_at: opt_time_at(row, 6)?,
            created_at: time_at(row, 7)?,
        })
    }
}
