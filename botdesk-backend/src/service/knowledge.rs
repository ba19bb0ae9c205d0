//! Knowledge base documents. Storage and text extraction happen elsewhere;
//! this only tracks metadata and the extracted text once it is reported.

use super::BotDesk;
use crate::error::{CoreError, CoreResult};
use crate::models::knowledge::{file_type_from_name, title_from_name};
use crate::models::{AgentId, DocumentId, KnowledgeDocument};
use crate::tenancy::TenantId;

impl BotDesk {
    /// Register an uploaded file. `file_ref` is the storage handle returned by
    /// the document processor.
    pub fn upload_knowledge_document(
        &self,
        tenant: &TenantId,
        agent_id: AgentId,
        filename: &str,
        file_ref: &str,
    ) -> CoreResult<DocumentId> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        if file_ref.trim().is_empty() || filename.trim().is_empty() {
            return Err(CoreError::InvalidFile);
        }

        let id = self.db.insert_document(
            &agent,
            &title_from_name(filename),
            file_ref.trim(),
            &file_type_from_name(filename),
        )?;
        log::info!("[KNOWLEDGE] Stored document {} for agent {}", id, agent_id);
        Ok(id)
    }

    /// Record the text the processor extracted. A document accepts text once.
    pub fn record_extracted_text(
        &self,
        tenant: &TenantId,
        document_id: DocumentId,
        text: &str,
    ) -> CoreResult<KnowledgeDocument> {
        let document = self.db.guard_document(tenant, document_id)?;
        if !self.db.set_extracted_text(&document, text)? {
            return Err(CoreError::Conflict);
        }
        self.db.get_document(&document)
    }

    pub fn get_knowledge_document(&self, tenant: &TenantId, document_id: DocumentId) -> CoreResult<KnowledgeDocument> {
        let document = self.db.guard_document(tenant, document_id)?;
        self.db.get_document(&document)
    }

    /// Documents of an agent, newest first
    pub fn list_knowledge_documents(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<Vec<KnowledgeDocument>> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        self.db.list_documents(&agent)
    }

    pub fn delete_knowledge_document(&self, tenant: &TenantId, document_id: DocumentId) -> CoreResult<()> {
        let document = self.db.guard_document(tenant, document_id)?;
        if !self.db.delete_document(&document)? {
            return Err(CoreError::NotFound);
        }
        log::info!("[KNOWLEDGE] Deleted document {}", document_id);
        Ok(())
    }
}
