//! `BotDesk` is the command/query surface the presentation layer and the
//! platform gateway talk to. Each submodule adds an `impl BotDesk` block for
//! one area; storage lives in `db::tables`.

mod agents;
mod conversations;
mod knowledge;

use std::sync::Arc;

use crate::db::Database;
use crate::locks::KeyedLocks;
use crate::models::ConversationId;

pub struct BotDesk {
    pub(crate) db: Arc<Database>,
    /// Serializes message appends and lead flips per conversation
    pub(crate) conversation_locks: KeyedLocks<ConversationId>,
}

impl BotDesk {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            conversation_locks: KeyedLocks::new(),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}
