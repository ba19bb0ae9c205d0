//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod agents;               // agents (+ cached counters)
mod knowledge_documents;  // knowledge_documents
mod conversations;        // conversations (lead flag, last_message_at)
mod messages;             // messages (append-only)
mod daily_analytics;      // daily_analytics (per-agent-per-day rollups)
mod recompute_checkpoint; // analytics_recompute_checkpoint (resumable recompute)

pub(crate) use agents::AgentUpdate;
pub(crate) use daily_analytics::BucketWrite;
pub(crate) use recompute_checkpoint::Checkpoint;
