//! Single-row progress marker for the analytics recompute job

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::db::{to_db_date, to_db_time, Database};
use crate::error::CoreResult;
use crate::models::AgentId;

/// Last durable position of an interrupted recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    pub agent_id: AgentId,
    /// Last bucket written for `agent_id`; buckets are visited in date order
    pub last_date: Option<NaiveDate>,
    /// All buckets and counters of `agent_id` are done
    pub agent_complete: bool,
}

impl Database {
    pub(crate) fn load_checkpoint(&self) -> CoreResult<Option<Checkpoint>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT agent_id, last_date, agent_complete FROM analytics_recompute_checkpoint WHERE id = 1",
                [],
                |row| {
                    let last_date: Option<String> = row.get(1)?;
                    Ok((row.get::<_, AgentId>(0)?, last_date, row.get::<_, i64>(2)? != 0))
                },
            )
            .optional()?;

        Ok(row.map(|(agent_id, last_date, agent_complete)| Checkpoint {
            agent_id,
            last_date: last_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            agent_complete,
        }))
    }

    /// Persist progress; called inside the same transaction as the bucket
    /// write it describes.
    pub(crate) fn save_checkpoint(conn: &Connection, checkpoint: &Checkpoint) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO analytics_recompute_checkpoint (id, agent_id, last_date, agent_complete, started_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                agent_id = excluded.agent_id,
                last_date = excluded.last_date,
                agent_complete = excluded.agent_complete",
            rusqlite::params![
                checkpoint.agent_id,
                checkpoint.last_date.map(to_db_date),
                checkpoint.agent_complete as i64,
                to_db_time(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn clear_checkpoint(&self) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM analytics_recompute_checkpoint", [])?;
        Ok(())
    }
}
