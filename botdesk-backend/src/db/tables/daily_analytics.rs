//! Per-agent-per-day rollup rows
//!
//! Increments are a single `INSERT .. ON CONFLICT DO UPDATE` statement, so
//! concurrent writers for the same (agent, date) never lose an update.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::{date_at, time_at, to_db_date, to_db_time, Database};
use crate::error::CoreResult;
use crate::models::{AgentId, AnalyticsTotals, DailyAnalytics, DateRange, EventKind};
use crate::tenancy::{AgentScope, OwnedAgent};

/// What a recompute did to one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BucketWrite {
    Written,
    Removed,
}

/// Exact event counts for one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BucketCounts {
    pub new_conversations: i64,
    pub messages_sent: i64,
    pub leads_captured: i64,
}

impl BucketCounts {
    fn is_empty(&self) -> bool {
        self.new_conversations == 0 && self.messages_sent == 0 && self.leads_captured == 0
    }
}

impl Database {
    /// Add one `kind` event to the (agent, date) row, creating it if absent
    pub(crate) fn bump_rollup(
        conn: &Connection,
        agent_id: AgentId,
        date: NaiveDate,
        kind: EventKind,
    ) -> CoreResult<()> {
        let (conversations, messages, leads) = kind.deltas();
        conn.execute(
            "INSERT INTO daily_analytics (agent_id, date, new_conversations, messages_sent, leads_captured)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(agent_id, date) DO UPDATE SET
                new_conversations = new_conversations + excluded.new_conversations,
                messages_sent = messages_sent + excluded.messages_sent,
                leads_captured = leads_captured + excluded.leads_captured",
            rusqlite::params![agent_id, to_db_date(date), conversations, messages, leads],
        )?;
        Ok(())
    }

    /// Plain insert used by bulk imports. An existing (agent, date) row
    /// fails with `Conflict`.
    pub(crate) fn insert_rollup(&self, agent: &OwnedAgent, row: &DailyAnalytics) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO daily_analytics (agent_id, date, new_conversations, messages_sent, leads_captured)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                agent.id(),
                to_db_date(row.date),
                row.new_conversations,
                row.messages_sent,
                row.leads_captured,
            ],
        )?;
        Ok(())
    }

    /// Rows in scope within the inclusive range, by date then agent. Dates
    /// without activity are absent, not zero-filled.
    pub(crate) fn rollup_range(&self, scope: AgentScope<'_>, range: DateRange) -> CoreResult<Vec<DailyAnalytics>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT d.agent_id, d.date, d.new_conversations, d.messages_sent, d.leads_captured
             FROM daily_analytics d JOIN agents a ON a.id = d.agent_id
             WHERE {} AND d.date >= ?2 AND d.date <= ?3
             ORDER BY d.date ASC, d.agent_id ASC",
            scope.predicate(1)
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params![scope.param(), to_db_date(range.from), to_db_date(range.to)],
                |row| {
                    Ok(DailyAnalytics {
                        agent_id: row.get(0)?,
                        date: date_at(row, 1)?,
                        new_conversations: row.get(2)?,
                        messages_sent: row.get(3)?,
                        leads_captured: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sums over the rows in scope; no rows gives all-zero totals
    pub(crate) fn rollup_totals(&self, scope: AgentScope<'_>, range: DateRange) -> CoreResult<AnalyticsTotals> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT COALESCE(SUM(d.new_conversations), 0), COALESCE(SUM(d.messages_sent), 0),
                    COALESCE(SUM(d.leads_captured), 0)
             FROM daily_analytics d JOIN agents a ON a.id = d.agent_id
             WHERE {} AND d.date >= ?2 AND d.date <= ?3",
            scope.predicate(1)
        );

        let totals = conn.query_row(
            &sql,
            rusqlite::params![scope.param(), to_db_date(range.from), to_db_date(range.to)],
            |row| {
                Ok(AnalyticsTotals {
                    new_conversations: row.get(0)?,
                    messages_sent: row.get(1)?,
                    leads_captured: row.get(2)?,
                })
            },
        )?;
        Ok(totals)
    }

    /// Dates that currently have a rollup row for the agent
    pub(crate) fn rollup_dates(&self, agent_id: AgentId) -> CoreResult<Vec<NaiveDate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT date FROM daily_analytics WHERE agent_id = ?1")?;
        let dates = stmt
            .query_map([agent_id], |row| date_at(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    /// Every instant at which the agent produced a countable event
    /// (conversation starts, messages, lead captures), streamed to `visit`.
    pub(crate) fn visit_event_times(
        &self,
        agent_id: AgentId,
        mut visit: impl FnMut(DateTime<Utc>),
    ) -> CoreResult<()> {
        let conn = self.conn()?;
        let queries = [
            "SELECT started_at FROM conversations WHERE agent_id = ?1",
            "SELECT m.created_at FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE c.agent_id = ?1",
            "SELECT lead_captured_at FROM conversations
             WHERE agent_id = ?1 AND is_lead = 1 AND lead_captured_at IS NOT NULL",
        ];
        for sql in queries {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([agent_id])?;
            while let Some(row) = rows.next()? {
                visit(time_at(row, 0)?);
            }
        }
        Ok(())
    }

    /// Exact counts of events in `[start, end)` for the agent
    pub(crate) fn count_bucket_events(
        conn: &Connection,
        agent_id: AgentId,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> CoreResult<BucketCounts> {
        let (start, end) = (to_db_time(start), to_db_time(end));

        let new_conversations = conn.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE agent_id = ?1 AND started_at >= ?2 AND started_at < ?3",
            rusqlite::params![agent_id, &start, &end],
            |row| row.get(0),
        )?;
        let messages_sent = conn.query_row(
            "SELECT COUNT(*) FROM messages m JOIN conversations c ON c.id = m.conversation_id
             WHERE c.agent_id = ?1 AND m.created_at >= ?2 AND m.created_at < ?3",
            rusqlite::params![agent_id, &start, &end],
            |row| row.get(0),
        )?;
        let leads_captured = conn.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE agent_id = ?1 AND is_lead = 1 AND lead_captured_at >= ?2 AND lead_captured_at < ?3",
            rusqlite::params![agent_id, &start, &end],
            |row| row.get(0),
        )?;

        Ok(BucketCounts {
            new_conversations,
            messages_sent,
            leads_captured,
        })
    }

    /// Replace a bucket with exact counts; an empty bucket has no row.
    pub(crate) fn overwrite_rollup(
        conn: &Connection,
        agent_id: AgentId,
        date: NaiveDate,
        counts: BucketCounts,
    ) -> CoreResult<BucketWrite> {
        if counts.is_empty() {
            conn.execute(
                "DELETE FROM daily_analytics WHERE agent_id = ?1 AND date = ?2",
                rusqlite::params![agent_id, to_db_date(date)],
            )?;
            return Ok(BucketWrite::Removed);
        }

        conn.execute(
            "INSERT INTO daily_analytics (agent_id, date, new_conversations, messages_sent, leads_captured)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(agent_id, date) DO UPDATE SET
                new_conversations = excluded.new_conversations,
                messages_sent = excluded.messages_sent,
                leads_captured = excluded.leads_captured",
            rusqlite::params![
                agent_id,
                to_db_date(date),
                counts.new_conversations,
                counts.messages_sent,
                counts.leads_captured,
            ],
        )?;
        Ok(BucketWrite::Written)
    }
}
