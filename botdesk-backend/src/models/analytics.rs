use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::AgentId;
use crate::error::CoreError;

/// Which rollup counter an event bumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Conversation,
    Message,
    Lead,
}

impl EventKind {
    /// (new_conversations, messages_sent, leads_captured) increments
    pub(crate) fn deltas(&self) -> (i64, i64, i64) {
        match self {
            EventKind::Conversation => (1, 0, 0),
            EventKind::Message => (0, 1, 0),
            EventKind::Lead => (0, 0, 1),
        }
    }

    /// Column in `agents` holding the cached total for this counter
    pub(crate) fn agent_column(&self) -> &'static str {
        match self {
            EventKind::Conversation => "total_conversations",
            EventKind::Message => "total_messages",
            EventKind::Lead => "total_leads",
        }
    }
}

/// One per-agent-per-day rollup row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    pub agent_id: AgentId,
    pub date: NaiveDate,
    pub new_conversations: i64,
    pub messages_sent: i64,
    pub leads_captured: i64,
}

/// Sum of rollup counters over a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsTotals {
    pub new_conversations: i64,
    pub messages_sent: i64,
    pub leads_captured: i64,
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, CoreError> {
        if from > to {
            return Err(CoreError::InvalidRange);
        }
        Ok(Self {
            from: storable_date(from)?,
            to: storable_date(to)?,
        })
    }
}

/// Dates are stored as `YYYY-MM-DD`; other years do not round-trip
pub(crate) fn storable_date(date: NaiveDate) -> Result<NaiveDate, CoreError> {
    if (0..=9999).contains(&date.year()) {
        Ok(date)
    } else {
        Err(CoreError::InvalidTimestamp)
    }
}

/// Per-tenant overview shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_agents: i64,
    pub active_agents: i64,
    pub paused_agents: i64,
    pub inactive_agents: i64,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub total_leads: i64,
    pub conversion_rate: String,
    pub knowledge_documents: i64,
}

/// How a recompute pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecomputeOutcome {
    Completed,
    /// Cancelled; a later run resumes after the last committed bucket
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    pub outcome: RecomputeOutcome,
    /// Whether the run picked up a checkpoint left by an interrupted run
    pub resumed: bool,
    pub agents_completed: usize,
    pub buckets_written: usize,
    pub buckets_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let range = DateRange::new(d(1), d(3)).unwrap();
        assert_eq!((range.from, range.to), (d(1), d(3)));
        assert!(DateRange::new(d(1), d(1)).is_ok());
        assert!(matches!(DateRange::new(d(3), d(1)), Err(CoreError::InvalidRange)));

        let far = NaiveDate::from_ymd_opt(10000, 1, 1).unwrap();
        assert!(matches!(DateRange::new(d(1), far), Err(CoreError::InvalidTimestamp)));
    }
}
