//! Full rebuild of rollups and agent counters from the raw tables.
//!
//! Agents are processed in id order and each agent's buckets in date order.
//! Every bucket is counted and overwritten in its own IMMEDIATE transaction
//! together with the checkpoint row, so an interrupted run leaves only
//! fully-written buckets behind and the next run continues after the last
//! one. Concurrent ingestion stays correct: it commits either before a
//! bucket's transaction (and is counted) or after it (and increments the
//! exact value).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;

use super::buckets::{day_bounds, local_date};
use crate::db::{BucketWrite, Checkpoint, Database};
use crate::error::CoreResult;
use crate::models::{AgentId, RecomputeOutcome, RecomputeReport};
use crate::service::BotDesk;
use crate::tenancy::zone_or_utc;

impl BotDesk {
    /// Rebuild every rollup row and agent counter. Stops between buckets once
    /// `cancel` fires; calling again resumes where the previous run stopped.
    pub fn recompute_analytics(&self, cancel: &CancellationToken) -> CoreResult<RecomputeReport> {
        self.recompute_with(cancel, |_, _| {})
    }

    /// As [`recompute_analytics`](Self::recompute_analytics), calling
    /// `on_bucket` after each committed bucket.
    pub(crate) fn recompute_with(
        &self,
        cancel: &CancellationToken,
        mut on_bucket: impl FnMut(AgentId, NaiveDate),
    ) -> CoreResult<RecomputeReport> {
        let checkpoint = self.db.load_checkpoint()?;
        let mut report = RecomputeReport {
            outcome: RecomputeOutcome::Completed,
            resumed: checkpoint.is_some(),
            agents_completed: 0,
            buckets_written: 0,
            buckets_removed: 0,
        };

        match checkpoint {
            Some(cp) => log::info!(
                "[RECOMPUTE] Resuming at agent {} after {:?}",
                cp.agent_id,
                cp.last_date
            ),
            None => log::info!("[RECOMPUTE] Starting full analytics recompute"),
        }

        let first_agent = checkpoint.map(|cp| cp.agent_id).unwrap_or(AgentId::MIN);
        for (agent_id, zone) in self.db.list_agent_zones(first_agent)? {
            let resume = checkpoint.filter(|cp| cp.agent_id == agent_id);
            if resume.is_some_and(|cp| cp.agent_complete) {
                continue;
            }
            let after = resume.and_then(|cp| cp.last_date);
            let tz = zone_or_utc(&zone);

            for date in self.bucket_dates(agent_id, tz)? {
                if after.is_some_and(|done| date <= done) {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Ok(Self::interrupted(report));
                }

                let (start, end) = day_bounds(date, tz);
                let write = self.db.write_tx(|tx| {
                    let counts = Database::count_bucket_events(tx, agent_id, &start, &end)?;
                    let write = Database::overwrite_rollup(tx, agent_id, date, counts)?;
                    Database::save_checkpoint(
                        tx,
                        &Checkpoint {
                            agent_id,
                            last_date: Some(date),
                            agent_complete: false,
                        },
                    )?;
                    Ok(write)
                })?;

                match write {
                    BucketWrite::Written => report.buckets_written += 1,
                    BucketWrite::Removed => report.buckets_removed += 1,
                }
                on_bucket(agent_id, date);
            }

            if cancel.is_cancelled() {
                return Ok(Self::interrupted(report));
            }
            self.db.write_tx(|tx| {
                Database::refresh_agent_counters(tx, agent_id)?;
                Database::save_checkpoint(
                    tx,
                    &Checkpoint {
                        agent_id,
                        last_date: None,
                        agent_complete: true,
                    },
                )
            })?;
            report.agents_completed += 1;
        }

        self.db.clear_checkpoint()?;
        log::info!(
            "[RECOMPUTE] Done: {} agents, {} buckets written, {} removed",
            report.agents_completed,
            report.buckets_written,
            report.buckets_removed
        );
        Ok(report)
    }

    fn interrupted(mut report: RecomputeReport) -> RecomputeReport {
        report.outcome = RecomputeOutcome::Interrupted;
        log::warn!(
            "[RECOMPUTE] Cancelled after {} agents and {} buckets; next run resumes from the checkpoint",
            report.agents_completed,
            report.buckets_written + report.buckets_removed
        );
        report
    }

    /// Local dates with raw events plus dates that already have a row (stale
    /// rows must be visited to be removed), ascending.
    fn bucket_dates(&self, agent_id: AgentId, tz: Tz) -> CoreResult<BTreeSet<NaiveDate>> {
        let mut dates: BTreeSet<NaiveDate> = self.db.rollup_dates(agent_id)?.into_iter().collect();
        self.db.visit_event_times(agent_id, |ts| {
            dates.insert(local_date(&ts, tz));
        })?;
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ConversationStarted, LeadCaptured, MessageReceived};
    use crate::models::{AgentChanges, DailyAnalytics, DateRange, EventKind};
    use crate::service::test_support::{agent_in, temp_desk, tenant};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn all_time() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2100, 1, 1).unwrap(),
        )
        .unwrap()
    }

    /// Rollups and cached counters for tenant "t1"
    fn snapshot(desk: &BotDesk) -> (Vec<DailyAnalytics>, Vec<(i64, i64, i64)>) {
        let t = tenant("t1");
        let rows = desk.get_analytics_range(&t, None, all_time()).unwrap();
        let counters = desk
            .list_agents(&t)
            .unwrap()
            .iter()
            .map(|a| (a.total_conversations, a.total_messages, a.total_leads))
            .collect();
        (rows, counters)
    }

    /// Three days of traffic for two agents in different zones
    fn seed(desk: &BotDesk) -> (AgentId, AgentId) {
        let a = agent_in(desk, "t1", "Europe/Moscow");
        let b = agent_in(desk, "t1", "America/Los_Angeles");
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 9, 20, 0, 0).unwrap();

        for (i, agent) in [a, b, a, b, a].into_iter().enumerate() {
            let at = base + Duration::hours(i as i64 * 13);
            let conv = desk
                .ingest_conversation_started(ConversationStarted {
                    agent_id: agent,
                    user_id: format!("user-{}", i),
                    user_name: None,
                    at,
                })
                .unwrap();
            for m in 0..3 {
                desk.ingest_message_received(MessageReceived {
                    conversation_id: conv,
                    role: (if m % 2 == 0 { "user" } else { "bot" }).to_string(),
                    content: format!("message {}", m),
                    at: at + Duration::hours(m * 2),
                })
                .unwrap();
            }
            if i % 2 == 0 {
                desk.ingest_lead_captured(LeadCaptured {
                    conversation_id: conv,
                    email: Some(format!("user{}@example.com", i)),
                    phone: None,
                    at: at + Duration::hours(5),
                })
                .unwrap();
            }
        }
        (a, b)
    }

    #[test]
    fn test_recompute_matches_incremental_and_is_idempotent() {
        let (_dir, desk) = temp_desk();
        seed(&desk);
        let incremental = snapshot(&desk);
        let cancel = CancellationToken::new();

        let first = desk.recompute_analytics(&cancel).unwrap();
        assert_eq!(first.outcome, RecomputeOutcome::Completed);
        assert!(!first.resumed);
        assert_eq!(first.agents_completed, 2);
        assert_eq!(first.buckets_removed, 0);
        let once = snapshot(&desk);
        assert_eq!(once, incremental);

        desk.recompute_analytics(&cancel).unwrap();
        assert_eq!(snapshot(&desk), once);
    }

    #[test]
    fn test_recompute_repairs_drift() {
        let (_dir, desk) = temp_desk();
        let (a, _) = seed(&desk);
        let expected = snapshot(&desk);
        let t = tenant("t1");

        // Stray increments and a bogus bucket with no backing events
        desk.record_event(&t, a, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), EventKind::Message)
            .unwrap();
        desk.record_event(&t, a, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), EventKind::Lead)
            .unwrap();
        assert_ne!(snapshot(&desk), expected);

        let report = desk.recompute_analytics(&CancellationToken::new()).unwrap();
        assert_eq!(report.buckets_removed, 1);
        assert_eq!(snapshot(&desk), expected);
    }

    #[test]
    fn test_recompute_follows_time_zone_change() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let agent = agent_in(&desk, "t1", "UTC");
        desk.ingest_conversation_started(ConversationStarted {
            agent_id: agent,
            user_id: "late".to_string(),
            user_name: None,
            at: Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap(),
        })
        .unwrap();

        desk.update_agent(
            &t,
            agent,
            AgentChanges {
                timezone: Some("Europe/Berlin".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        desk.recompute_analytics(&CancellationToken::new()).unwrap();

        let rows = desk.get_analytics_range(&t, Some(agent), all_time()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_cancelled_before_start_changes_nothing() {
        let (_dir, desk) = temp_desk();
        seed(&desk);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = desk.recompute_analytics(&cancel).unwrap();
        assert_eq!(report.outcome, RecomputeOutcome::Interrupted);
        assert_eq!(report.buckets_written, 0);
        assert_eq!(desk.db.load_checkpoint().unwrap(), None);
    }

    #[test]
    fn test_interrupted_run_resumes_from_checkpoint() {
        let (_dir, desk) = temp_desk();
        let (a, _) = seed(&desk);
        let expected = snapshot(&desk);

        // Corrupt every bucket so both runs have real work to do
        {
            let conn = desk.db.conn().unwrap();
            conn.execute("UPDATE daily_analytics SET messages_sent = messages_sent + 7", [])
                .unwrap();
            conn.execute("UPDATE agents SET total_messages = 0", []).unwrap();
        }

        let cancel = CancellationToken::new();
        let mut seen = 0;
        let first = desk
            .recompute_with(&cancel, |_, _| {
                seen += 1;
                if seen == 2 {
                    cancel.cancel();
                }
            })
            .unwrap();
        assert_eq!(first.outcome, RecomputeOutcome::Interrupted);
        assert_eq!(first.buckets_written, 2);

        let checkpoint = desk.db.load_checkpoint().unwrap().unwrap();
        assert_eq!(checkpoint.agent_id, a);
        assert!(!checkpoint.agent_complete);

        let mut visited = Vec::new();
        let second = desk
            .recompute_with(&CancellationToken::new(), |agent, date| visited.push((agent, date)))
            .unwrap();
        assert_eq!(second.outcome, RecomputeOutcome::Completed);
        assert!(second.resumed);
        assert!(
            visited
                .iter()
                .all(|(agent, date)| *agent != a || Some(*date) > checkpoint.last_date)
        );
        assert_eq!(snapshot(&desk), expected);
        assert_eq!(desk.db.load_checkpoint().unwrap(), None);
    }
}
