//! Event ingestion from the platform gateway.
//!
//! Every event is applied in one IMMEDIATE transaction: the raw record, the
//! matching daily rollup increment and the agent's cached counter either all
//! land or none do. Message appends and lead flips additionally queue on a
//! per-conversation lock so bursts for one conversation do not spin on
//! SQLite's busy handler.

use chrono::{DateTime, Datelike, Duration, SubsecRound, Utc};
use serde::Deserialize;

use crate::analytics::buckets::local_date;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{AgentId, ConversationId, EventKind, MessageId, MessageRole};
use crate::service::BotDesk;
use crate::tenancy::OwnedAgent;

/// A new conversation opened by an end user
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationStarted {
    pub agent_id: AgentId,
    /// Platform-side user id
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReceived {
    pub conversation_id: ConversationId,
    /// "user", "bot" or "system"
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadCaptured {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub at: DateTime<Utc>,
}

/// Wire form used by the gateway endpoint: `{"type": "message_received", ...}`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    ConversationStarted(ConversationStarted),
    MessageReceived(MessageReceived),
    LeadCaptured(LeadCaptured),
}

/// What an ingested event produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngestOutcome {
    Conversation { conversation_id: ConversationId },
    Message { message_id: MessageId, created_at: DateTime<Utc> },
    Lead { newly_captured: bool },
}

/// One logical tick; the resolution of stored timestamps
fn tick() -> Duration {
    Duration::microseconds(1)
}

/// Drop precision the store cannot represent so comparisons match storage.
/// Instants outside years 0..=9999 have no fixed-width text form and are
/// rejected.
fn to_tick(at: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    storable(at.trunc_subsecs(6))
}

fn storable(at: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    if (0..=9999).contains(&at.year()) {
        Ok(at)
    } else {
        Err(CoreError::InvalidTimestamp)
    }
}

impl BotDesk {
    pub fn ingest_event(&self, event: GatewayEvent) -> CoreResult<IngestOutcome> {
        match event {
            GatewayEvent::ConversationStarted(ev) => self
                .ingest_conversation_started(ev)
                .map(|conversation_id| IngestOutcome::Conversation { conversation_id }),
            GatewayEvent::MessageReceived(ev) => self
                .ingest_message_received(ev)
                .map(|(message_id, created_at)| IngestOutcome::Message { message_id, created_at }),
            GatewayEvent::LeadCaptured(ev) => self
                .ingest_lead_captured(ev)
                .map(|newly_captured| IngestOutcome::Lead { newly_captured }),
        }
    }

    /// Open a conversation; `UnknownAgent` if the agent does not exist
    pub fn ingest_conversation_started(&self, event: ConversationStarted) -> CoreResult<ConversationId> {
        let agent = self.db.resolve_agent_for_gateway(event.agent_id)?;
        self.start_conversation(&agent, &event)
    }

    fn start_conversation(&self, agent: &OwnedAgent, event: &ConversationStarted) -> CoreResult<ConversationId> {
        let at = to_tick(event.at)?;
        let date = local_date(&at, agent.timezone());
        let user_name = event.user_name.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let id = self.db.write_tx(|tx| {
            // The agent may have been deleted since it was resolved
            if !Database::agent_present(tx, agent.id())? {
                return Err(CoreError::UnknownAgent);
            }
            let id = Database::insert_conversation(tx, agent.id(), event.user_id.trim(), user_name, &at)?;
            Database::bump_rollup(tx, agent.id(), date, EventKind::Conversation)?;
            Database::bump_agent_counter(tx, agent.id(), EventKind::Conversation)?;
            Ok(id)
        })?;

        log::debug!("[INGEST] Conversation {} started on agent {} ({})", id, agent.id(), date);
        Ok(id)
    }

    /// Append a message. Its timestamp is moved to one tick after the previous
    /// message when the event arrives at or before it, so timestamps stay
    /// strictly increasing per conversation. Returns the id and the stored
    /// timestamp.
    pub fn ingest_message_received(&self, event: MessageReceived) -> CoreResult<(MessageId, DateTime<Utc>)> {
        let conversation = self.db.resolve_conversation_for_gateway(event.conversation_id)?;
        let role = MessageRole::parse(&event.role)?;
        let agent = conversation.agent();
        let at = to_tick(event.at)?;

        let (id, created_at) = self.conversation_locks.with(conversation.id(), || {
            self.db.write_tx(|tx| {
                let clock = Database::conversation_clock(tx, conversation.id())?;
                let floor = if clock.message_count > 0 {
                    clock.last_message_at + tick()
                } else {
                    clock.started_at
                };
                let created_at = storable(at.max(floor))?;

                let id = Database::insert_message(tx, conversation.id(), role, &event.content, &created_at)?;
                Database::advance_conversation(tx, conversation.id(), &created_at)?;

                let date = local_date(&created_at, agent.timezone());
                Database::bump_rollup(tx, agent.id(), date, EventKind::Message)?;
                Database::bump_agent_counter(tx, agent.id(), EventKind::Message)?;
                Ok((id, created_at))
            })
        })?;

        if created_at != at {
            log::debug!(
                "[INGEST] Message {} in conversation {} clamped from {} to {}",
                id,
                conversation.id(),
                at,
                created_at
            );
        }
        Ok((id, created_at))
    }

    /// Flag the conversation as a lead and merge contact details. Only the
    /// first capture counts; later ones just enrich email/phone. Returns
    /// whether this call flipped the flag.
    pub fn ingest_lead_captured(&self, event: LeadCaptured) -> CoreResult<bool> {
        let conversation = self.db.resolve_conversation_for_gateway(event.conversation_id)?;
        let agent = conversation.agent();
        let at = to_tick(event.at)?;

        let newly_captured = self.conversation_locks.with(conversation.id(), || {
            self.db.write_tx(|tx| {
                Database::conversation_clock(tx, conversation.id())?;
                let newly = Database::mark_lead(tx, conversation.id(), &at)?;
                Database::merge_lead_contacts(tx, conversation.id(), event.email.as_deref(), event.phone.as_deref())?;
                if newly {
                    let date = local_date(&at, agent.timezone());
                    Database::bump_rollup(tx, agent.id(), date, EventKind::Lead)?;
                    Database::bump_agent_counter(tx, agent.id(), EventKind::Lead)?;
                }
                Ok(newly)
            })
        })?;

        if newly_captured {
            log::info!("[INGEST] Lead captured in conversation {} (agent {})", conversation.id(), agent.id());
        }
        Ok(newly_captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::models::{DateRange, PageWindow};
    use crate::service::test_support::{agent_in, temp_desk, tenant};
    use chrono::{NaiveDate, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn started(desk: &BotDesk, agent_id: AgentId, when: DateTime<Utc>) -> ConversationId {
        desk.ingest_conversation_started(ConversationStarted {
            agent_id,
            user_id: "u-1".to_string(),
            user_name: None,
            at: when,
        })
        .unwrap()
    }

    fn message(conversation_id: ConversationId, when: DateTime<Utc>) -> MessageReceived {
        MessageReceived {
            conversation_id,
            role: "user".to_string(),
            content: "hi".to_string(),
            at: when,
        }
    }

    #[test]
    fn test_unknown_references() {
        let (_dir, desk) = temp_desk();
        let err = desk
            .ingest_conversation_started(ConversationStarted {
                agent_id: 42,
                user_id: "u".to_string(),
                user_name: None,
                at: at(9, 0),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownAgent));

        assert!(matches!(
            desk.ingest_message_received(message(42, at(9, 0))),
            Err(CoreError::UnknownConversation)
        ));
        assert!(matches!(
            desk.ingest_lead_captured(LeadCaptured {
                conversation_id: 42,
                email: None,
                phone: None,
                at: at(9, 0),
            }),
            Err(CoreError::UnknownConversation)
        ));
    }

    #[test]
    fn test_conversation_rejected_when_agent_deleted_after_resolve() {
        let (_dir, desk) = temp_desk();
        let agent = agent_in(&desk, "t1", "UTC");
        let resolved = desk.db.resolve_agent_for_gateway(agent).unwrap();
        desk.delete_agent(&tenant("t1"), agent).unwrap();

        let event = ConversationStarted {
            agent_id: agent,
            user_id: "u-1".to_string(),
            user_name: None,
            at: at(9, 0),
        };
        assert!(matches!(
            desk.start_conversation(&resolved, &event),
            Err(CoreError::UnknownAgent)
        ));
    }

    #[test]
    fn test_timestamps_beyond_year_9999_rejected() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let agent = agent_in(&desk, "t1", "UTC");
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();

        let err = desk
            .ingest_conversation_started(ConversationStarted {
                agent_id: agent,
                user_id: "u-1".to_string(),
                user_name: None,
                at: far,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimestamp));
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);

        let conv = started(&desk, agent, at(9, 0));
        assert!(matches!(
            desk.ingest_message_received(message(conv, far)),
            Err(CoreError::InvalidTimestamp)
        ));

        // The last representable tick is accepted; clamping past it is not
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap() + Duration::microseconds(999_999);
        let (_, created) = desk.ingest_message_received(message(conv, last)).unwrap();
        assert_eq!(created, last);
        assert!(matches!(
            desk.ingest_message_received(message(conv, last)),
            Err(CoreError::InvalidTimestamp)
        ));

        let conversations = desk
            .list_agent_conversations(&t, None, &Default::default(), PageWindow::new(0, 50))
            .unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].last_message_at, last);
        assert_eq!(desk.get_conversation_messages(&t, conv).unwrap().len(), 1);
        assert_eq!(desk.get_agent(&t, agent).unwrap().total_messages, 1);
    }

    #[test]
    fn test_invalid_role_writes_nothing() {
        let (_dir, desk) = temp_desk();
        let agent = agent_in(&desk, "t1", "UTC");
        let conv = started(&desk, agent, at(9, 0));

        let mut ev = message(conv, at(9, 1));
        ev.role = "admin".to_string();
        assert!(matches!(desk.ingest_message_received(ev), Err(CoreError::InvalidRole(_))));
        assert_eq!(desk.get_agent(&tenant("t1"), agent).unwrap().total_messages, 0);
    }

    #[test]
    fn test_same_instant_messages_get_consecutive_ticks() {
        let (_dir, desk) = temp_desk();
        let agent = agent_in(&desk, "t1", "UTC");
        let conv = started(&desk, agent, at(9, 0));
        let t0 = at(9, 5);

        let (_, first) = desk.ingest_message_received(message(conv, t0)).unwrap();
        let (_, second) = desk.ingest_message_received(message(conv, t0)).unwrap();
        assert_eq!(first, t0);
        assert_eq!(second, t0 + Duration::microseconds(1));

        let stored = desk.get_conversation(&tenant("t1"), conv).unwrap();
        assert_eq!(stored.last_message_at, second);
        assert_eq!(stored.message_count, 2);
    }

    #[test]
    fn test_first_message_may_share_start_instant() {
        let (_dir, desk) = temp_desk();
        let agent = agent_in(&desk, "t1", "UTC");
        let conv = started(&desk, agent, at(9, 0));

        let (_, created) = desk.ingest_message_received(message(conv, at(9, 0))).unwrap();
        assert_eq!(created, at(9, 0));

        // Earlier than the start: pulled up to started_at
        let conv2 = started(&desk, agent, at(10, 0));
        let (_, created) = desk.ingest_message_received(message(conv2, at(8, 0))).unwrap();
        assert_eq!(created, at(10, 0));
    }

    #[test]
    fn test_concurrent_burst_stays_strictly_ordered() {
        let (_dir, desk) = temp_desk();
        let agent = agent_in(&desk, "t1", "UTC");
        let conv = started(&desk, agent, at(9, 0));

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10 {
                        desk.ingest_message_received(message(conv, at(9, 1))).unwrap();
                    }
                });
            }
        });

        let t = tenant("t1");
        let messages = desk.get_conversation_messages(&t, conv).unwrap();
        assert_eq!(messages.len(), 80);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let stored = desk.get_conversation(&t, conv).unwrap();
        assert_eq!(stored.last_message_at, messages[79].created_at);
        assert_eq!(desk.get_agent(&t, agent).unwrap().total_messages, 80);
    }

    #[test]
    fn test_lead_flips_once_and_keeps_contacts() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let agent = agent_in(&desk, "t1", "UTC");
        let conv = started(&desk, agent, at(9, 0));

        let first = desk
            .ingest_lead_captured(LeadCaptured {
                conversation_id: conv,
                email: Some("a@x.io".to_string()),
                phone: None,
                at: at(9, 10),
            })
            .unwrap();
        assert!(first);

        let again = desk
            .ingest_lead_captured(LeadCaptured {
                conversation_id: conv,
                email: Some(String::new()),
                phone: Some("+7 900 000-00-00".to_string()),
                at: at(9, 20),
            })
            .unwrap();
        assert!(!again);

        let stored = desk.get_conversation(&t, conv).unwrap();
        assert!(stored.is_lead);
        assert_eq!(stored.lead_email, "a@x.io");
        assert_eq!(stored.lead_phone, "+7 900 000-00-00");
        assert_eq!(stored.lead_captured_at, Some(at(9, 10)));

        let owner = desk.get_agent(&t, agent).unwrap();
        assert_eq!(owner.total_leads, 1);
        assert_eq!(owner.conversion_rate().to_string(), "100.00");

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let totals = desk
            .get_analytics_totals(&t, Some(agent), DateRange::new(day, day).unwrap())
            .unwrap();
        assert_eq!(totals.leads_captured, 1);
    }

    #[test]
    fn test_conversations_counted_in_agent_local_day() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let agent = agent_in(&desk, "t1", "Asia/Tokyo");

        // 20:00 UTC is already the next day in Tokyo
        started(&desk, agent, at(20, 0));
        started(&desk, agent, at(1, 0));

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        )
        .unwrap();
        let rows = desk.get_analytics_range(&t, Some(agent), range).unwrap();
        let days: Vec<(u32, i64)> = rows
            .iter()
            .map(|r| (chrono::Datelike::day(&r.date), r.new_conversations))
            .collect();
        assert_eq!(days, vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn test_rollup_sum_matches_conversation_count() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let agent = agent_in(&desk, "t1", "America/New_York");

        for day in 1..=20 {
            let when = Utc.with_ymd_and_hms(2024, 3, day, (day * 5) % 24, 0, 0).unwrap();
            started(&desk, agent, when);
        }

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        )
        .unwrap();
        let totals = desk.get_analytics_totals(&t, Some(agent), range).unwrap();
        let conversations = desk
            .list_agent_conversations(&t, Some(agent), &Default::default(), PageWindow::new(0, 200))
            .unwrap();
        assert_eq!(totals.new_conversations, conversations.len() as i64);
        assert_eq!(desk.get_agent(&t, agent).unwrap().total_conversations, 20);
    }

    #[test]
    fn test_gateway_event_wire_format() {
        let raw = r#"{"type":"lead_captured","conversation_id":3,"email":"a@b.c","at":"2024-06-01T09:00:00Z"}"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        match event {
            GatewayEvent::LeadCaptured(lead) => {
                assert_eq!(lead.conversation_id, 3);
                assert_eq!(lead.email.as_deref(), Some("a@b.c"));
                assert!(lead.phone.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
