//! Agent lifecycle: creation, edits, deletion and status transitions.

use chrono_tz::Tz;

use super::BotDesk;
use crate::db::AgentUpdate;
use crate::error::{CoreError, CoreResult};
use crate::models::{Agent, AgentChanges, AgentId, AgentStatus, NewAgent, Platform, StatusAction};
use crate::tenancy::TenantId;

const DEFAULT_TIMEZONE: &str = "UTC";

/// Canonical IANA name for `name`, or `InvalidTimeZone`
fn validate_zone(name: &str) -> CoreResult<String> {
    let name = name.trim();
    name.parse::<Tz>()
        .map(|tz| tz.name().to_string())
        .map_err(|_| CoreError::InvalidTimeZone(name.to_string()))
}

fn validate_name(name: &str) -> CoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::InvalidName);
    }
    Ok(name)
}

impl BotDesk {
    /// Create an agent in status `inactive` with zeroed counters
    pub fn create_agent(&self, tenant: &TenantId, new: NewAgent) -> CoreResult<AgentId> {
        let name = validate_name(&new.name)?;
        let platform = Platform::parse(&new.platform)?;
        let timezone = match new.timezone.as_deref().filter(|tz| !tz.trim().is_empty()) {
            Some(tz) => validate_zone(tz)?,
            None => DEFAULT_TIMEZONE.to_string(),
        };

        let id = self.db.insert_agent(
            tenant,
            name,
            platform,
            new.bot_token.as_deref().unwrap_or(""),
            new.description.trim(),
            &timezone,
        )?;

        log::info!("[AGENTS] Created agent {} ({}) for tenant {}", id, platform, tenant);
        Ok(id)
    }

    pub fn get_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<Agent> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        self.db.get_agent(&agent)
    }

    /// Agents of the tenant, newest first
    pub fn list_agents(&self, tenant: &TenantId) -> CoreResult<Vec<Agent>> {
        self.db.list_agents(tenant)
    }

    pub fn update_agent(&self, tenant: &TenantId, agent_id: AgentId, changes: AgentChanges) -> CoreResult<Agent> {
        let agent = self.db.guard_agent(tenant, agent_id)?;

        let name = changes.name.as_deref().map(validate_name).transpose()?;
        let timezone = changes.timezone.as_deref().map(validate_zone).transpose()?;

        let updated = self.db.update_agent(
            &agent,
            &AgentUpdate {
                name,
                description: changes.description.as_deref().map(str::trim),
                bot_token: changes.bot_token.as_deref(),
                timezone: timezone.as_deref(),
            },
        )?;

        if timezone.is_some_and(|tz| tz != agent.timezone().name()) {
            log::warn!(
                "[AGENTS] Agent {} moved to time zone {}; existing rollups keep the old day boundaries until the next recompute",
                agent_id,
                updated.timezone
            );
        }
        Ok(updated)
    }

    /// Delete an agent with all of its conversations, documents and rollups.
    /// Returns the deleted agent's name.
    pub fn delete_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<String> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        let name = self.db.delete_agent(&agent)?;
        log::info!("[AGENTS] Deleted agent {} for tenant {}", agent_id, tenant);
        Ok(name)
    }

    /// inactive/paused -> active, active -> inactive
    pub fn toggle_agent_status(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<AgentStatus> {
        self.change_status(tenant, agent_id, StatusAction::Toggle)
    }

    pub fn activate_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<AgentStatus> {
        self.change_status(tenant, agent_id, StatusAction::Activate)
    }

    pub fn pause_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<AgentStatus> {
        self.change_status(tenant, agent_id, StatusAction::Pause)
    }

    pub fn resume_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<AgentStatus> {
        self.change_status(tenant, agent_id, StatusAction::Resume)
    }

    pub fn deactivate_agent(&self, tenant: &TenantId, agent_id: AgentId) -> CoreResult<AgentStatus> {
        self.change_status(tenant, agent_id, StatusAction::Deactivate)
    }

    /// Apply `action` against the stored status with compare-and-set,
    /// re-reading whenever a concurrent change got there first.
    pub fn change_status(
        &self,
        tenant: &TenantId,
        agent_id: AgentId,
        action: StatusAction,
    ) -> CoreResult<AgentStatus> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        loop {
            let current = self.db.get_agent_status(&agent)?;
            let next = current.apply(action)?;
            if self.db.swap_agent_status(&agent, current, next)? {
                log::info!("[AGENTS] Agent {} status {} -> {}", agent_id, current, next);
                return Ok(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{agent_in, temp_desk, tenant};

    #[test]
    fn test_create_validates_input() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");

        let blank = NewAgent {
            name: "   ".to_string(),
            platform: "telegram".to_string(),
            ..Default::default()
        };
        assert!(matches!(desk.create_agent(&t, blank), Err(CoreError::InvalidName)));

        let slack = NewAgent {
            name: "Bot".to_string(),
            platform: "slack".to_string(),
            ..Default::default()
        };
        assert!(matches!(desk.create_agent(&t, slack), Err(CoreError::InvalidPlatform(_))));

        let bad_zone = NewAgent {
            name: "Bot".to_string(),
            platform: "VK".to_string(),
            timezone: Some("Mars/Olympus".to_string()),
            ..Default::default()
        };
        assert!(matches!(desk.create_agent(&t, bad_zone), Err(CoreError::InvalidTimeZone(_))));
    }

    #[test]
    fn test_create_defaults() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = desk
            .create_agent(
                &t,
                NewAgent {
                    name: "  Sales  ".to_string(),
                    platform: "Instagram".to_string(),
                    bot_token: Some("123:abc".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let agent = desk.get_agent(&t, id).unwrap();
        assert_eq!(agent.name, "Sales");
        assert_eq!(agent.platform, Platform::Instagram);
        assert_eq!(agent.status, AgentStatus::Inactive);
        assert_eq!(agent.timezone, "UTC");
        assert_eq!(agent.label(), "Sales (instagram)");
        assert_eq!(agent.conversion_rate().to_string(), "0.00");
    }

    #[test]
    fn test_toggle_scenario() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = agent_in(&desk, "t1", "UTC");

        assert_eq!(desk.toggle_agent_status(&t, id).unwrap(), AgentStatus::Active);
        assert_eq!(desk.toggle_agent_status(&t, id).unwrap(), AgentStatus::Inactive);
        assert_eq!(desk.get_agent(&t, id).unwrap().status, AgentStatus::Inactive);
    }

    #[test]
    fn test_explicit_transitions() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = agent_in(&desk, "t1", "UTC");

        assert!(matches!(
            desk.pause_agent(&t, id),
            Err(CoreError::InvalidTransition { from: "inactive", to: "paused" })
        ));
        assert_eq!(desk.activate_agent(&t, id).unwrap(), AgentStatus::Active);
        assert_eq!(desk.pause_agent(&t, id).unwrap(), AgentStatus::Paused);
        assert_eq!(desk.resume_agent(&t, id).unwrap(), AgentStatus::Active);
        assert_eq!(desk.pause_agent(&t, id).unwrap(), AgentStatus::Paused);
        assert_eq!(desk.deactivate_agent(&t, id).unwrap(), AgentStatus::Inactive);
    }

    #[test]
    fn test_concurrent_toggles_all_apply() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = agent_in(&desk, "t1", "UTC");

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| desk.toggle_agent_status(&t, id).unwrap());
            }
        });

        // An even number of toggles lands back where it started
        assert_eq!(desk.get_agent(&t, id).unwrap().status, AgentStatus::Inactive);
    }

    #[test]
    fn test_cross_tenant_is_not_found() {
        let (_dir, desk) = temp_desk();
        let id = agent_in(&desk, "t1", "UTC");
        let other = tenant("t2");

        assert!(matches!(desk.get_agent(&other, id), Err(CoreError::NotFound)));
        assert!(matches!(desk.toggle_agent_status(&other, id), Err(CoreError::NotFound)));
        assert!(matches!(desk.delete_agent(&other, id), Err(CoreError::NotFound)));
        assert!(matches!(
            desk.update_agent(&other, id, AgentChanges::default()),
            Err(CoreError::NotFound)
        ));
        assert!(desk.list_agents(&other).unwrap().is_empty());
    }

    #[test]
    fn test_update_validates_and_applies() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = agent_in(&desk, "t1", "UTC");

        let bad = AgentChanges {
            timezone: Some("Nowhere/City".to_string()),
            ..Default::default()
        };
        assert!(matches!(desk.update_agent(&t, id, bad), Err(CoreError::InvalidTimeZone(_))));

        let blank = AgentChanges {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(matches!(desk.update_agent(&t, id, blank), Err(CoreError::InvalidName)));

        let agent = desk
            .update_agent(
                &t,
                id,
                AgentChanges {
                    name: Some("Helpdesk".to_string()),
                    timezone: Some("Europe/Moscow".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(agent.name, "Helpdesk");
        assert_eq!(agent.timezone, "Europe/Moscow");
    }

    #[test]
    fn test_delete_returns_name() {
        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let id = agent_in(&desk, "t1", "UTC");

        assert_eq!(desk.delete_agent(&t, id).unwrap(), "Support Bot");
        assert!(matches!(desk.get_agent(&t, id), Err(CoreError::NotFound)));
    }

    #[test]
    fn test_delete_removes_owned_records() {
        use crate::ingest::{ConversationStarted, LeadCaptured, MessageReceived};
        use crate::models::DateRange;
        use chrono::{NaiveDate, TimeZone, Utc};
        use tokio_util::sync::CancellationToken;

        let (_dir, desk) = temp_desk();
        let t = tenant("t1");
        let doomed = agent_in(&desk, "t1", "UTC");
        let kept = agent_in(&desk, "t1", "UTC");
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();

        for agent_id in [doomed, kept] {
            let conv = desk
                .ingest_conversation_started(ConversationStarted {
                    agent_id,
                    user_id: "u-1".to_string(),
                    user_name: None,
                    at,
                })
                .unwrap();
            desk.ingest_message_received(MessageReceived {
                conversation_id: conv,
                role: "user".to_string(),
                content: "hello".to_string(),
                at,
            })
            .unwrap();
            desk.ingest_lead_captured(LeadCaptured {
                conversation_id: conv,
                email: Some("a@b.c".to_string()),
                phone: None,
                at,
            })
            .unwrap();
        }

        desk.delete_agent(&t, doomed).unwrap();

        let conn = desk.db.conn().unwrap();
        let count = |sql: &str| -> i64 { conn.query_row(sql, [doomed], |row| row.get(0)).unwrap() };
        assert_eq!(count("SELECT COUNT(*) FROM conversations WHERE agent_id = ?1"), 0);
        assert_eq!(
            count(
                "SELECT COUNT(*) FROM messages m JOIN conversations c ON c.id = m.conversation_id
                 WHERE c.agent_id = ?1"
            ),
            0
        );
        let messages: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0)).unwrap();
        assert_eq!(messages, 1);
        assert_eq!(count("SELECT COUNT(*) FROM daily_analytics WHERE agent_id = ?1"), 0);
        drop(conn);

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap();
        let before: Vec<_> = desk.get_analytics_range(&t, None, range).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].agent_id, kept);

        desk.recompute_analytics(&CancellationToken::new()).unwrap();
        let after = desk.get_analytics_range(&t, None, range).unwrap();
        assert_eq!(after, before);
        assert_eq!(desk.list_agents(&t).unwrap().len(), 1);
    }
}
