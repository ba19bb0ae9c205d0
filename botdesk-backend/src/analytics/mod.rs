//! Analytics aggregator: per-agent daily rollups and the queries over them.
//!
//! Rollup rows are kept current by ingestion. `record_event` is the bare
//! increment for callers that count events the store does not hold; the
//! recompute pass rebuilds every row from the raw tables.

pub mod buckets;
mod recompute;

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::analytics::storable_date;
use crate::models::{
    AgentId, AnalyticsTotals, ConversionRate, DailyAnalytics, DashboardSummary, DateRange, EventKind,
};
use crate::service::BotDesk;
use crate::tenancy::{AgentScope, TenantId};

impl BotDesk {
    /// Add one event of `kind` to the agent's bucket for `date`
    pub fn record_event(&self, tenant: &TenantId, agent_id: AgentId, date: NaiveDate, kind: EventKind) -> CoreResult<()> {
        let agent = self.db.guard_agent(tenant, agent_id)?;
        let date = storable_date(date)?;
        let conn = self.db.conn()?;
        Database::bump_rollup(&conn, agent.id(), date, kind)
    }

    /// Rollup rows in the inclusive range, ordered by date then agent.
    /// `agent_id = None` covers every agent of the tenant.
    pub fn get_analytics_range(
        &self,
        tenant: &TenantId,
        agent_id: Option<AgentId>,
        range: DateRange,
    ) -> CoreResult<Vec<DailyAnalytics>> {
        match agent_id {
            Some(id) => {
                let agent = self.db.guard_agent(tenant, id)?;
                self.db.rollup_range(AgentScope::Agent(&agent), range)
            }
            None => self.db.rollup_range(AgentScope::Tenant(tenant), range),
        }
    }

    pub fn get_analytics_totals(
        &self,
        tenant: &TenantId,
        agent_id: Option<AgentId>,
        range: DateRange,
    ) -> CoreResult<AnalyticsTotals> {
        match agent_id {
            Some(id) => {
                let agent = self.db.guard_agent(tenant, id)?;
                self.db.rollup_totals(AgentScope::Agent(&agent), range)
            }
            None => self.db.rollup_totals(AgentScope::Tenant(tenant), range),
        }
    }

    /// Bulk import of a rollup row. An existing (agent, date) row is a
    /// `Conflict`; imports never merge.
    pub fn import_analytics_row(&self, tenant: &TenantId, row: &DailyAnalytics) -> CoreResult<()> {
        let agent = self.db.guard_agent(tenant, row.agent_id)?;
        if row.new_conversations < 0 || row.messages_sent < 0 || row.leads_captured < 0 {
            return Err(CoreError::NegativeCounter);
        }
        storable_date(row.date)?;
        self.db.insert_rollup(&agent, row)?;
        log::info!("[ANALYTICS] Imported rollup for agent {} on {}", row.agent_id, row.date);
        Ok(())
    }

    /// Agent counts by status, cached totals and knowledge base size
    pub fn dashboard_summary(&self, tenant: &TenantId) -> CoreResult<DashboardSummary> {
        let mut summary = self.db.dashboard_counts(tenant)?;
        summary.conversion_rate =
            ConversionRate::from_counts(summary.total_leads, summary.total_conversations).to_string();
        summary.knowledge_documents = self.db.count_documents(tenant)?;
        Ok(summary)
    }
}
