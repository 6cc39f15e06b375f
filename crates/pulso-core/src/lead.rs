//! Lead — the root aggregate of the sales funnel.
//!
//! Calls, messages, appointments, and events all reference a lead id but
//! are independently persisted; nothing cascades through the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Funnel position. Transitions are one-directional triggers for side
/// effects; the core logs each transition but does not enforce a total
/// order over them.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadStage {
  #[default]
  New,
  Contacted,
  Qualified,
  Booked,
  Confirmed,
  Showed,
  NoShow,
  Converted,
  Lost,
}

/// Acquisition channel the lead arrived through.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadSource {
  Organic,
  PaidAds,
  SocialMedia,
  Referral,
  Direct,
  #[default]
  Other,
}

/// Temperature classification driving orchestration urgency.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeadClassification {
  Hot,
  #[default]
  Warm,
  Cold,
}

// ─── Lead ────────────────────────────────────────────────────────────────────

/// A potential patient in the sales funnel, keyed locally by UUID and
/// externally by the CRM's own lead id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
  pub lead_id:           Uuid,
  /// Unique id in the upstream CRM; the resolution key for webhooks.
  pub crm_id:            String,
  pub first_name:        String,
  pub last_name:         Option<String>,
  pub email:             Option<String>,
  pub phone:             String,
  pub stage:             LeadStage,
  pub classification:    LeadClassification,
  pub source:            LeadSource,
  /// Ad-hoc signals ("handoff", "urgent", ...) the orchestrator inspects.
  pub tags:              Vec<String>,
  pub custom_fields:     Map<String, Value>,
  pub notes:             Option<String>,
  pub assigned_agent_id: Option<String>,
  pub is_active:         bool,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
  pub last_contacted_at: Option<DateTime<Utc>>,
  pub qualified_at:      Option<DateTime<Utc>>,
}

impl Lead {
  /// Build a fresh lead with funnel defaults (stage `new`, warm, active).
  pub fn create(crm_id: impl Into<String>, first_name: impl Into<String>, phone: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      lead_id:           Uuid::new_v4(),
      crm_id:            crm_id.into(),
      first_name:        first_name.into(),
      last_name:         None,
      email:             None,
      phone:             phone.into(),
      stage:             LeadStage::New,
      classification:    LeadClassification::Warm,
      source:            LeadSource::Other,
      tags:              Vec::new(),
      custom_fields:     Map::new(),
      notes:             None,
      assigned_agent_id: None,
      is_active:         true,
      created_at:        now,
      updated_at:        now,
      last_contacted_at: None,
      qualified_at:      None,
    }
  }

  pub fn full_name(&self) -> String {
    match &self.last_name {
      Some(last) => format!("{} {last}", self.first_name),
      None => self.first_name.clone(),
    }
  }

  /// Phone with all but the last four digits hidden, for log lines.
  pub fn masked_phone(&self) -> String {
    if self.phone.len() > 4 {
      format!("***{}", &self.phone[self.phone.len() - 4..])
    } else {
      "***".to_owned()
    }
  }

  /// Email with the local part hidden, for log lines.
  pub fn masked_email(&self) -> String {
    match self.email.as_deref().and_then(|e| e.split_once('@')) {
      Some((_, domain)) => format!("***@{domain}"),
      None => "***".to_owned(),
    }
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.iter().any(|t| t == tag)
  }

  /// Add `tag` if not already present. Returns `true` if it was added.
  pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
    let tag = tag.into();
    if self.has_tag(&tag) {
      return false;
    }
    self.tags.push(tag);
    true
  }

  pub fn remove_tag(&mut self, tag: &str) {
    self.tags.retain(|t| t != tag);
  }

  /// Move the lead to `new_stage`, stamping the milestone timestamps the
  /// first time the relevant stage is reached.
  pub fn update_stage(&mut self, new_stage: LeadStage) {
    let now = Utc::now();
    self.stage = new_stage;
    self.updated_at = now;

    match new_stage {
      LeadStage::Contacted if self.last_contacted_at.is_none() => {
        self.last_contacted_at = Some(now);
      }
      LeadStage::Qualified if self.qualified_at.is_none() => {
        self.qualified_at = Some(now);
      }
      _ => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_tag_is_idempotent() {
    let mut lead = Lead::create("crm-1", "Ana", "+5563999990000");
    assert!(lead.add_tag("urgent"));
    assert!(!lead.add_tag("urgent"));
    assert_eq!(lead.tags, vec!["urgent"]);
  }

  #[test]
  fn update_stage_stamps_milestones_once() {
    let mut lead = Lead::create("crm-1", "Ana", "+5563999990000");
    lead.update_stage(LeadStage::Contacted);
    let first = lead.last_contacted_at;
    assert!(first.is_some());

    lead.update_stage(LeadStage::Qualified);
    lead.update_stage(LeadStage::Contacted);
    assert_eq!(lead.last_contacted_at, first);
    assert!(lead.qualified_at.is_some());
  }

  #[test]
  fn masked_accessors_hide_pii() {
    let mut lead = Lead::create("crm-1", "Ana", "+5563999990000");
    lead.email = Some("ana@example.com".into());
    assert_eq!(lead.masked_phone(), "***0000");
    assert_eq!(lead.masked_email(), "***@example.com");
  }
}
