//! Event — the central record of the platform.
//!
//! Every business occurrence lands here: webhook deliveries, call
//! lifecycle callbacks, orchestration triggers. The event log is
//! append-mostly; the core updates processing bookkeeping but never
//! deletes. Deduplication of external deliveries happens through the
//! unique `idempotency_key`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ─── Classification ──────────────────────────────────────────────────────────

/// Closed set of business event types. External strings are parsed into
/// this enum at the ingestion boundary; unknown values are rejected there,
/// so everything past the boundary can match exhaustively.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
  // Lead events
  LeadCreated,
  LeadUpdated,
  LeadStageChanged,
  LeadTagAdded,
  LeadTagRemoved,
  // Message events
  MessageReceived,
  MessageSent,
  MessageDelivered,
  MessageRead,
  MessageFailed,
  // Call events
  CallInitiated,
  CallAnswered,
  CallCompleted,
  CallFailed,
  // Appointment events
  AppointmentBooked,
  AppointmentConfirmed,
  AppointmentReminded,
  AppointmentCompleted,
  AppointmentNoShow,
  AppointmentCancelled,
  // Orchestration events
  HotLeadDetected,
  HandoffTriggered,
  ReactivationTriggered,
  // System events
  JobStarted,
  JobCompleted,
  JobFailed,
  WebhookReceived,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
  #[default]
  Pending,
  Processing,
  Completed,
  Failed,
  Skipped,
}

// ─── Triggered actions ───────────────────────────────────────────────────────

/// Closed set of actions an event can carry for the orchestrator. Each is
/// consumed at most once, through an exhaustive dispatch table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
  InitiateHotLeadSequence,
  TriggerHandoff,
  ScheduleAppointmentReminders,
  ProcessInboundMessage,
  ProcessAppointmentBooking,
  ScheduleCallback,
  UpdateLeadClassification,
}

/// A deferred unit of work attached to an event during ingestion or
/// handling, executed exactly once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAction {
  pub action:   ActionType,
  /// Free-form string data (entity ids, target classification, ...).
  #[serde(default)]
  pub data:     BTreeMap<String, String>,
  pub added_at: DateTime<Utc>,
}

impl TriggeredAction {
  pub fn new(action: ActionType) -> Self {
    Self {
      action,
      data: BTreeMap::new(),
      added_at: Utc::now(),
    }
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.data.insert(key.into(), value.into());
    self
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id:        Uuid,
  pub event_type:      EventType,
  pub status:          EventStatus,
  /// Origin system name ("crm", "voice", "orchestrator", ...).
  pub source:          String,
  /// Event-specific facts, opaque to the core.
  pub payload:         Value,
  pub metadata:        Map<String, Value>,
  // Loose references for querying, not enforced joins.
  pub lead_id:         Option<Uuid>,
  pub appointment_id:  Option<Uuid>,
  pub call_id:         Option<Uuid>,
  pub message_id:      Option<Uuid>,
  /// Shared by this event and every job it spawns.
  pub correlation_id:  Uuid,
  pub triggers_actions: Vec<TriggeredAction>,
  /// Deduplication key for at-most-once processing; unique when present.
  pub idempotency_key: Option<String>,
  /// Business timestamp — may differ from ingestion time.
  pub occurred_at:     DateTime<Utc>,
  pub created_at:      DateTime<Utc>,
  pub processed_at:    Option<DateTime<Utc>>,
  pub failed_at:       Option<DateTime<Utc>>,
  pub retry_count:     i64,
  pub error_message:   Option<String>,
}

impl Event {
  /// Build a pending event as the ingestion pipelines do: source and
  /// correlation id minted per ingestion call, occurred_at from the
  /// payload (or now).
  pub fn from_webhook(
    event_type: EventType,
    source: impl Into<String>,
    payload: Value,
    correlation_id: Uuid,
    idempotency_key: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      event_id: Uuid::new_v4(),
      event_type,
      status: EventStatus::Pending,
      source: source.into(),
      payload,
      metadata: Map::new(),
      lead_id: None,
      appointment_id: None,
      call_id: None,
      message_id: None,
      correlation_id,
      triggers_actions: Vec::new(),
      idempotency_key,
      occurred_at: occurred_at.unwrap_or_else(Utc::now),
      created_at: Utc::now(),
      processed_at: None,
      failed_at: None,
      retry_count: 0,
      error_message: None,
    }
  }

  /// Build an internally-generated event tied to a lead (no idempotency
  /// key — internal occurrences are minted once).
  pub fn for_lead(
    event_type: EventType,
    lead_id: Uuid,
    payload: Value,
    source: impl Into<String>,
    correlation_id: Uuid,
  ) -> Self {
    let mut event = Self::from_webhook(event_type, source, payload, correlation_id, None, None);
    event.lead_id = Some(lead_id);
    event
  }

  pub fn mark_processing(&mut self) {
    self.status = EventStatus::Processing;
  }

  pub fn mark_completed(&mut self) {
    self.status = EventStatus::Completed;
    self.processed_at = Some(Utc::now());
  }

  pub fn mark_failed(&mut self, error_message: impl Into<String>) {
    self.status = EventStatus::Failed;
    self.failed_at = Some(Utc::now());
    self.error_message = Some(error_message.into());
    self.retry_count += 1;
  }

  /// Explicit no-op; the reason goes into metadata for later inspection.
  pub fn mark_skipped(&mut self, reason: Option<&str>) {
    self.status = EventStatus::Skipped;
    self.processed_at = Some(Utc::now());
    if let Some(reason) = reason {
      self
        .metadata
        .insert("skip_reason".to_owned(), Value::String(reason.to_owned()));
    }
  }

  /// Retry predicate. Nothing in the core calls this automatically;
  /// requeueing failed events is a configurable policy.
  pub fn should_retry(&self, max_retries: i64) -> bool {
    self.status == EventStatus::Failed && self.retry_count < max_retries
  }

  pub fn add_triggered_action(&mut self, action: TriggeredAction) {
    self.triggers_actions.push(action);
  }
}
