//! The `Store` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `pulso-store-sqlite`).
//! Higher layers (ingestion, orchestrator, API) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  appointment::Appointment,
  call::Call,
  event::Event,
  lead::{Lead, LeadClassification, LeadStage},
  message::Message,
};

// ─── Event write outcome ─────────────────────────────────────────────────────

/// Result of persisting an event that carries an idempotency key.
///
/// Backends enforce key uniqueness with a storage-level constraint; a
/// violation means a concurrent delivery won the race, and the already
/// stored event is returned instead of an error. Any entity mutation in
/// the same write is rolled back with it.
#[derive(Debug, Clone)]
pub enum EventWrite {
  Inserted,
  Duplicate(Event),
}

impl EventWrite {
  pub fn is_duplicate(&self) -> bool {
    matches!(self, Self::Duplicate(_))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the Pulso entity store and event log.
///
/// Entity updates are either whole-record (used by ingestion, inside one
/// transaction with the event insert) or minimal single-field updates
/// (used by concurrent jobs, so that last-write-wins conflicts stay at
/// field granularity).
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait Store: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Leads ─────────────────────────────────────────────────────────────

  fn insert_lead(
    &self,
    lead: Lead,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_lead(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Resolve a lead by the CRM's external id.
  fn find_lead_by_crm_id(
    &self,
    crm_id: String,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Fallback resolution for voice callbacks that only carry a number.
  fn find_lead_by_phone(
    &self,
    phone: String,
  ) -> impl Future<Output = Result<Option<Lead>, Self::Error>> + Send + '_;

  /// Whole-record update; callers must have merged fields beforehand.
  fn update_lead(
    &self,
    lead: Lead,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // Minimal single-field updates, safe to run from concurrent jobs.

  fn set_lead_stage(
    &self,
    id: Uuid,
    stage: LeadStage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_lead_classification(
    &self,
    id: Uuid,
    classification: LeadClassification,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Add a tag if absent. Returns `true` if the tag was newly added.
  fn add_lead_tag(
    &self,
    id: Uuid,
    tag: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn set_lead_contacted(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  fn get_message(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  fn find_message_by_crm_id(
    &self,
    crm_message_id: String,
  ) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send + '_;

  // ── Calls ─────────────────────────────────────────────────────────────

  fn get_call(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Call>, Self::Error>> + Send + '_;

  fn find_call_by_provider_id(
    &self,
    provider_call_id: String,
  ) -> impl Future<Output = Result<Option<Call>, Self::Error>> + Send + '_;

  fn insert_call(
    &self,
    call: Call,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn update_call(
    &self,
    call: Call,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Appointments ──────────────────────────────────────────────────────

  fn get_appointment(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Appointment>, Self::Error>> + Send + '_;

  fn insert_appointment(
    &self,
    appointment: Appointment,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn update_appointment(
    &self,
    appointment: Appointment,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Most recently created appointment for a lead, if any.
  fn latest_appointment_for_lead(
    &self,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Option<Appointment>, Self::Error>> + Send + '_;

  /// Confirmed or reminded appointments whose slot passed more than the
  /// grace period ago — candidates for the no-show sweep.
  fn appointments_due_no_show(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Appointment>, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Append an event. A unique-key collision on `idempotency_key` yields
  /// [`EventWrite::Duplicate`], not an error.
  fn insert_event(
    &self,
    event: Event,
  ) -> impl Future<Output = Result<EventWrite, Self::Error>> + Send + '_;

  /// Insert-or-update the lead (keyed by `lead_id`) and append the event
  /// in a single transaction.
  fn upsert_lead_with_event(
    &self,
    lead: Lead,
    event: Event,
  ) -> impl Future<Output = Result<EventWrite, Self::Error>> + Send + '_;

  /// Insert-or-update the message and append the event in a single
  /// transaction.
  fn upsert_message_with_event(
    &self,
    message: Message,
    event: Event,
  ) -> impl Future<Output = Result<EventWrite, Self::Error>> + Send + '_;

  /// Insert-or-update the call and append the event in a single
  /// transaction.
  fn upsert_call_with_event(
    &self,
    call: Call,
    event: Event,
  ) -> impl Future<Output = Result<EventWrite, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  fn find_event_by_idempotency_key(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  /// Persist processing bookkeeping (status, timestamps, retry count,
  /// metadata, triggered actions).
  fn update_event(
    &self,
    event: Event,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Events referencing a lead, newest first.
  fn list_events_for_lead(
    &self,
    lead_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;
}
