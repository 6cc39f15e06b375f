//! Call — voice-AI call tracking.
//!
//! A call's `outcome` is an *input* to event derivation: it determines
//! which follow-up action the orchestrator schedules after `call_completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallStatus {
  #[default]
  Queued,
  Initiated,
  Ringing,
  Answered,
  Completed,
  Failed,
  Busy,
  NoAnswer,
  Cancelled,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallDirection {
  Inbound,
  Outbound,
}

/// Classification of how a completed call went. Derived from provider
/// function calls, transcript keywords, and sentiment (see
/// [`crate::rules::classify_call_outcome`]).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallOutcome {
  Successful,
  NoAnswer,
  Busy,
  Voicemail,
  WrongNumber,
  Interested,
  NotInterested,
  CallbackRequested,
  AppointmentBooked,
  TechnicalIssue,
}

// ─── Function calls ──────────────────────────────────────────────────────────

/// A function the voice assistant invoked during the call, as reported by
/// the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFunctionCall {
  pub name:       String,
  pub parameters: serde_json::Value,
  pub result:     Option<serde_json::Value>,
  pub recorded_at: DateTime<Utc>,
}

// ─── Call ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
  pub call_id:          Uuid,
  /// The voice provider's own call id; the resolution key for callbacks.
  pub provider_call_id: Option<String>,
  pub lead_id:          Uuid,
  pub direction:        CallDirection,
  pub status:           CallStatus,
  pub outcome:          Option<CallOutcome>,
  pub from_number:      String,
  pub to_number:        String,
  pub duration_seconds: i64,
  pub recording_url:    Option<String>,
  pub transcript:       Option<String>,
  pub transcript_summary: Option<String>,
  pub sentiment:        Option<String>,
  pub intent:           Option<String>,
  pub function_calls:   Vec<CallFunctionCall>,
  pub error_message:    Option<String>,
  pub queued_at:        DateTime<Utc>,
  pub initiated_at:     Option<DateTime<Utc>>,
  pub answered_at:      Option<DateTime<Utc>>,
  pub completed_at:     Option<DateTime<Utc>>,
  pub failed_at:        Option<DateTime<Utc>>,
}

impl Call {
  pub fn create(
    lead_id: Uuid,
    direction: CallDirection,
    from_number: impl Into<String>,
    to_number: impl Into<String>,
  ) -> Self {
    Self {
      call_id:          Uuid::new_v4(),
      provider_call_id: None,
      lead_id,
      direction,
      status:           CallStatus::Queued,
      outcome:          None,
      from_number:      from_number.into(),
      to_number:        to_number.into(),
      duration_seconds: 0,
      recording_url:    None,
      transcript:       None,
      transcript_summary: None,
      sentiment:        None,
      intent:           None,
      function_calls:   Vec::new(),
      error_message:    None,
      queued_at:        Utc::now(),
      initiated_at:     None,
      answered_at:      None,
      completed_at:     None,
      failed_at:        None,
    }
  }

  pub fn is_completed(&self) -> bool {
    matches!(
      self.status,
      CallStatus::Completed
        | CallStatus::Failed
        | CallStatus::Busy
        | CallStatus::NoAnswer
        | CallStatus::Cancelled
    )
  }

  pub fn initiate(&mut self, provider_call_id: Option<String>) {
    self.status = CallStatus::Initiated;
    self.initiated_at = Some(Utc::now());
    if provider_call_id.is_some() {
      self.provider_call_id = provider_call_id;
    }
  }

  pub fn mark_ringing(&mut self) {
    self.status = CallStatus::Ringing;
  }

  pub fn mark_answered(&mut self) {
    self.status = CallStatus::Answered;
    self.answered_at = Some(Utc::now());
  }

  pub fn mark_completed(&mut self, outcome: Option<CallOutcome>, duration_seconds: Option<i64>) {
    self.status = CallStatus::Completed;
    self.completed_at = Some(Utc::now());
    if outcome.is_some() {
      self.outcome = outcome;
    }
    if let Some(secs) = duration_seconds {
      self.duration_seconds = secs;
    }
  }

  pub fn mark_failed(&mut self, error_message: Option<String>) {
    self.status = CallStatus::Failed;
    self.failed_at = Some(Utc::now());
    if error_message.is_some() {
      self.error_message = error_message;
    }
  }

  pub fn update_transcript(&mut self, transcript: impl Into<String>, summary: Option<String>) {
    self.transcript = Some(transcript.into());
    if summary.is_some() {
      self.transcript_summary = summary;
    }
  }

  pub fn add_function_call(
    &mut self,
    name: impl Into<String>,
    parameters: serde_json::Value,
    result: Option<serde_json::Value>,
  ) {
    self.function_calls.push(CallFunctionCall {
      name: name.into(),
      parameters,
      result,
      recorded_at: Utc::now(),
    });
  }
}
