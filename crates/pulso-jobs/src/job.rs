//! Job descriptors and queue lanes.
//!
//! Jobs are a closed set of descriptors; workers dispatch on them with an
//! exhaustive match, so a new job kind cannot be added without also
//! deciding what runs it.

use chrono::{DateTime, Utc};
use pulso_core::{appointment::ReminderWindow, lead::LeadClassification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue lanes. Webhook-driven orchestration and hot-lead work take the
/// high-priority lane; everything else takes the default lane.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Lane {
  HighPriority,
  Default,
}

/// What a job does, with the ids it needs to reload current state.
///
/// Bodies carry ids, never entity snapshots: each job re-reads the store
/// when it runs, so stale work self-cancels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
  /// Orchestrate a stored event (the entry point for every pipeline).
  ProcessEvent { event_id: Uuid },
  InitiateHotLeadCall { lead_id: Uuid },
  SendWelcomeMessage { lead_id: Uuid, urgent: bool },
  FollowUpLead { lead_id: Uuid },
  SendBookingMessage { lead_id: Uuid },
  TriggerHandoff { lead_id: Uuid },
  InitiateUrgentCall { lead_id: Uuid },
  ProcessInboundMessage {
    message_id: Option<Uuid>,
    lead_id:    Option<Uuid>,
  },
  ProcessCallBooking { call_id: Uuid },
  InitiateCallback { lead_id: Uuid },
  ReclassifyLead {
    lead_id:        Uuid,
    classification: LeadClassification,
  },
  SendBookingConfirmation { appointment_id: Uuid },
  ScheduleAppointmentReminders { appointment_id: Uuid },
  SendAppointmentReminder {
    appointment_id: Uuid,
    window:         ReminderWindow,
  },
  ReactivateNoShow { appointment_id: Uuid },
  /// Recurring: flag lapsed confirmed appointments as no-shows.
  SweepNoShows,
}

/// A queued unit of work. The correlation id is inherited from the event
/// (or sweep) that spawned the job and flows into every log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_id:         Uuid,
  pub kind:           JobKind,
  pub correlation_id: Uuid,
  /// Retry attempt, starting at zero.
  pub attempt:        u32,
}

impl Job {
  pub fn new(kind: JobKind, correlation_id: Uuid) -> Self {
    Self {
      job_id: Uuid::new_v4(),
      kind,
      correlation_id,
      attempt: 0,
    }
  }

  /// Snake_case job name for log fields.
  pub fn name(&self) -> String {
    self.kind.to_string()
  }
}

/// Receipt for an accepted enqueue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobHandle {
  pub job_id:        Uuid,
  /// Set for delayed jobs; `None` for immediate ones.
  pub scheduled_for: Option<DateTime<Utc>>,
}
