//! Outbound service interfaces: voice, scheduling, and messaging.
//!
//! The providers themselves are black boxes to this system; only the
//! capabilities jobs need are modelled. The server wires the `Null*`
//! implementations (log-and-synthesize), tests use the `Recording*`
//! fakes.

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pulso_core::lead::Lead;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Why a call is being placed; becomes provider metadata and a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallPurpose {
  HotLeadOutreach,
  UrgentOutreach,
  Callback,
  Reminder,
}

/// Message templates the system can send. Rendering stays here so job
/// bodies never concatenate lead PII into ad-hoc strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MessageTemplate {
  Welcome,
  WelcomeUrgent,
  FollowUp,
  BookingOptions,
  BookingConfirmation,
  AppointmentReminder,
  HandoffNotice,
  Reactivation,
}

impl MessageTemplate {
  pub fn render(&self, lead: &Lead) -> String {
    let name = &lead.first_name;
    match self {
      Self::Welcome => format!("Hi {name}, thanks for reaching out! How can we help?"),
      Self::WelcomeUrgent => {
        format!("Hi {name}, we received your request and will call you right away.")
      }
      Self::FollowUp => {
        format!("Hi {name}, just following up on your enquiry. Still interested?")
      }
      Self::BookingOptions => {
        format!("Hi {name}, you qualify for a consultation. Reply with a preferred time.")
      }
      Self::BookingConfirmation => {
        format!("Hi {name}, your appointment is confirmed. See you soon!")
      }
      Self::AppointmentReminder => {
        format!("Hi {name}, a reminder about your upcoming appointment.")
      }
      Self::HandoffNotice => {
        format!("Hi {name}, one of our team members will take it from here.")
      }
      Self::Reactivation => {
        format!("Hi {name}, we missed you! Would you like to rebook your appointment?")
      }
    }
  }
}

/// A slot the scheduling system allocated.
#[derive(Debug, Clone)]
pub struct BookedSlot {
  pub scheduling_id:   String,
  pub scheduled_date:  DateTime<Utc>,
  pub professional_id: String,
  pub clinic_id:       String,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Outbound AI-voice provider.
pub trait VoiceClient: Send + Sync {
  /// Place a call to the lead. Returns the provider's call id.
  fn initiate_call(
    &self,
    lead: &Lead,
    purpose: CallPurpose,
  ) -> impl Future<Output = ServiceResult<String>> + Send;
}

/// External scheduling system.
pub trait SchedulingClient: Send + Sync {
  fn book(
    &self,
    lead: &Lead,
    preferred: DateTime<Utc>,
  ) -> impl Future<Output = ServiceResult<BookedSlot>> + Send;

  fn confirm(
    &self,
    scheduling_id: &str,
  ) -> impl Future<Output = ServiceResult<()>> + Send;

  fn cancel(
    &self,
    scheduling_id: &str,
    reason: &str,
  ) -> impl Future<Output = ServiceResult<()>> + Send;
}

/// Outbound messaging (WhatsApp-first).
pub trait MessagingClient: Send + Sync {
  /// Send a templated message. Returns the provider's message id.
  fn send(
    &self,
    lead: &Lead,
    template: MessageTemplate,
  ) -> impl Future<Output = ServiceResult<String>> + Send;
}

// ─── Null implementations ────────────────────────────────────────────────────

/// Logs the call and fabricates a provider id. Used until a real provider
/// integration is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVoice;

impl VoiceClient for NullVoice {
  async fn initiate_call(
    &self,
    lead: &Lead,
    purpose: CallPurpose,
  ) -> ServiceResult<String> {
    let provider_call_id = format!("voice-{}", Uuid::new_v4());
    info!(
      lead_id = %lead.lead_id,
      phone = %lead.masked_phone(),
      %purpose,
      %provider_call_id,
      "voice call initiated (null client)"
    );
    Ok(provider_call_id)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullScheduling;

impl SchedulingClient for NullScheduling {
  async fn book(
    &self,
    lead: &Lead,
    preferred: DateTime<Utc>,
  ) -> ServiceResult<BookedSlot> {
    let slot = BookedSlot {
      scheduling_id:   format!("sched-{}", Uuid::new_v4()),
      scheduled_date:  preferred,
      professional_id: "unassigned".to_owned(),
      clinic_id:       "default".to_owned(),
    };
    info!(
      lead_id = %lead.lead_id,
      scheduling_id = %slot.scheduling_id,
      scheduled_date = %slot.scheduled_date,
      "appointment booked (null client)"
    );
    Ok(slot)
  }

  async fn confirm(&self, scheduling_id: &str) -> ServiceResult<()> {
    info!(%scheduling_id, "appointment confirmed (null client)");
    Ok(())
  }

  async fn cancel(&self, scheduling_id: &str, reason: &str) -> ServiceResult<()> {
    info!(%scheduling_id, %reason, "appointment cancelled (null client)");
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullMessaging;

impl MessagingClient for NullMessaging {
  async fn send(
    &self,
    lead: &Lead,
    template: MessageTemplate,
  ) -> ServiceResult<String> {
    let external_id = format!("msg-{}", Uuid::new_v4());
    info!(
      lead_id = %lead.lead_id,
      phone = %lead.masked_phone(),
      %template,
      %external_id,
      "message sent (null client)"
    );
    Ok(external_id)
  }
}

// ─── Recording fakes ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingVoice {
  calls: Mutex<Vec<(Uuid, CallPurpose)>>,
}

impl RecordingVoice {
  pub fn calls(&self) -> Vec<(Uuid, CallPurpose)> {
    self.calls.lock().unwrap().clone()
  }
}

impl VoiceClient for RecordingVoice {
  async fn initiate_call(
    &self,
    lead: &Lead,
    purpose: CallPurpose,
  ) -> ServiceResult<String> {
    self.calls.lock().unwrap().push((lead.lead_id, purpose));
    Ok(format!("voice-{}", Uuid::new_v4()))
  }
}

#[derive(Default)]
pub struct RecordingScheduling {
  bookings:      Mutex<Vec<(Uuid, DateTime<Utc>)>>,
  confirmations: Mutex<Vec<String>>,
}

impl RecordingScheduling {
  pub fn bookings(&self) -> Vec<(Uuid, DateTime<Utc>)> {
    self.bookings.lock().unwrap().clone()
  }

  pub fn confirmations(&self) -> Vec<String> {
    self.confirmations.lock().unwrap().clone()
  }
}

impl SchedulingClient for RecordingScheduling {
  async fn book(
    &self,
    lead: &Lead,
    preferred: DateTime<Utc>,
  ) -> ServiceResult<BookedSlot> {
    self.bookings.lock().unwrap().push((lead.lead_id, preferred));
    Ok(BookedSlot {
      scheduling_id:   format!("sched-{}", Uuid::new_v4()),
      scheduled_date:  preferred,
      professional_id: "prof-test".to_owned(),
      clinic_id:       "clinic-test".to_owned(),
    })
  }

  async fn confirm(&self, scheduling_id: &str) -> ServiceResult<()> {
    self.confirmations.lock().unwrap().push(scheduling_id.to_owned());
    Ok(())
  }

  async fn cancel(&self, _scheduling_id: &str, _reason: &str) -> ServiceResult<()> {
    Ok(())
  }
}

#[derive(Default)]
pub struct RecordingMessaging {
  sent: Mutex<Vec<(Uuid, MessageTemplate)>>,
}

impl RecordingMessaging {
  pub fn sent(&self) -> Vec<(Uuid, MessageTemplate)> {
    self.sent.lock().unwrap().clone()
  }
}

impl MessagingClient for RecordingMessaging {
  async fn send(
    &self,
    lead: &Lead,
    template: MessageTemplate,
  ) -> ServiceResult<String> {
    self.sent.lock().unwrap().push((lead.lead_id, template));
    Ok(format!("msg-{}", Uuid::new_v4()))
  }
}
