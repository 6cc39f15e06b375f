//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enum fields use their
//! snake_case string forms (via `strum`). Structured fields (tags, custom
//! fields, payloads, triggered actions, function calls) are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use pulso_core::{
  appointment::Appointment,
  call::{Call, CallFunctionCall},
  event::{Event, TriggeredAction},
  lead::Lead,
  message::Message,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Ok(Uuid::parse_str(s)?)
}

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

/// Decode any enum that implements `strum::EnumString`.
pub fn decode_enum<T: FromStr>(s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| {
    Error::Decode(format!(
      "unknown {} value: {s:?}",
      std::any::type_name::<T>()
    ))
  })
}

// ─── JSON bags ───────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `leads` row.
pub struct RawLead {
  pub lead_id:           String,
  pub crm_id:            String,
  pub first_name:        String,
  pub last_name:         Option<String>,
  pub email:             Option<String>,
  pub phone:             String,
  pub stage:             String,
  pub classification:    String,
  pub source:            String,
  pub tags:              String,
  pub custom_fields:     String,
  pub notes:             Option<String>,
  pub assigned_agent_id: Option<String>,
  pub is_active:         bool,
  pub created_at:        String,
  pub updated_at:        String,
  pub last_contacted_at: Option<String>,
  pub qualified_at:      Option<String>,
}

impl RawLead {
  pub fn from_lead(lead: &Lead) -> Result<Self> {
    Ok(Self {
      lead_id:           encode_uuid(lead.lead_id),
      crm_id:            lead.crm_id.clone(),
      first_name:        lead.first_name.clone(),
      last_name:         lead.last_name.clone(),
      email:             lead.email.clone(),
      phone:             lead.phone.clone(),
      stage:             lead.stage.to_string(),
      classification:    lead.classification.to_string(),
      source:            lead.source.to_string(),
      tags:              encode_json(&lead.tags)?,
      custom_fields:     encode_json(&lead.custom_fields)?,
      notes:             lead.notes.clone(),
      assigned_agent_id: lead.assigned_agent_id.clone(),
      is_active:         lead.is_active,
      created_at:        encode_dt(lead.created_at),
      updated_at:        encode_dt(lead.updated_at),
      last_contacted_at: lead.last_contacted_at.map(encode_dt),
      qualified_at:      lead.qualified_at.map(encode_dt),
    })
  }

  pub fn into_lead(self) -> Result<Lead> {
    Ok(Lead {
      lead_id:           decode_uuid(&self.lead_id)?,
      crm_id:            self.crm_id,
      first_name:        self.first_name,
      last_name:         self.last_name,
      email:             self.email,
      phone:             self.phone,
      stage:             decode_enum(&self.stage)?,
      classification:    decode_enum(&self.classification)?,
      source:            decode_enum(&self.source)?,
      tags:              decode_json::<Vec<String>>(&self.tags)?,
      custom_fields:     decode_json::<Map<String, Value>>(&self.custom_fields)?,
      notes:             self.notes,
      assigned_agent_id: self.assigned_agent_id,
      is_active:         self.is_active,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
      last_contacted_at: decode_opt_dt(self.last_contacted_at.as_deref())?,
      qualified_at:      decode_opt_dt(self.qualified_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:     String,
  pub crm_message_id: String,
  pub lead_id:        String,
  pub content:        String,
  pub channel:        String,
  pub direction:      String,
  pub status:         String,
  pub external_id:    Option<String>,
  pub error_message:  Option<String>,
  pub sent_at:        Option<String>,
  pub delivered_at:   Option<String>,
  pub read_at:        Option<String>,
  pub failed_at:      Option<String>,
  pub created_at:     String,
}

impl RawMessage {
  pub fn from_message(message: &Message) -> Self {
    Self {
      message_id:     encode_uuid(message.message_id),
      crm_message_id: message.crm_message_id.clone(),
      lead_id:        encode_uuid(message.lead_id),
      content:        message.content.clone(),
      channel:        message.channel.to_string(),
      direction:      message.direction.to_string(),
      status:         message.status.to_string(),
      external_id:    message.external_id.clone(),
      error_message:  message.error_message.clone(),
      sent_at:        message.sent_at.map(encode_dt),
      delivered_at:   message.delivered_at.map(encode_dt),
      read_at:        message.read_at.map(encode_dt),
      failed_at:      message.failed_at.map(encode_dt),
      created_at:     encode_dt(message.created_at),
    }
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:     decode_uuid(&self.message_id)?,
      crm_message_id: self.crm_message_id,
      lead_id:        decode_uuid(&self.lead_id)?,
      content:        self.content,
      channel:        decode_enum(&self.channel)?,
      direction:      decode_enum(&self.direction)?,
      status:         decode_enum(&self.status)?,
      external_id:    self.external_id,
      error_message:  self.error_message,
      sent_at:        decode_opt_dt(self.sent_at.as_deref())?,
      delivered_at:   decode_opt_dt(self.delivered_at.as_deref())?,
      read_at:        decode_opt_dt(self.read_at.as_deref())?,
      failed_at:      decode_opt_dt(self.failed_at.as_deref())?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `calls` row.
pub struct RawCall {
  pub call_id:            String,
  pub provider_call_id:   Option<String>,
  pub lead_id:            String,
  pub direction:          String,
  pub status:             String,
  pub outcome:            Option<String>,
  pub from_number:        String,
  pub to_number:          String,
  pub duration_seconds:   i64,
  pub recording_url:      Option<String>,
  pub transcript:         Option<String>,
  pub transcript_summary: Option<String>,
  pub sentiment:          Option<String>,
  pub intent:             Option<String>,
  pub function_calls:     String,
  pub error_message:      Option<String>,
  pub queued_at:          String,
  pub initiated_at:       Option<String>,
  pub answered_at:        Option<String>,
  pub completed_at:       Option<String>,
  pub failed_at:          Option<String>,
}

impl RawCall {
  pub fn from_call(call: &Call) -> Result<Self> {
    Ok(Self {
      call_id:            encode_uuid(call.call_id),
      provider_call_id:   call.provider_call_id.clone(),
      lead_id:            encode_uuid(call.lead_id),
      direction:          call.direction.to_string(),
      status:             call.status.to_string(),
      outcome:            call.outcome.map(|o| o.to_string()),
      from_number:        call.from_number.clone(),
      to_number:          call.to_number.clone(),
      duration_seconds:   call.duration_seconds,
      recording_url:      call.recording_url.clone(),
      transcript:         call.transcript.clone(),
      transcript_summary: call.transcript_summary.clone(),
      sentiment:          call.sentiment.clone(),
      intent:             call.intent.clone(),
      function_calls:     encode_json(&call.function_calls)?,
      error_message:      call.error_message.clone(),
      queued_at:          encode_dt(call.queued_at),
      initiated_at:       call.initiated_at.map(encode_dt),
      answered_at:        call.answered_at.map(encode_dt),
      completed_at:       call.completed_at.map(encode_dt),
      failed_at:          call.failed_at.map(encode_dt),
    })
  }

  pub fn into_call(self) -> Result<Call> {
    Ok(Call {
      call_id:            decode_uuid(&self.call_id)?,
      provider_call_id:   self.provider_call_id,
      lead_id:            decode_uuid(&self.lead_id)?,
      direction:          decode_enum(&self.direction)?,
      status:             decode_enum(&self.status)?,
      outcome:            self.outcome.as_deref().map(decode_enum).transpose()?,
      from_number:        self.from_number,
      to_number:          self.to_number,
      duration_seconds:   self.duration_seconds,
      recording_url:      self.recording_url,
      transcript:         self.transcript,
      transcript_summary: self.transcript_summary,
      sentiment:          self.sentiment,
      intent:             self.intent,
      function_calls:     decode_json::<Vec<CallFunctionCall>>(&self.function_calls)?,
      error_message:      self.error_message,
      queued_at:          decode_dt(&self.queued_at)?,
      initiated_at:       decode_opt_dt(self.initiated_at.as_deref())?,
      answered_at:        decode_opt_dt(self.answered_at.as_deref())?,
      completed_at:       decode_opt_dt(self.completed_at.as_deref())?,
      failed_at:          decode_opt_dt(self.failed_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from an `appointments` row.
pub struct RawAppointment {
  pub appointment_id:      String,
  pub scheduling_id:       Option<String>,
  pub lead_id:             String,
  pub scheduled_date:      String,
  pub duration_minutes:    i64,
  pub appointment_type:    String,
  pub status:              String,
  pub professional_id:     String,
  pub professional_name:   Option<String>,
  pub clinic_id:           String,
  pub clinic_name:         Option<String>,
  pub reminder_sent_24h:   bool,
  pub reminder_sent_3h:    bool,
  pub confirmation_sent:   bool,
  pub notes:               Option<String>,
  pub cancellation_reason: Option<String>,
  pub confirmed_at:        Option<String>,
  pub reminded_at:         Option<String>,
  pub completed_at:        Option<String>,
  pub no_show_at:          Option<String>,
  pub cancelled_at:        Option<String>,
  pub created_at:          String,
}

impl RawAppointment {
  pub fn from_appointment(appointment: &Appointment) -> Self {
    Self {
      appointment_id:      encode_uuid(appointment.appointment_id),
      scheduling_id:       appointment.scheduling_id.clone(),
      lead_id:             encode_uuid(appointment.lead_id),
      scheduled_date:      encode_dt(appointment.scheduled_date),
      duration_minutes:    appointment.duration_minutes,
      appointment_type:    appointment.appointment_type.to_string(),
      status:              appointment.status.to_string(),
      professional_id:     appointment.professional_id.clone(),
      professional_name:   appointment.professional_name.clone(),
      clinic_id:           appointment.clinic_id.clone(),
      clinic_name:         appointment.clinic_name.clone(),
      reminder_sent_24h:   appointment.reminder_sent_24h,
      reminder_sent_3h:    appointment.reminder_sent_3h,
      confirmation_sent:   appointment.confirmation_sent,
      notes:               appointment.notes.clone(),
      cancellation_reason: appointment.cancellation_reason.clone(),
      confirmed_at:        appointment.confirmed_at.map(encode_dt),
      reminded_at:         appointment.reminded_at.map(encode_dt),
      completed_at:        appointment.completed_at.map(encode_dt),
      no_show_at:          appointment.no_show_at.map(encode_dt),
      cancelled_at:        appointment.cancelled_at.map(encode_dt),
      created_at:          encode_dt(appointment.created_at),
    }
  }

  pub fn into_appointment(self) -> Result<Appointment> {
    Ok(Appointment {
      appointment_id:      decode_uuid(&self.appointment_id)?,
      scheduling_id:       self.scheduling_id,
      lead_id:             decode_uuid(&self.lead_id)?,
      scheduled_date:      decode_dt(&self.scheduled_date)?,
      duration_minutes:    self.duration_minutes,
      appointment_type:    decode_enum(&self.appointment_type)?,
      status:              decode_enum(&self.status)?,
      professional_id:     self.professional_id,
      professional_name:   self.professional_name,
      clinic_id:           self.clinic_id,
      clinic_name:         self.clinic_name,
      reminder_sent_24h:   self.reminder_sent_24h,
      reminder_sent_3h:    self.reminder_sent_3h,
      confirmation_sent:   self.confirmation_sent,
      notes:               self.notes,
      cancellation_reason: self.cancellation_reason,
      confirmed_at:        decode_opt_dt(self.confirmed_at.as_deref())?,
      reminded_at:         decode_opt_dt(self.reminded_at.as_deref())?,
      completed_at:        decode_opt_dt(self.completed_at.as_deref())?,
      no_show_at:          decode_opt_dt(self.no_show_at.as_deref())?,
      cancelled_at:        decode_opt_dt(self.cancelled_at.as_deref())?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:         String,
  pub event_type:       String,
  pub status:           String,
  pub source:           String,
  pub payload:          String,
  pub metadata:         String,
  pub lead_id:          Option<String>,
  pub appointment_id:   Option<String>,
  pub call_id:          Option<String>,
  pub message_id:       Option<String>,
  pub correlation_id:   String,
  pub triggers_actions: String,
  pub idempotency_key:  Option<String>,
  pub occurred_at:      String,
  pub created_at:       String,
  pub processed_at:     Option<String>,
  pub failed_at:        Option<String>,
  pub retry_count:      i64,
  pub error_message:    Option<String>,
}

impl RawEvent {
  pub fn from_event(event: &Event) -> Result<Self> {
    Ok(Self {
      event_id:         encode_uuid(event.event_id),
      event_type:       event.event_type.to_string(),
      status:           event.status.to_string(),
      source:           event.source.clone(),
      payload:          encode_json(&event.payload)?,
      metadata:         encode_json(&event.metadata)?,
      lead_id:          event.lead_id.map(encode_uuid),
      appointment_id:   event.appointment_id.map(encode_uuid),
      call_id:          event.call_id.map(encode_uuid),
      message_id:       event.message_id.map(encode_uuid),
      correlation_id:   encode_uuid(event.correlation_id),
      triggers_actions: encode_json(&event.triggers_actions)?,
      idempotency_key:  event.idempotency_key.clone(),
      occurred_at:      encode_dt(event.occurred_at),
      created_at:       encode_dt(event.created_at),
      processed_at:     event.processed_at.map(encode_dt),
      failed_at:        event.failed_at.map(encode_dt),
      retry_count:      event.retry_count,
      error_message:    event.error_message.clone(),
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:         decode_uuid(&self.event_id)?,
      event_type:       decode_enum(&self.event_type)?,
      status:           decode_enum(&self.status)?,
      source:           self.source,
      payload:          decode_json::<Value>(&self.payload)?,
      metadata:         decode_json::<Map<String, Value>>(&self.metadata)?,
      lead_id:          decode_opt_uuid(self.lead_id.as_deref())?,
      appointment_id:   decode_opt_uuid(self.appointment_id.as_deref())?,
      call_id:          decode_opt_uuid(self.call_id.as_deref())?,
      message_id:       decode_opt_uuid(self.message_id.as_deref())?,
      correlation_id:   decode_uuid(&self.correlation_id)?,
      triggers_actions: decode_json::<Vec<TriggeredAction>>(&self.triggers_actions)?,
      idempotency_key:  self.idempotency_key,
      occurred_at:      decode_dt(&self.occurred_at)?,
      created_at:       decode_dt(&self.created_at)?,
      processed_at:     decode_opt_dt(self.processed_at.as_deref())?,
      failed_at:        decode_opt_dt(self.failed_at.as_deref())?,
      retry_count:      self.retry_count,
      error_message:    self.error_message,
    })
  }
}
