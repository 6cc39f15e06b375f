//! [`SqliteStore`] — the SQLite implementation of [`Store`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use pulso_core::{
  appointment::Appointment,
  call::Call,
  event::Event,
  lead::{Lead, LeadClassification, LeadStage},
  message::Message,
  store::{EventWrite, Store},
};

use crate::{
  encode::{
    encode_dt, encode_uuid, RawAppointment, RawCall, RawEvent, RawLead,
    RawMessage,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Column lists ────────────────────────────────────────────────────────────

const LEAD_COLUMNS: &str = "lead_id, crm_id, first_name, last_name, email, \
   phone, stage, classification, source, tags, custom_fields, notes, \
   assigned_agent_id, is_active, created_at, updated_at, last_contacted_at, \
   qualified_at";

const MESSAGE_COLUMNS: &str = "message_id, crm_message_id, lead_id, content, \
   channel, direction, status, external_id, error_message, sent_at, \
   delivered_at, read_at, failed_at, created_at";

const CALL_COLUMNS: &str = "call_id, provider_call_id, lead_id, direction, \
   status, outcome, from_number, to_number, duration_seconds, recording_url, \
   transcript, transcript_summary, sentiment, intent, function_calls, \
   error_message, queued_at, initiated_at, answered_at, completed_at, \
   failed_at";

const APPOINTMENT_COLUMNS: &str = "appointment_id, scheduling_id, lead_id, \
   scheduled_date, duration_minutes, appointment_type, status, \
   professional_id, professional_name, clinic_id, clinic_name, \
   reminder_sent_24h, reminder_sent_3h, confirmation_sent, notes, \
   cancellation_reason, confirmed_at, reminded_at, completed_at, no_show_at, \
   cancelled_at, created_at";

const EVENT_COLUMNS: &str = "event_id, event_type, status, source, payload, \
   metadata, lead_id, appointment_id, call_id, message_id, correlation_id, \
   triggers_actions, idempotency_key, occurred_at, created_at, processed_at, \
   failed_at, retry_count, error_message";

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn lead_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLead> {
  Ok(RawLead {
    lead_id:           row.get(0)?,
    crm_id:            row.get(1)?,
    first_name:        row.get(2)?,
    last_name:         row.get(3)?,
    email:             row.get(4)?,
    phone:             row.get(5)?,
    stage:             row.get(6)?,
    classification:    row.get(7)?,
    source:            row.get(8)?,
    tags:              row.get(9)?,
    custom_fields:     row.get(10)?,
    notes:             row.get(11)?,
    assigned_agent_id: row.get(12)?,
    is_active:         row.get(13)?,
    created_at:        row.get(14)?,
    updated_at:        row.get(15)?,
    last_contacted_at: row.get(16)?,
    qualified_at:      row.get(17)?,
  })
}

fn message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
  Ok(RawMessage {
    message_id:     row.get(0)?,
    crm_message_id: row.get(1)?,
    lead_id:        row.get(2)?,
    content:        row.get(3)?,
    channel:        row.get(4)?,
    direction:      row.get(5)?,
    status:         row.get(6)?,
    external_id:    row.get(7)?,
    error_message:  row.get(8)?,
    sent_at:        row.get(9)?,
    delivered_at:   row.get(10)?,
    read_at:        row.get(11)?,
    failed_at:      row.get(12)?,
    created_at:     row.get(13)?,
  })
}

fn call_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCall> {
  Ok(RawCall {
    call_id:            row.get(0)?,
    provider_call_id:   row.get(1)?,
    lead_id:            row.get(2)?,
    direction:          row.get(3)?,
    status:             row.get(4)?,
    outcome:            row.get(5)?,
    from_number:        row.get(6)?,
    to_number:          row.get(7)?,
    duration_seconds:   row.get(8)?,
    recording_url:      row.get(9)?,
    transcript:         row.get(10)?,
    transcript_summary: row.get(11)?,
    sentiment:          row.get(12)?,
    intent:             row.get(13)?,
    function_calls:     row.get(14)?,
    error_message:      row.get(15)?,
    queued_at:          row.get(16)?,
    initiated_at:       row.get(17)?,
    answered_at:        row.get(18)?,
    completed_at:       row.get(19)?,
    failed_at:          row.get(20)?,
  })
}

fn appointment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAppointment> {
  Ok(RawAppointment {
    appointment_id:      row.get(0)?,
    scheduling_id:       row.get(1)?,
    lead_id:             row.get(2)?,
    scheduled_date:      row.get(3)?,
    duration_minutes:    row.get(4)?,
    appointment_type:    row.get(5)?,
    status:              row.get(6)?,
    professional_id:     row.get(7)?,
    professional_name:   row.get(8)?,
    clinic_id:           row.get(9)?,
    clinic_name:         row.get(10)?,
    reminder_sent_24h:   row.get(11)?,
    reminder_sent_3h:    row.get(12)?,
    confirmation_sent:   row.get(13)?,
    notes:               row.get(14)?,
    cancellation_reason: row.get(15)?,
    confirmed_at:        row.get(16)?,
    reminded_at:         row.get(17)?,
    completed_at:        row.get(18)?,
    no_show_at:          row.get(19)?,
    cancelled_at:        row.get(20)?,
    created_at:          row.get(21)?,
  })
}

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
  Ok(RawEvent {
    event_id:         row.get(0)?,
    event_type:       row.get(1)?,
    status:           row.get(2)?,
    source:           row.get(3)?,
    payload:          row.get(4)?,
    metadata:         row.get(5)?,
    lead_id:          row.get(6)?,
    appointment_id:   row.get(7)?,
    call_id:          row.get(8)?,
    message_id:       row.get(9)?,
    correlation_id:   row.get(10)?,
    triggers_actions: row.get(11)?,
    idempotency_key:  row.get(12)?,
    occurred_at:      row.get(13)?,
    created_at:       row.get(14)?,
    processed_at:     row.get(15)?,
    failed_at:        row.get(16)?,
    retry_count:      row.get(17)?,
    error_message:    row.get(18)?,
  })
}

// ─── Upsert helpers ──────────────────────────────────────────────────────────
//
// Free functions over `&rusqlite::Connection` so they compose inside the
// transactional event writes. Each is a whole-row upsert keyed on the
// primary key; `created_at` is never touched on update.

fn put_lead(conn: &rusqlite::Connection, raw: &RawLead) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO leads (
       lead_id, crm_id, first_name, last_name, email, phone, stage,
       classification, source, tags, custom_fields, notes,
       assigned_agent_id, is_active, created_at, updated_at,
       last_contacted_at, qualified_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18)
     ON CONFLICT(lead_id) DO UPDATE SET
       crm_id            = excluded.crm_id,
       first_name        = excluded.first_name,
       last_name         = excluded.last_name,
       email             = excluded.email,
       phone             = excluded.phone,
       stage             = excluded.stage,
       classification    = excluded.classification,
       source            = excluded.source,
       tags              = excluded.tags,
       custom_fields     = excluded.custom_fields,
       notes             = excluded.notes,
       assigned_agent_id = excluded.assigned_agent_id,
       is_active         = excluded.is_active,
       updated_at        = excluded.updated_at,
       last_contacted_at = excluded.last_contacted_at,
       qualified_at      = excluded.qualified_at",
    rusqlite::params![
      raw.lead_id,
      raw.crm_id,
      raw.first_name,
      raw.last_name,
      raw.email,
      raw.phone,
      raw.stage,
      raw.classification,
      raw.source,
      raw.tags,
      raw.custom_fields,
      raw.notes,
      raw.assigned_agent_id,
      raw.is_active,
      raw.created_at,
      raw.updated_at,
      raw.last_contacted_at,
      raw.qualified_at,
    ],
  )?;
  Ok(())
}

fn put_message(
  conn: &rusqlite::Connection,
  raw: &RawMessage,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO messages (
       message_id, crm_message_id, lead_id, content, channel, direction,
       status, external_id, error_message, sent_at, delivered_at, read_at,
       failed_at, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
     ON CONFLICT(message_id) DO UPDATE SET
       crm_message_id = excluded.crm_message_id,
       lead_id        = excluded.lead_id,
       content        = excluded.content,
       channel        = excluded.channel,
       direction      = excluded.direction,
       status         = excluded.status,
       external_id    = excluded.external_id,
       error_message  = excluded.error_message,
       sent_at        = excluded.sent_at,
       delivered_at   = excluded.delivered_at,
       read_at        = excluded.read_at,
       failed_at      = excluded.failed_at",
    rusqlite::params![
      raw.message_id,
      raw.crm_message_id,
      raw.lead_id,
      raw.content,
      raw.channel,
      raw.direction,
      raw.status,
      raw.external_id,
      raw.error_message,
      raw.sent_at,
      raw.delivered_at,
      raw.read_at,
      raw.failed_at,
      raw.created_at,
    ],
  )?;
  Ok(())
}

fn put_call(conn: &rusqlite::Connection, raw: &RawCall) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO calls (
       call_id, provider_call_id, lead_id, direction, status, outcome,
       from_number, to_number, duration_seconds, recording_url, transcript,
       transcript_summary, sentiment, intent, function_calls, error_message,
       queued_at, initiated_at, answered_at, completed_at, failed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18, ?19, ?20, ?21)
     ON CONFLICT(call_id) DO UPDATE SET
       provider_call_id   = excluded.provider_call_id,
       lead_id            = excluded.lead_id,
       direction          = excluded.direction,
       status             = excluded.status,
       outcome            = excluded.outcome,
       from_number        = excluded.from_number,
       to_number          = excluded.to_number,
       duration_seconds   = excluded.duration_seconds,
       recording_url      = excluded.recording_url,
       transcript         = excluded.transcript,
       transcript_summary = excluded.transcript_summary,
       sentiment          = excluded.sentiment,
       intent             = excluded.intent,
       function_calls     = excluded.function_calls,
       error_message      = excluded.error_message,
       initiated_at       = excluded.initiated_at,
       answered_at        = excluded.answered_at,
       completed_at       = excluded.completed_at,
       failed_at          = excluded.failed_at",
    rusqlite::params![
      raw.call_id,
      raw.provider_call_id,
      raw.lead_id,
      raw.direction,
      raw.status,
      raw.outcome,
      raw.from_number,
      raw.to_number,
      raw.duration_seconds,
      raw.recording_url,
      raw.transcript,
      raw.transcript_summary,
      raw.sentiment,
      raw.intent,
      raw.function_calls,
      raw.error_message,
      raw.queued_at,
      raw.initiated_at,
      raw.answered_at,
      raw.completed_at,
      raw.failed_at,
    ],
  )?;
  Ok(())
}

fn put_appointment(
  conn: &rusqlite::Connection,
  raw: &RawAppointment,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO appointments (
       appointment_id, scheduling_id, lead_id, scheduled_date,
       duration_minutes, appointment_type, status, professional_id,
       professional_name, clinic_id, clinic_name, reminder_sent_24h,
       reminder_sent_3h, confirmation_sent, notes, cancellation_reason,
       confirmed_at, reminded_at, completed_at, no_show_at, cancelled_at,
       created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
     ON CONFLICT(appointment_id) DO UPDATE SET
       scheduling_id       = excluded.scheduling_id,
       lead_id             = excluded.lead_id,
       scheduled_date      = excluded.scheduled_date,
       duration_minutes    = excluded.duration_minutes,
       appointment_type    = excluded.appointment_type,
       status              = excluded.status,
       professional_id     = excluded.professional_id,
       professional_name   = excluded.professional_name,
       clinic_id           = excluded.clinic_id,
       clinic_name         = excluded.clinic_name,
       reminder_sent_24h   = excluded.reminder_sent_24h,
       reminder_sent_3h    = excluded.reminder_sent_3h,
       confirmation_sent   = excluded.confirmation_sent,
       notes               = excluded.notes,
       cancellation_reason = excluded.cancellation_reason,
       confirmed_at        = excluded.confirmed_at,
       reminded_at         = excluded.reminded_at,
       completed_at        = excluded.completed_at,
       no_show_at          = excluded.no_show_at,
       cancelled_at        = excluded.cancelled_at",
    rusqlite::params![
      raw.appointment_id,
      raw.scheduling_id,
      raw.lead_id,
      raw.scheduled_date,
      raw.duration_minutes,
      raw.appointment_type,
      raw.status,
      raw.professional_id,
      raw.professional_name,
      raw.clinic_id,
      raw.clinic_name,
      raw.reminder_sent_24h,
      raw.reminder_sent_3h,
      raw.confirmation_sent,
      raw.notes,
      raw.cancellation_reason,
      raw.confirmed_at,
      raw.reminded_at,
      raw.completed_at,
      raw.no_show_at,
      raw.cancelled_at,
      raw.created_at,
    ],
  )?;
  Ok(())
}

fn put_event(conn: &rusqlite::Connection, raw: &RawEvent) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO events (
       event_id, event_type, status, source, payload, metadata, lead_id,
       appointment_id, call_id, message_id, correlation_id, triggers_actions,
       idempotency_key, occurred_at, created_at, processed_at, failed_at,
       retry_count, error_message
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18, ?19)
     ON CONFLICT(event_id) DO UPDATE SET
       event_type       = excluded.event_type,
       status           = excluded.status,
       source           = excluded.source,
       payload          = excluded.payload,
       metadata         = excluded.metadata,
       lead_id          = excluded.lead_id,
       appointment_id   = excluded.appointment_id,
       call_id          = excluded.call_id,
       message_id       = excluded.message_id,
       correlation_id   = excluded.correlation_id,
       triggers_actions = excluded.triggers_actions,
       occurred_at      = excluded.occurred_at,
       processed_at     = excluded.processed_at,
       failed_at        = excluded.failed_at,
       retry_count      = excluded.retry_count,
       error_message    = excluded.error_message",
    rusqlite::params![
      raw.event_id,
      raw.event_type,
      raw.status,
      raw.source,
      raw.payload,
      raw.metadata,
      raw.lead_id,
      raw.appointment_id,
      raw.call_id,
      raw.message_id,
      raw.correlation_id,
      raw.triggers_actions,
      raw.idempotency_key,
      raw.occurred_at,
      raw.created_at,
      raw.processed_at,
      raw.failed_at,
      raw.retry_count,
      raw.error_message,
    ],
  )?;
  Ok(())
}

/// A new event row racing an earlier delivery loses on the
/// `idempotency_key` UNIQUE index, not on its own primary key.
fn is_idempotency_conflict(err: &rusqlite::Error) -> bool {
  match err {
    rusqlite::Error::SqliteFailure(e, Some(msg)) => {
      e.code == rusqlite::ErrorCode::ConstraintViolation
        && msg.contains("idempotency_key")
    }
    _ => false,
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Pulso store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_one_lead(
    &self,
    filter: &'static str,
    value: String,
  ) -> Result<Option<Lead>> {
    let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {filter}");
    let raw: Option<RawLead> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![value], lead_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawLead::into_lead).transpose()
  }

  async fn find_one_message(
    &self,
    filter: &'static str,
    value: String,
  ) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter}");
    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![value], message_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawMessage::into_message).transpose()
  }

  async fn find_one_call(
    &self,
    filter: &'static str,
    value: String,
  ) -> Result<Option<Call>> {
    let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE {filter}");
    let raw: Option<RawCall> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![value], call_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCall::into_call).transpose()
  }

  async fn find_one_event(
    &self,
    filter: &'static str,
    value: String,
  ) -> Result<Option<Event>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE {filter}");
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![value], event_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawEvent::into_event).transpose()
  }

  /// Resolve an event write that lost the idempotency race into
  /// [`EventWrite::Duplicate`] carrying the stored event.
  async fn duplicate_of(&self, key: Option<String>) -> Result<EventWrite> {
    let key = key.unwrap_or_default();
    match self.find_event_by_idempotency_key(key.clone()).await? {
      Some(event) => Ok(EventWrite::Duplicate(event)),
      None => Err(Error::Core(pulso_core::Error::DuplicateEvent(key))),
    }
  }
}

// ─── Store impl ──────────────────────────────────────────────────────────────

impl Store for SqliteStore {
  type Error = Error;

  // ── Leads ─────────────────────────────────────────────────────────────────

  async fn insert_lead(&self, lead: Lead) -> Result<()> {
    let raw = RawLead::from_lead(&lead)?;
    self
      .conn
      .call(move |conn| {
        put_lead(conn, &raw)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
    self.find_one_lead("lead_id = ?1", encode_uuid(id)).await
  }

  async fn find_lead_by_crm_id(&self, crm_id: String) -> Result<Option<Lead>> {
    self.find_one_lead("crm_id = ?1", crm_id).await
  }

  async fn find_lead_by_phone(&self, phone: String) -> Result<Option<Lead>> {
    self.find_one_lead("phone = ?1", phone).await
  }

  async fn update_lead(&self, lead: Lead) -> Result<()> {
    self.insert_lead(lead).await
  }

  async fn set_lead_stage(&self, id: Uuid, stage: LeadStage) -> Result<()> {
    let id_str = encode_uuid(id);
    let stage_str = stage.to_string();
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE leads SET stage = ?2, updated_at = ?3 WHERE lead_id = ?1",
          rusqlite::params![id_str, stage_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn set_lead_classification(
    &self,
    id: Uuid,
    classification: LeadClassification,
  ) -> Result<()> {
    let id_str = encode_uuid(id);
    let class_str = classification.to_string();
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE leads SET classification = ?2, updated_at = ?3
           WHERE lead_id = ?1",
          rusqlite::params![id_str, class_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_lead_tag(&self, id: Uuid, tag: String) -> Result<bool> {
    let id_str = encode_uuid(id);
    let now_str = encode_dt(Utc::now());

    // Read-modify-write inside one call so concurrent taggers serialise on
    // the connection.
    let added = self
      .conn
      .call(move |conn| {
        let tags_json: Option<String> = conn
          .query_row(
            "SELECT tags FROM leads WHERE lead_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        let Some(tags_json) = tags_json else {
          return Ok(false);
        };

        let mut tags: Vec<String> = serde_json::from_str(&tags_json)
          .map_err(|e| tokio_rusqlite::Error::Other(e.into()))?;

        if tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
          return Ok(false);
        }
        tags.push(tag);

        let updated = serde_json::to_string(&tags)
          .map_err(|e| tokio_rusqlite::Error::Other(e.into()))?;

        conn.execute(
          "UPDATE leads SET tags = ?2, updated_at = ?3 WHERE lead_id = ?1",
          rusqlite::params![id_str, updated, now_str],
        )?;
        Ok(true)
      })
      .await?;

    Ok(added)
  }

  async fn set_lead_contacted(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE leads SET last_contacted_at = ?2, updated_at = ?2
           WHERE lead_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
    self
      .find_one_message("message_id = ?1", encode_uuid(id))
      .await
  }

  async fn find_message_by_crm_id(
    &self,
    crm_message_id: String,
  ) -> Result<Option<Message>> {
    self
      .find_one_message("crm_message_id = ?1", crm_message_id)
      .await
  }

  // ── Calls ─────────────────────────────────────────────────────────────────

  async fn get_call(&self, id: Uuid) -> Result<Option<Call>> {
    self.find_one_call("call_id = ?1", encode_uuid(id)).await
  }

  async fn find_call_by_provider_id(
    &self,
    provider_call_id: String,
  ) -> Result<Option<Call>> {
    self
      .find_one_call("provider_call_id = ?1", provider_call_id)
      .await
  }

  async fn insert_call(&self, call: Call) -> Result<()> {
    let raw = RawCall::from_call(&call)?;
    self
      .conn
      .call(move |conn| {
        put_call(conn, &raw)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_call(&self, call: Call) -> Result<()> {
    self.insert_call(call).await
  }

  // ── Appointments ──────────────────────────────────────────────────────────

  async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawAppointment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE appointment_id = ?1"
              ),
              rusqlite::params![id_str],
              appointment_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAppointment::into_appointment).transpose()
  }

  async fn insert_appointment(&self, appointment: Appointment) -> Result<()> {
    let raw = RawAppointment::from_appointment(&appointment);
    self
      .conn
      .call(move |conn| {
        put_appointment(conn, &raw)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_appointment(&self, appointment: Appointment) -> Result<()> {
    self.insert_appointment(appointment).await
  }

  async fn latest_appointment_for_lead(
    &self,
    lead_id: Uuid,
  ) -> Result<Option<Appointment>> {
    let id_str = encode_uuid(lead_id);
    let raw: Option<RawAppointment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE lead_id = ?1
                 ORDER BY created_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![id_str],
              appointment_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAppointment::into_appointment).transpose()
  }

  async fn appointments_due_no_show(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<Appointment>> {
    // Status filter in SQL; the grace-period cutoff is evaluated on the
    // decoded rows so the time arithmetic lives in one place.
    let raws: Vec<RawAppointment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {APPOINTMENT_COLUMNS} FROM appointments
           WHERE status IN ('confirmed', 'reminded')
           ORDER BY scheduled_date ASC"
        ))?;
        let rows = stmt
          .query_map([], appointment_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut due: Vec<Appointment> = raws
      .into_iter()
      .map(RawAppointment::into_appointment)
      .collect::<Result<_>>()?;
    due.retain(|a| a.should_check_no_show(now));
    Ok(due)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn insert_event(&self, event: Event) -> Result<EventWrite> {
    let key = event.idempotency_key.clone();
    let raw = RawEvent::from_event(&event)?;

    let inserted = self
      .conn
      .call(move |conn| match put_event(conn, &raw) {
        Ok(()) => Ok(true),
        Err(e) if is_idempotency_conflict(&e) => Ok(false),
        Err(e) => Err(e.into()),
      })
      .await?;

    if inserted {
      Ok(EventWrite::Inserted)
    } else {
      self.duplicate_of(key).await
    }
  }

  async fn upsert_lead_with_event(
    &self,
    lead: Lead,
    event: Event,
  ) -> Result<EventWrite> {
    let key = event.idempotency_key.clone();
    let raw_lead = RawLead::from_lead(&lead)?;
    let raw_event = RawEvent::from_event(&event)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        put_lead(&tx, &raw_lead)?;
        match put_event(&tx, &raw_event) {
          Ok(()) => {
            tx.commit()?;
            Ok(true)
          }
          // Dropping the transaction rolls the lead write back with it.
          Err(e) if is_idempotency_conflict(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      Ok(EventWrite::Inserted)
    } else {
      self.duplicate_of(key).await
    }
  }

  async fn upsert_message_with_event(
    &self,
    message: Message,
    event: Event,
  ) -> Result<EventWrite> {
    let key = event.idempotency_key.clone();
    let raw_message = RawMessage::from_message(&message);
    let raw_event = RawEvent::from_event(&event)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        put_message(&tx, &raw_message)?;
        match put_event(&tx, &raw_event) {
          Ok(()) => {
            tx.commit()?;
            Ok(true)
          }
          Err(e) if is_idempotency_conflict(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      Ok(EventWrite::Inserted)
    } else {
      self.duplicate_of(key).await
    }
  }

  async fn upsert_call_with_event(
    &self,
    call: Call,
    event: Event,
  ) -> Result<EventWrite> {
    let key = event.idempotency_key.clone();
    let raw_call = RawCall::from_call(&call)?;
    let raw_event = RawEvent::from_event(&event)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        put_call(&tx, &raw_call)?;
        match put_event(&tx, &raw_event) {
          Ok(()) => {
            tx.commit()?;
            Ok(true)
          }
          Err(e) if is_idempotency_conflict(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if inserted {
      Ok(EventWrite::Inserted)
    } else {
      self.duplicate_of(key).await
    }
  }

  async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
    self.find_one_event("event_id = ?1", encode_uuid(id)).await
  }

  async fn find_event_by_idempotency_key(
    &self,
    key: String,
  ) -> Result<Option<Event>> {
    self.find_one_event("idempotency_key = ?1", key).await
  }

  async fn update_event(&self, event: Event) -> Result<()> {
    let raw = RawEvent::from_event(&event)?;
    self
      .conn
      .call(move |conn| {
        put_event(conn, &raw)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_events_for_lead(&self, lead_id: Uuid) -> Result<Vec<Event>> {
    let id_str = encode_uuid(lead_id);
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE lead_id = ?1
           ORDER BY occurred_at DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], event_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}
