//! CRM webhook pipeline: lead and message events.
//!
//! Lead events find-or-create the lead by its CRM id and merge fields
//! overwrite-if-present: an absent field in a payload never nulls out
//! what we already know. Message events require the owning lead to
//! exist.

use std::str::FromStr;

use chrono::Utc;
use pulso_core::{
  event::{Event, EventType},
  lead::{Lead, LeadSource, LeadStage},
  message::{Message, MessageChannel, MessageDirection, MessageStatus},
  rules,
  store::{EventWrite, Store},
};
use pulso_jobs::{Job, JobDispatcher, JobKind, Lane};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  envelope::{derive_idempotency_key, CrmLeadData, CrmMessageData, CrmWebhook, IngestReport},
  error::{IngestError, Result},
};

/// Ingest one CRM webhook delivery: validate, resolve, deduplicate,
/// persist entity + event in one transaction, dispatch orchestration.
pub async fn ingest_crm<S, D>(
  store: &S,
  dispatcher: &D,
  webhook: CrmWebhook,
) -> Result<IngestReport>
where
  S: Store,
  D: JobDispatcher,
{
  let correlation_id = Uuid::new_v4();
  let event_type = map_crm_event(&webhook.event_type)?;

  let key = webhook.idempotency_key.clone().unwrap_or_else(|| {
    derive_idempotency_key(
      "crm",
      &webhook.event_type,
      webhook.crm_lead_id.as_deref(),
      webhook.timestamp,
    )
  });

  // Fast path for redeliveries; the unique constraint still catches the
  // concurrent race below.
  if let Some(existing) = store
    .find_event_by_idempotency_key(key.clone())
    .await
    .map_err(IngestError::store)?
  {
    info!(idempotency_key = %key, event_id = %existing.event_id, "duplicate CRM webhook ignored");
    return Ok(IngestReport {
      event_id:       Some(existing.event_id),
      correlation_id: existing.correlation_id,
      deduplicated:   true,
    });
  }

  let (event_id, written) = match event_type {
    EventType::LeadCreated
    | EventType::LeadUpdated
    | EventType::LeadStageChanged
    | EventType::LeadTagAdded => {
      ingest_lead_event(store, &webhook, event_type, key, correlation_id).await?
    }
    _ => ingest_message_event(store, &webhook, event_type, key, correlation_id).await?,
  };

  match written {
    EventWrite::Duplicate(existing) => {
      info!(event_id = %existing.event_id, "duplicate CRM webhook lost the race");
      Ok(IngestReport {
        event_id:       Some(existing.event_id),
        correlation_id: existing.correlation_id,
        deduplicated:   true,
      })
    }
    EventWrite::Inserted => {
      dispatcher.enqueue(
        Lane::HighPriority,
        Job::new(JobKind::ProcessEvent { event_id }, correlation_id),
      );
      Ok(IngestReport { event_id: Some(event_id), correlation_id, deduplicated: false })
    }
  }
}

fn map_crm_event(event_type: &str) -> Result<EventType> {
  match event_type {
    "lead_created" => Ok(EventType::LeadCreated),
    "lead_updated" => Ok(EventType::LeadUpdated),
    "lead_stage_changed" => Ok(EventType::LeadStageChanged),
    "lead_tag_added" => Ok(EventType::LeadTagAdded),
    "message_received" => Ok(EventType::MessageReceived),
    "message_sent" => Ok(EventType::MessageSent),
    "message_delivered" => Ok(EventType::MessageDelivered),
    "message_read" => Ok(EventType::MessageRead),
    other => Err(IngestError::UnsupportedEventType(other.to_owned())),
  }
}

// ─── Lead events ─────────────────────────────────────────────────────────────

async fn ingest_lead_event<S: Store>(
  store: &S,
  webhook: &CrmWebhook,
  event_type: EventType,
  key: String,
  correlation_id: Uuid,
) -> Result<(Uuid, EventWrite)> {
  let data: CrmLeadData = serde_json::from_value(webhook.data.clone())?;

  let lead = match store
    .find_lead_by_crm_id(data.crm_id.clone())
    .await
    .map_err(IngestError::store)?
  {
    None => create_lead(&data),
    Some(existing) => merge_lead(existing, event_type, &data),
  };

  let mut event = Event::from_webhook(
    event_type,
    "crm",
    webhook.data.clone(),
    correlation_id,
    Some(key),
    Some(webhook.timestamp),
  );
  event.lead_id = Some(lead.lead_id);
  for action in rules::derive_crm_actions(event_type, Some(&lead)) {
    event.add_triggered_action(action);
  }

  let event_id = event.event_id;
  let written = store
    .upsert_lead_with_event(lead, event)
    .await
    .map_err(IngestError::store)?;
  Ok((event_id, written))
}

fn create_lead(data: &CrmLeadData) -> Lead {
  let mut lead =
    Lead::create(data.crm_id.clone(), data.first_name.clone(), data.phone.clone());
  lead.last_name = data.last_name.clone();
  lead.email = data.email.clone();
  lead.notes = data.notes.clone();
  lead.assigned_agent_id = data.assigned_agent_id.clone();
  lead.tags = data.tags.clone();
  lead.custom_fields = data.custom_fields.clone();
  lead.classification = rules::classify_new_lead(&lead.tags);

  if let Some(stage) = &data.stage {
    lead.stage = LeadStage::from_str(stage).unwrap_or_default();
  }
  if let Some(source) = &data.source {
    lead.source = LeadSource::from_str(source).unwrap_or_default();
  }
  lead
}

fn merge_lead(mut lead: Lead, event_type: EventType, data: &CrmLeadData) -> Lead {
  if !data.first_name.is_empty() {
    lead.first_name = data.first_name.clone();
  }
  if !data.phone.is_empty() {
    lead.phone = data.phone.clone();
  }
  if let Some(last_name) = &data.last_name {
    lead.last_name = Some(last_name.clone());
  }
  if let Some(email) = &data.email {
    lead.email = Some(email.clone());
  }
  if let Some(notes) = &data.notes {
    lead.notes = Some(notes.clone());
  }
  if let Some(agent) = &data.assigned_agent_id {
    lead.assigned_agent_id = Some(agent.clone());
  }

  if event_type == EventType::LeadStageChanged {
    match data.stage.as_deref().map(LeadStage::from_str) {
      Some(Ok(stage)) => lead.update_stage(stage),
      Some(Err(_)) => warn!(stage = ?data.stage, "ignoring unknown lead stage"),
      None => {}
    }
  }

  if event_type == EventType::LeadTagAdded {
    for tag in &data.tags {
      lead.add_tag(tag.clone());
    }
  }

  // Custom fields merge key-by-key; untouched keys survive.
  for (k, v) in &data.custom_fields {
    lead.custom_fields.insert(k.clone(), v.clone());
  }

  lead.updated_at = Utc::now();
  lead
}

// ─── Message events ──────────────────────────────────────────────────────────

async fn ingest_message_event<S: Store>(
  store: &S,
  webhook: &CrmWebhook,
  event_type: EventType,
  key: String,
  correlation_id: Uuid,
) -> Result<(Uuid, EventWrite)> {
  let data: CrmMessageData = serde_json::from_value(webhook.data.clone())?;

  let lead = store
    .find_lead_by_crm_id(data.crm_lead_id.clone())
    .await
    .map_err(IngestError::store)?
    .ok_or_else(|| IngestError::LeadNotResolved(data.crm_lead_id.clone()))?;

  let existing = store
    .find_message_by_crm_id(data.crm_message_id.clone())
    .await
    .map_err(IngestError::store)?;

  let message = match (event_type, existing) {
    (EventType::MessageReceived | EventType::MessageSent, existing) => {
      let mut message = match existing {
        Some(message) => message,
        None => build_message(&data, lead.lead_id)?,
      };
      if let Some(status) = &data.status {
        message.status = MessageStatus::from_str(status).unwrap_or(MessageStatus::Sent);
      }
      Some(message)
    }
    (EventType::MessageDelivered, Some(mut message)) => {
      message.mark_delivered();
      Some(message)
    }
    (EventType::MessageRead, Some(mut message)) => {
      message.mark_read();
      Some(message)
    }
    // A receipt for a message we never stored: keep the event, skip the
    // entity.
    (_, _) => None,
  };

  let mut event = Event::from_webhook(
    event_type,
    "crm",
    webhook.data.clone(),
    correlation_id,
    Some(key),
    Some(data.timestamp.unwrap_or(webhook.timestamp)),
  );
  event.lead_id = Some(lead.lead_id);
  for action in rules::derive_crm_actions(event_type, Some(&lead)) {
    event.add_triggered_action(action);
  }

  let outbound = message
    .as_ref()
    .is_some_and(|m| m.direction == MessageDirection::Outbound);

  let event_id = event.event_id;
  let written = match message {
    Some(message) => {
      event.message_id = Some(message.message_id);
      store
        .upsert_message_with_event(message, event)
        .await
        .map_err(IngestError::store)?
    }
    None => store.insert_event(event).await.map_err(IngestError::store)?,
  };

  // An outbound message means the lead was just contacted.
  if outbound && !written.is_duplicate() {
    store
      .set_lead_contacted(lead.lead_id, Utc::now())
      .await
      .map_err(IngestError::store)?;
  }

  Ok((event_id, written))
}

fn build_message(data: &CrmMessageData, lead_id: Uuid) -> Result<Message> {
  let direction = MessageDirection::from_str(&data.direction).map_err(|_| {
    IngestError::InvalidValue { field: "direction", value: data.direction.clone() }
  })?;
  let channel = MessageChannel::from_str(&data.channel).unwrap_or_default();

  Ok(Message::create(
    data.crm_message_id.clone(),
    lead_id,
    data.content.clone(),
    channel,
    direction,
  ))
}
