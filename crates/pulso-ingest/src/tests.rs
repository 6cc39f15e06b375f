//! Pipeline tests against the in-memory SQLite store.

use chrono::{Duration, Utc};
use pulso_core::{
  call::{Call, CallDirection, CallOutcome, CallStatus},
  event::{ActionType, EventType},
  lead::{Lead, LeadClassification, LeadStage},
  message::MessageStatus,
  store::Store,
};
use pulso_jobs::{JobKind, Lane, RecordingDispatcher};
use pulso_store_sqlite::SqliteStore;
use serde_json::json;
use uuid::Uuid;

use crate::{
  crm::ingest_crm,
  envelope::{CrmWebhook, VoiceCallback},
  error::IngestError,
  voice::ingest_voice,
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.unwrap()
}

fn crm_webhook(event_type: &str, data: serde_json::Value) -> CrmWebhook {
  serde_json::from_value(json!({
    "event_type": event_type,
    "timestamp": Utc::now(),
    "data": data,
  }))
  .unwrap()
}

fn lead_payload(crm_id: &str) -> serde_json::Value {
  json!({
    "crm_id": crm_id,
    "first_name": "Maria",
    "last_name": "Souza",
    "phone": "+5511999990000",
    "email": "maria@example.com",
    "source": "paid_ads",
    "tags": [],
  })
}

fn voice_callback(event_type: &str, data: serde_json::Value) -> VoiceCallback {
  serde_json::from_value(json!({
    "event_type": event_type,
    "timestamp": Utc::now(),
    "data": data,
  }))
  .unwrap()
}

// ─── CRM: leads ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn lead_created_persists_lead_event_and_dispatches() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let report = ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  assert!(!report.deduplicated);
  let lead = s.find_lead_by_crm_id("crm-1".into()).await.unwrap().unwrap();
  assert_eq!(lead.first_name, "Maria");
  assert_eq!(lead.classification, LeadClassification::Warm);

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.event_type, EventType::LeadCreated);
  assert_eq!(event.lead_id, Some(lead.lead_id));
  assert!(event.idempotency_key.unwrap().starts_with("crm_lead_created_"));

  let jobs = d.immediate();
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].0, Lane::HighPriority);
  assert!(matches!(jobs[0].1.kind, JobKind::ProcessEvent { .. }));
}

#[tokio::test]
async fn urgent_tags_classify_hot_and_derive_the_sequence() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let mut payload = lead_payload("crm-hot");
  payload["tags"] = json!(["Urgent"]);
  let report = ingest_crm(&s, &d, crm_webhook("lead_created", payload))
    .await
    .unwrap();

  let lead = s.find_lead_by_crm_id("crm-hot".into()).await.unwrap().unwrap();
  assert_eq!(lead.classification, LeadClassification::Hot);

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.triggers_actions.len(), 1);
  assert_eq!(
    event.triggers_actions[0].action,
    ActionType::InitiateHotLeadSequence
  );
}

#[tokio::test]
async fn redelivery_is_acknowledged_without_side_effects() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let webhook = crm_webhook("lead_created", lead_payload("crm-1"));
  let first = ingest_crm(&s, &d, webhook.clone()).await.unwrap();
  let second = ingest_crm(&s, &d, webhook).await.unwrap();

  assert!(second.deduplicated);
  assert_eq!(second.event_id, first.event_id);
  // Only the first delivery dispatched a job.
  assert_eq!(d.all_jobs().len(), 1);
}

#[tokio::test]
async fn lead_update_merges_without_nulling_fields() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  // Sparse update: no email, new notes.
  let update = json!({
    "crm_id": "crm-1",
    "first_name": "Maria",
    "phone": "+5511999990000",
    "notes": "prefers evenings",
    "custom_fields": { "budget": "high" },
  });
  ingest_crm(&s, &d, crm_webhook("lead_updated", update))
    .await
    .unwrap();

  let lead = s.find_lead_by_crm_id("crm-1".into()).await.unwrap().unwrap();
  assert_eq!(lead.email.as_deref(), Some("maria@example.com"));
  assert_eq!(lead.notes.as_deref(), Some("prefers evenings"));
  assert_eq!(
    lead.custom_fields.get("budget").and_then(|v| v.as_str()),
    Some("high")
  );
}

#[tokio::test]
async fn booked_stage_change_derives_reminder_scheduling() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  let mut change = lead_payload("crm-1");
  change["stage"] = json!("booked");
  let report = ingest_crm(&s, &d, crm_webhook("lead_stage_changed", change))
    .await
    .unwrap();

  let lead = s.find_lead_by_crm_id("crm-1".into()).await.unwrap().unwrap();
  assert_eq!(lead.stage, LeadStage::Booked);

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(
    event.triggers_actions[0].action,
    ActionType::ScheduleAppointmentReminders
  );
}

#[tokio::test]
async fn handoff_tag_derives_handoff_action() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  let mut tagged = lead_payload("crm-1");
  tagged["tags"] = json!(["handoff"]);
  let report = ingest_crm(&s, &d, crm_webhook("lead_tag_added", tagged))
    .await
    .unwrap();

  let lead = s.find_lead_by_crm_id("crm-1".into()).await.unwrap().unwrap();
  assert!(lead.has_tag("handoff"));

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.triggers_actions[0].action, ActionType::TriggerHandoff);
}

#[tokio::test]
async fn unsupported_event_type_is_rejected() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let err = ingest_crm(&s, &d, crm_webhook("lead_deleted", lead_payload("crm-1")))
    .await
    .unwrap_err();
  assert!(matches!(err, IngestError::UnsupportedEventType(_)));
  assert!(err.is_client_error());
  assert!(d.all_jobs().is_empty());
}

#[tokio::test]
async fn malformed_lead_payload_is_a_payload_error() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  // Missing the required phone field.
  let err = ingest_crm(
    &s,
    &d,
    crm_webhook("lead_created", json!({ "crm_id": "crm-1", "first_name": "Maria" })),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, IngestError::Payload(_)));
}

// ─── CRM: messages ───────────────────────────────────────────────────────────

fn message_payload(crm_lead_id: &str, direction: &str) -> serde_json::Value {
  json!({
    "crm_message_id": format!("msg-{}", Uuid::new_v4()),
    "crm_lead_id": crm_lead_id,
    "content": "quero saber mais",
    "direction": direction,
  })
}

#[tokio::test]
async fn inbound_message_creates_message_and_inbound_action() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  let payload = message_payload("crm-1", "inbound");
  let crm_message_id = payload["crm_message_id"].as_str().unwrap().to_owned();
  let report = ingest_crm(&s, &d, crm_webhook("message_received", payload))
    .await
    .unwrap();

  let message = s
    .find_message_by_crm_id(crm_message_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(message.content, "quero saber mais");

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.message_id, Some(message.message_id));
  assert_eq!(
    event.triggers_actions[0].action,
    ActionType::ProcessInboundMessage
  );
}

#[tokio::test]
async fn outbound_message_stamps_last_contacted() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  ingest_crm(
    &s,
    &d,
    crm_webhook("message_sent", message_payload("crm-1", "outbound")),
  )
  .await
  .unwrap();

  let lead = s.find_lead_by_crm_id("crm-1".into()).await.unwrap().unwrap();
  assert!(lead.last_contacted_at.is_some());
}

#[tokio::test]
async fn delivery_receipt_updates_message_status() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  ingest_crm(&s, &d, crm_webhook("lead_created", lead_payload("crm-1")))
    .await
    .unwrap();

  let payload = message_payload("crm-1", "outbound");
  let crm_message_id = payload["crm_message_id"].as_str().unwrap().to_owned();
  ingest_crm(&s, &d, crm_webhook("message_sent", payload.clone()))
    .await
    .unwrap();
  ingest_crm(&s, &d, crm_webhook("message_delivered", payload))
    .await
    .unwrap();

  let message = s
    .find_message_by_crm_id(crm_message_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(message.status, MessageStatus::Delivered);
}

#[tokio::test]
async fn message_for_unknown_lead_is_a_resolution_error() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let err = ingest_crm(
    &s,
    &d,
    crm_webhook("message_received", message_payload("crm-ghost", "inbound")),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, IngestError::LeadNotResolved(_)));
  assert!(d.all_jobs().is_empty());
}

// ─── Voice callbacks ─────────────────────────────────────────────────────────

async fn stored_lead_with_call(s: &SqliteStore) -> (Lead, Call) {
  let lead = Lead::create("crm-1", "Maria", "+5511999990000");
  s.insert_lead(lead.clone()).await.unwrap();

  let mut call = Call::create(
    lead.lead_id,
    CallDirection::Outbound,
    "+5511940000000",
    lead.phone.clone(),
  );
  call.initiate(Some("vp-call-1".to_owned()));
  s.insert_call(call.clone()).await.unwrap();
  (lead, call)
}

#[tokio::test]
async fn call_ended_classifies_outcome_and_derives_booking() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  let (lead, call) = stored_lead_with_call(&s).await;

  let report = ingest_voice(
    &s,
    &d,
    voice_callback(
      "call-ended",
      json!({
        "call_id": "vp-call-1",
        "status": "ended",
        "duration": 180,
        "transcript": { "text": "Yes, book it for tomorrow", "sentiment": "positive" },
      }),
    ),
  )
  .await
  .unwrap();

  let stored = s.get_call(call.call_id).await.unwrap().unwrap();
  assert_eq!(stored.status, CallStatus::Completed);
  assert_eq!(stored.outcome, Some(CallOutcome::AppointmentBooked));
  assert_eq!(stored.duration_seconds, 180);

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.event_type, EventType::CallCompleted);
  assert_eq!(event.lead_id, Some(lead.lead_id));
  assert_eq!(
    event.triggers_actions[0].action,
    ActionType::ProcessAppointmentBooking
  );
  assert_eq!(d.all_jobs().len(), 1);
}

#[tokio::test]
async fn booking_function_call_outranks_transcript() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  let (_, call) = stored_lead_with_call(&s).await;

  ingest_voice(
    &s,
    &d,
    voice_callback(
      "call-ended",
      json!({
        "call_id": "vp-call-1",
        "status": "ended",
        "duration": 60,
        "transcript": { "text": "not interested" },
        "function_calls": [
          { "name": "book_appointment", "parameters": {}, "result": { "ok": true } },
        ],
      }),
    ),
  )
  .await
  .unwrap();

  let stored = s.get_call(call.call_id).await.unwrap().unwrap();
  assert_eq!(stored.outcome, Some(CallOutcome::AppointmentBooked));
  assert_eq!(stored.function_calls.len(), 1);
}

#[tokio::test]
async fn unknown_call_falls_back_to_lead_phone() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  let lead = Lead::create("crm-1", "Maria", "+5511999990000");
  s.insert_lead(lead.clone()).await.unwrap();

  let report = ingest_voice(
    &s,
    &d,
    voice_callback(
      "call-started",
      json!({
        "call_id": "vp-call-9",
        "status": "in-progress",
        "phone_number": "+5511999990000",
      }),
    ),
  )
  .await
  .unwrap();

  let call = s
    .find_call_by_provider_id("vp-call-9".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(call.lead_id, lead.lead_id);
  assert_eq!(call.status, CallStatus::Initiated);

  let event = s.get_event(report.event_id.unwrap()).await.unwrap().unwrap();
  assert_eq!(event.event_type, EventType::CallInitiated);
}

#[tokio::test]
async fn informational_callbacks_update_the_call_without_an_event() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  let (_, call) = stored_lead_with_call(&s).await;

  let report = ingest_voice(
    &s,
    &d,
    voice_callback(
      "transcript-updated",
      json!({
        "call_id": "vp-call-1",
        "status": "in-progress",
        "transcript": { "text": "partial transcript", "summary": "so far so good" },
      }),
    ),
  )
  .await
  .unwrap();

  assert!(report.event_id.is_none());
  assert!(d.all_jobs().is_empty());

  let stored = s.get_call(call.call_id).await.unwrap().unwrap();
  assert_eq!(stored.transcript.as_deref(), Some("partial transcript"));
}

#[tokio::test]
async fn unresolvable_call_is_an_error() {
  let s = store().await;
  let d = RecordingDispatcher::new();

  let err = ingest_voice(
    &s,
    &d,
    voice_callback("call-ended", json!({ "call_id": "vp-ghost", "status": "ended" })),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, IngestError::CallNotResolved(_)));
}

#[tokio::test]
async fn replayed_lifecycle_callback_is_deduplicated() {
  let s = store().await;
  let d = RecordingDispatcher::new();
  stored_lead_with_call(&s).await;

  let ts = Utc::now() - Duration::seconds(5);
  let callback: VoiceCallback = serde_json::from_value(json!({
    "event_type": "call-answered",
    "timestamp": ts,
    "data": { "call_id": "vp-call-1", "status": "answered" },
  }))
  .unwrap();

  let first = ingest_voice(&s, &d, callback.clone()).await.unwrap();
  let second = ingest_voice(&s, &d, callback).await.unwrap();

  assert!(!first.deduplicated);
  assert!(second.deduplicated);
  assert_eq!(second.event_id, first.event_id);
  assert_eq!(d.all_jobs().len(), 1);
}
