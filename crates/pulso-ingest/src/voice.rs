//! Voice-provider callback pipeline.
//!
//! Callbacks resolve the call by the provider's call id, falling back to
//! a lead lookup by phone number (the provider sometimes reports calls
//! we never recorded, e.g. after a crash between initiation and insert).
//! Lifecycle callbacks map onto call events; the purely informational
//! types only refresh the call record and produce no event.

use pulso_core::{
  call::{Call, CallDirection},
  event::{Event, EventType},
  rules::{self, OutcomeSignals},
  store::{EventWrite, Store},
};
use pulso_jobs::{Job, JobDispatcher, JobKind, Lane};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  envelope::{derive_idempotency_key, IngestReport, VoiceCallback},
  error::{IngestError, Result},
};

/// Ingest one voice callback: resolve (or synthesize) the call, apply
/// the lifecycle transition, and emit the mapped event if there is one.
pub async fn ingest_voice<S, D>(
  store: &S,
  dispatcher: &D,
  callback: VoiceCallback,
) -> Result<IngestReport>
where
  S: Store,
  D: JobDispatcher,
{
  let correlation_id = Uuid::new_v4();
  let mapped = map_voice_event(&callback.event_type)?;

  let (mut call, is_new) = resolve_call(store, &callback).await?;
  apply_callback(&mut call, &callback);

  let Some(event_type) = mapped else {
    // Informational update: refresh the call, no event, no dispatch.
    if is_new {
      store.insert_call(call).await.map_err(IngestError::store)?;
    } else {
      store.update_call(call).await.map_err(IngestError::store)?;
    }
    debug!(event_type = %callback.event_type, "call updated without event");
    return Ok(IngestReport { event_id: None, correlation_id, deduplicated: false });
  };

  let key = derive_idempotency_key(
    "voice",
    &callback.event_type,
    Some(&callback.data.call_id),
    callback.timestamp,
  );

  if let Some(existing) = store
    .find_event_by_idempotency_key(key.clone())
    .await
    .map_err(IngestError::store)?
  {
    info!(idempotency_key = %key, event_id = %existing.event_id, "duplicate voice callback ignored");
    return Ok(IngestReport {
      event_id:       Some(existing.event_id),
      correlation_id: existing.correlation_id,
      deduplicated:   true,
    });
  }

  let mut event = Event::from_webhook(
    event_type,
    "voice",
    json!({
      "call_id": call.call_id,
      "provider_call_id": callback.data.call_id,
      "status": callback.data.status,
      "duration": callback.data.duration,
      "outcome": call.outcome,
    }),
    correlation_id,
    Some(key),
    Some(callback.timestamp),
  );
  event.lead_id = Some(call.lead_id);
  event.call_id = Some(call.call_id);

  if event_type == EventType::CallCompleted {
    for action in rules::derive_call_actions(&call) {
      event.add_triggered_action(action);
    }
  }

  let event_id = event.event_id;
  match store
    .upsert_call_with_event(call, event)
    .await
    .map_err(IngestError::store)?
  {
    EventWrite::Duplicate(existing) => {
      info!(event_id = %existing.event_id, "duplicate voice callback lost the race");
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

/// `Ok(None)` marks the update-only callback types.
fn map_voice_event(event_type: &str) -> Result<Option<EventType>> {
  match event_type {
    "call-started" => Ok(Some(EventType::CallInitiated)),
    "call-answered" => Ok(Some(EventType::CallAnswered)),
    "call-ended" => Ok(Some(EventType::CallCompleted)),
    "call-failed" => Ok(Some(EventType::CallFailed)),
    "call-ringing" | "transcript-updated" | "function-called" => Ok(None),
    other => Err(IngestError::UnsupportedEventType(other.to_owned())),
  }
}

async fn resolve_call<S: Store>(
  store: &S,
  callback: &VoiceCallback,
) -> Result<(Call, bool)> {
  let data = &callback.data;

  if let Some(call) = store
    .find_call_by_provider_id(data.call_id.clone())
    .await
    .map_err(IngestError::store)?
  {
    return Ok((call, false));
  }

  let Some(phone) = &data.phone_number else {
    return Err(IngestError::CallNotResolved(data.call_id.clone()));
  };
  let Some(lead) = store
    .find_lead_by_phone(phone.clone())
    .await
    .map_err(IngestError::store)?
  else {
    return Err(IngestError::CallNotResolved(data.call_id.clone()));
  };

  info!(provider_call_id = %data.call_id, lead_id = %lead.lead_id, "synthesizing call record from callback");
  let mut call =
    Call::create(lead.lead_id, CallDirection::Outbound, "unknown", phone.clone());
  call.provider_call_id = Some(data.call_id.clone());
  Ok((call, true))
}

fn apply_callback(call: &mut Call, callback: &VoiceCallback) {
  let data = &callback.data;

  match callback.event_type.as_str() {
    "call-started" => call.initiate(Some(data.call_id.clone())),
    "call-ringing" => call.mark_ringing(),
    "call-answered" => call.mark_answered(),
    "call-ended" => {
      let signals = OutcomeSignals {
        booked_via_function:   invoked(callback, "book_appointment"),
        callback_via_function: invoked(callback, "schedule_callback"),
        transcript:            data.transcript.as_ref().map(|t| t.text.as_str()),
        sentiment:             data.transcript.as_ref().and_then(|t| t.sentiment.as_deref()),
        duration_seconds:      data.duration,
      };
      let outcome = rules::classify_call_outcome(&signals);
      call.mark_completed(Some(outcome), data.duration);
    }
    "call-failed" => call.mark_failed(data.error_message.clone()),
    _ => {}
  }

  // Provider-reported timestamps win over our transition stamps.
  if let Some(started) = data.started_at {
    call.initiated_at = Some(started);
  }
  if let Some(answered) = data.answered_at {
    call.answered_at = Some(answered);
  }
  if let Some(ended) = data.ended_at {
    call.completed_at = Some(ended);
  }
  if let Some(duration) = data.duration {
    call.duration_seconds = duration;
  }
  if let Some(url) = &data.recording_url {
    call.recording_url = Some(url.clone());
  }

  if let Some(transcript) = &data.transcript {
    call.update_transcript(transcript.text.clone(), transcript.summary.clone());
    if let Some(sentiment) = &transcript.sentiment {
      call.sentiment = Some(sentiment.clone());
    }
    if let Some(intent) = &transcript.intent {
      call.intent = Some(intent.clone());
    }
  }

  for function_call in &data.function_calls {
    call.add_function_call(
      function_call.name.clone(),
      function_call.parameters.clone(),
      function_call.result.clone(),
    );
  }
}

fn invoked(callback: &VoiceCallback, name: &str) -> bool {
  callback
    .data
    .function_calls
    .iter()
    .any(|f| f.name == name && f.result.is_some())
}
