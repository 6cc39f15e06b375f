//! The event orchestrator: turns a stored event into follow-up jobs.
//!
//! `process_event` is the body of every [`crate::job::JobKind::ProcessEvent`]
//! job. It runs the per-type handler (baseline flows), then consumes the
//! triggered actions ingestion derived, records what it enqueued in the
//! event's metadata, and persists the terminal status.
//!
//! Ownership is split so no flow runs twice: derived flows (hot-lead
//! sequence, handoff, booking processing, callback, reclassification,
//! booked-stage reminders, inbound processing) run through triggered
//! actions only; everything else is the handler's.

use std::str::FromStr;

use pulso_core::{
  event::{ActionType, Event, EventStatus, EventType, TriggeredAction},
  lead::{LeadClassification, LeadStage},
  rules,
  store::Store,
};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  dispatch::JobDispatcher,
  error::{Error, Result},
  job::{Job, JobKind, Lane},
  runner::{load_lead, JobContext},
  services::{MessagingClient, SchedulingClient, VoiceClient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessStatus {
  Completed,
  Skipped,
  Failed,
}

/// What processing an event amounted to, for callers and tests.
#[derive(Debug, Clone)]
pub struct ProcessReport {
  pub status:            ProcessStatus,
  /// Names of the jobs enqueued while handling the event.
  pub actions_triggered: Vec<String>,
}

impl ProcessReport {
  fn empty(status: ProcessStatus) -> Self {
    Self { status, actions_triggered: Vec::new() }
  }
}

pub async fn process_event<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  event_id: Uuid,
) -> Result<ProcessReport>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let Some(mut event) =
    ctx.store.get_event(event_id).await.map_err(Error::store)?
  else {
    return Err(Error::EventNotFound(event_id));
  };

  // A replayed job for an already-settled event is a no-op.
  if matches!(event.status, EventStatus::Completed | EventStatus::Skipped) {
    debug!(%event_id, status = %event.status, "event already settled");
    return Ok(ProcessReport::empty(ProcessStatus::Skipped));
  }

  event.mark_processing();
  ctx.store.update_event(event.clone()).await.map_err(Error::store)?;

  match handle_event(ctx, &event).await {
    Ok(mut actions) => {
      actions.extend(execute_actions(ctx, &event).await);
      info!(
        %event_id,
        event_type = %event.event_type,
        correlation_id = %event.correlation_id,
        actions = actions.len(),
        "event processed"
      );

      event.mark_completed();
      event
        .metadata
        .insert("actions_triggered".to_owned(), json!(actions));
      ctx.store.update_event(event).await.map_err(Error::store)?;

      Ok(ProcessReport { status: ProcessStatus::Completed, actions_triggered: actions })
    }
    Err(err) => {
      warn!(
        %event_id,
        event_type = %event.event_type,
        correlation_id = %event.correlation_id,
        error = %err,
        "event handling failed"
      );
      event.mark_failed(err.to_string());
      ctx.store.update_event(event.clone()).await.map_err(Error::store)?;

      if ctx.config.auto_retry_events
        && event.should_retry(i64::from(ctx.config.max_retries))
      {
        let retry =
          Job::new(JobKind::ProcessEvent { event_id }, event.correlation_id);
        ctx.dispatcher.enqueue_after(ctx.config.retry_backoff, retry);
      }
      Ok(ProcessReport::empty(ProcessStatus::Failed))
    }
  }
}

// ─── Per-type handlers ───────────────────────────────────────────────────────

async fn handle_event<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  event: &Event,
) -> Result<Vec<String>>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let correlation_id = event.correlation_id;
  let mut actions = Vec::new();
  let mut enqueue = |lane: Lane, kind: JobKind| {
    let job = Job::new(kind, correlation_id);
    actions.push(job.name());
    ctx.dispatcher.enqueue(lane, job);
  };

  match event.event_type {
    EventType::LeadCreated => {
      let lead_id = required(event.lead_id, "lead_id")?;
      let lead = load_lead(&ctx.store, lead_id).await?;

      if rules::is_hot_lead(&lead) {
        // The hot-lead sequence itself arrives as a triggered action;
        // here we only put the detection on record. Nothing processes
        // the record, so it is inserted already settled.
        let mut hot = Event::for_lead(
          EventType::HotLeadDetected,
          lead_id,
          json!({ "classification": lead.classification }),
          "orchestrator",
          correlation_id,
        );
        hot.mark_completed();
        ctx.store.insert_event(hot).await.map_err(Error::store)?;
      } else {
        // A regular lead gets no immediate outreach, only the delayed
        // follow-up.
        let follow_up = Job::new(JobKind::FollowUpLead { lead_id }, correlation_id);
        actions.push(follow_up.name());
        ctx.dispatcher.enqueue_after(ctx.config.follow_up_delay, follow_up);
      }
    }

    EventType::LeadStageChanged => {
      let lead_id = required(event.lead_id, "lead_id")?;
      let lead = load_lead(&ctx.store, lead_id).await?;
      if lead.stage == LeadStage::Qualified {
        enqueue(Lane::Default, JobKind::SendBookingMessage { lead_id });
      }
    }

    EventType::LeadTagAdded => {
      let lead_id = required(event.lead_id, "lead_id")?;
      let lead = load_lead(&ctx.store, lead_id).await?;
      // The guard tag makes the urgent call once per lead, however many
      // times the tag webhook is delivered.
      if lead.has_tag("urgent") && !lead.has_tag("contacted_urgent") {
        enqueue(Lane::HighPriority, JobKind::InitiateUrgentCall { lead_id });
        ctx
          .store
          .add_lead_tag(lead_id, "contacted_urgent".to_owned())
          .await
          .map_err(Error::store)?;
      }
    }

    EventType::AppointmentBooked => {
      let appointment_id = required(event.appointment_id, "appointment_id")?;
      enqueue(Lane::Default, JobKind::SendBookingConfirmation { appointment_id });
      enqueue(
        Lane::Default,
        JobKind::ScheduleAppointmentReminders { appointment_id },
      );
      if let Some(lead_id) = event.lead_id {
        ctx
          .store
          .set_lead_stage(lead_id, LeadStage::Booked)
          .await
          .map_err(Error::store)?;
      }
    }

    EventType::AppointmentNoShow => {
      let appointment_id = required(event.appointment_id, "appointment_id")?;
      enqueue(Lane::Default, JobKind::ReactivateNoShow { appointment_id });
      if let Some(lead_id) = event.lead_id {
        ctx
          .store
          .set_lead_stage(lead_id, LeadStage::NoShow)
          .await
          .map_err(Error::store)?;
      }
    }

    other => {
      debug!(event_type = %other, "no baseline handler for event type");
    }
  }

  Ok(actions)
}

// ─── Triggered actions ───────────────────────────────────────────────────────

/// Consume the event's triggered actions. A single failing action is
/// logged and skipped; it never fails the whole event.
async fn execute_actions<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  event: &Event,
) -> Vec<String>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let mut triggered = Vec::new();
  for action in &event.triggers_actions {
    match apply_action(ctx, event, action).await {
      Ok(names) => triggered.extend(names),
      Err(err) => warn!(
        event_id = %event.event_id,
        action = %action.action,
        error = %err,
        "triggered action skipped"
      ),
    }
  }
  triggered
}

async fn apply_action<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  event: &Event,
  action: &TriggeredAction,
) -> Result<Vec<String>>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let correlation_id = event.correlation_id;
  let mut names = Vec::new();
  let mut enqueue = |lane: Lane, kind: JobKind| {
    let job = Job::new(kind, correlation_id);
    names.push(job.name());
    ctx.dispatcher.enqueue(lane, job);
  };

  match action.action {
    ActionType::InitiateHotLeadSequence => {
      let lead_id = action_uuid(action, "lead_id")?;
      enqueue(Lane::HighPriority, JobKind::InitiateHotLeadCall { lead_id });
      enqueue(
        Lane::HighPriority,
        JobKind::SendWelcomeMessage { lead_id, urgent: true },
      );
    }

    ActionType::TriggerHandoff => {
      let lead_id = action_uuid(action, "lead_id")?;
      enqueue(Lane::HighPriority, JobKind::TriggerHandoff { lead_id });
    }

    ActionType::ScheduleAppointmentReminders => {
      let lead_id = action_uuid(action, "lead_id")?;
      // The CRM only tells us the stage changed; the appointment itself
      // is whatever was booked most recently.
      match ctx
        .store
        .latest_appointment_for_lead(lead_id)
        .await
        .map_err(Error::store)?
      {
        Some(appointment) => enqueue(
          Lane::Default,
          JobKind::ScheduleAppointmentReminders {
            appointment_id: appointment.appointment_id,
          },
        ),
        None => warn!(%lead_id, "booked stage without a stored appointment"),
      }
    }

    ActionType::ProcessInboundMessage => {
      let lead_id = event
        .lead_id
        .or_else(|| action.data.get("lead_id").and_then(|s| Uuid::parse_str(s).ok()));
      enqueue(
        Lane::Default,
        JobKind::ProcessInboundMessage { message_id: event.message_id, lead_id },
      );
    }

    ActionType::ProcessAppointmentBooking => {
      let call_id = action_uuid(action, "call_id")?;
      enqueue(Lane::Default, JobKind::ProcessCallBooking { call_id });
    }

    ActionType::ScheduleCallback => {
      let lead_id = action_uuid(action, "lead_id")?;
      let callback =
        Job::new(JobKind::InitiateCallback { lead_id }, correlation_id);
      names.push(callback.name());
      ctx.dispatcher.enqueue_after(ctx.config.callback_delay, callback);
    }

    ActionType::UpdateLeadClassification => {
      let lead_id = action_uuid(action, "lead_id")?;
      let classification = action
        .data
        .get("classification")
        .and_then(|s| LeadClassification::from_str(s).ok())
        .ok_or(Error::ActionData("classification"))?;
      enqueue(Lane::Default, JobKind::ReclassifyLead { lead_id, classification });
    }
  }

  Ok(names)
}

fn required(id: Option<Uuid>, field: &'static str) -> Result<Uuid> {
  id.ok_or(Error::ActionData(field))
}

fn action_uuid(action: &TriggeredAction, key: &'static str) -> Result<Uuid> {
  action
    .data
    .get(key)
    .and_then(|s| Uuid::parse_str(s).ok())
    .ok_or(Error::ActionData(key))
}
