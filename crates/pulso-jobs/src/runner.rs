//! Job bodies: what each queued job does when a worker picks it up.
//!
//! Every body reloads current entity state before acting, so work that
//! was queued against state that has since moved on (a lead that went
//! cold, an appointment that was cancelled) quietly cancels itself.

use chrono::Utc;
use pulso_core::{
  appointment::{Appointment, AppointmentStatus, ReminderWindow},
  call::{Call, CallDirection},
  event::{Event, EventType},
  lead::{Lead, LeadClassification, LeadStage},
  message::{Message, MessageChannel, MessageDirection},
  store::Store,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
  dispatch::JobDispatcher,
  error::{Error, Result},
  job::{Job, JobKind, Lane},
  orchestrator,
  scheduler::JobsConfig,
  services::{
    CallPurpose, MessageTemplate, MessagingClient, SchedulingClient,
    VoiceClient,
  },
};

/// Everything a job body can touch: the store, the dispatcher (for
/// follow-on jobs), the three outbound services, and the config.
pub struct JobContext<S, D, V, C, M> {
  pub store:      S,
  pub dispatcher: D,
  pub voice:      V,
  pub scheduling: C,
  pub messaging:  M,
  pub config:     JobsConfig,
}

/// Execute one job to completion. Errors bubble to the worker, which
/// owns the retry policy.
pub async fn run_job<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  job: Job,
) -> Result<()>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let Job { kind, correlation_id, .. } = job;

  match kind {
    JobKind::ProcessEvent { event_id } => {
      orchestrator::process_event(ctx, event_id).await?;
      Ok(())
    }

    JobKind::InitiateHotLeadCall { lead_id } => {
      place_call(ctx, lead_id, CallPurpose::HotLeadOutreach).await
    }

    JobKind::InitiateUrgentCall { lead_id } => {
      place_call(ctx, lead_id, CallPurpose::UrgentOutreach).await
    }

    JobKind::InitiateCallback { lead_id } => {
      let lead = load_lead(&ctx.store, lead_id).await?;
      if lead.classification == LeadClassification::Cold {
        info!(%lead_id, "callback skipped: lead went cold");
        return Ok(());
      }
      place_call(ctx, lead_id, CallPurpose::Callback).await
    }

    JobKind::SendWelcomeMessage { lead_id, urgent } => {
      let template = if urgent {
        MessageTemplate::WelcomeUrgent
      } else {
        MessageTemplate::Welcome
      };
      let lead = load_lead(&ctx.store, lead_id).await?;
      send_message(ctx, &lead, template, correlation_id).await
    }

    JobKind::FollowUpLead { lead_id } => {
      let lead = load_lead(&ctx.store, lead_id).await?;
      // A follow-up only makes sense while the lead is still early in
      // the funnel and worth pursuing.
      let still_early = matches!(lead.stage, LeadStage::New | LeadStage::Contacted);
      if !lead.is_active
        || lead.classification == LeadClassification::Cold
        || !still_early
      {
        info!(%lead_id, stage = %lead.stage, "follow-up skipped: lead moved on");
        return Ok(());
      }
      send_message(ctx, &lead, MessageTemplate::FollowUp, correlation_id).await
    }

    JobKind::SendBookingMessage { lead_id } => {
      let lead = load_lead(&ctx.store, lead_id).await?;
      send_message(ctx, &lead, MessageTemplate::BookingOptions, correlation_id).await
    }

    JobKind::TriggerHandoff { lead_id } => {
      let lead = load_lead(&ctx.store, lead_id).await?;
      send_message(ctx, &lead, MessageTemplate::HandoffNotice, correlation_id).await?;

      // On-record only, nothing processes it: inserted settled.
      let mut event = Event::for_lead(
        EventType::HandoffTriggered,
        lead_id,
        json!({ "reason": "handoff tag" }),
        "orchestrator",
        correlation_id,
      );
      event.mark_completed();
      ctx.store.insert_event(event).await.map_err(Error::store)?;
      Ok(())
    }

    JobKind::ProcessInboundMessage { message_id, lead_id } => {
      // Reply generation stays with human agents for now; the inbound
      // event itself is already on record.
      info!(?message_id, ?lead_id, "inbound message noted");
      Ok(())
    }

    JobKind::ProcessCallBooking { call_id } => {
      let call = load_call(&ctx.store, call_id).await?;
      let lead = load_lead(&ctx.store, call.lead_id).await?;

      let preferred = Utc::now() + chrono::Duration::hours(24);
      let slot = ctx.scheduling.book(&lead, preferred).await?;

      let mut appointment = Appointment::create(
        lead.lead_id,
        slot.scheduled_date,
        slot.professional_id,
        slot.clinic_id,
      );
      appointment.scheduling_id = Some(slot.scheduling_id);
      let appointment_id = appointment.appointment_id;
      ctx
        .store
        .insert_appointment(appointment)
        .await
        .map_err(Error::store)?;

      let mut event = Event::for_lead(
        EventType::AppointmentBooked,
        lead.lead_id,
        json!({ "call_id": call.call_id, "appointment_id": appointment_id }),
        "orchestrator",
        correlation_id,
      );
      event.appointment_id = Some(appointment_id);
      event.call_id = Some(call.call_id);
      let event_id = event.event_id;
      ctx.store.insert_event(event).await.map_err(Error::store)?;

      ctx.dispatcher.enqueue(
        Lane::HighPriority,
        Job::new(JobKind::ProcessEvent { event_id }, correlation_id),
      );
      Ok(())
    }

    JobKind::ReclassifyLead { lead_id, classification } => {
      info!(%lead_id, %classification, "reclassifying lead");
      ctx
        .store
        .set_lead_classification(lead_id, classification)
        .await
        .map_err(Error::store)
    }

    JobKind::SendBookingConfirmation { appointment_id } => {
      let mut appointment = load_appointment(&ctx.store, appointment_id).await?;
      if !matches!(
        appointment.status,
        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
      ) {
        info!(%appointment_id, status = %appointment.status, "confirmation skipped");
        return Ok(());
      }

      if let Some(scheduling_id) = &appointment.scheduling_id {
        ctx.scheduling.confirm(scheduling_id).await?;
      }

      let lead = load_lead(&ctx.store, appointment.lead_id).await?;
      send_message(ctx, &lead, MessageTemplate::BookingConfirmation, correlation_id)
        .await?;

      appointment.confirm();
      ctx
        .store
        .update_appointment(appointment)
        .await
        .map_err(Error::store)
    }

    JobKind::ScheduleAppointmentReminders { appointment_id } => {
      let appointment = load_appointment(&ctx.store, appointment_id).await?;
      let slots = [
        (chrono::Duration::hours(24), ReminderWindow::TwentyFourHour),
        (chrono::Duration::hours(3), ReminderWindow::ThreeHour),
      ];
      for (lead_time, window) in slots {
        let when = appointment.scheduled_date - lead_time;
        let reminder = Job::new(
          JobKind::SendAppointmentReminder { appointment_id, window },
          correlation_id,
        );
        if ctx.dispatcher.enqueue_at(when, reminder).is_none() {
          info!(%appointment_id, %window, "reminder window already passed");
        }
      }
      Ok(())
    }

    JobKind::SendAppointmentReminder { appointment_id, window } => {
      let mut appointment = load_appointment(&ctx.store, appointment_id).await?;
      let now = Utc::now();
      let due = match window {
        ReminderWindow::TwentyFourHour => appointment.needs_24h_reminder(now),
        ReminderWindow::ThreeHour => appointment.needs_3h_reminder(now),
      };
      if !due {
        info!(%appointment_id, %window, status = %appointment.status, "reminder skipped");
        return Ok(());
      }

      let lead = load_lead(&ctx.store, appointment.lead_id).await?;
      send_message(ctx, &lead, MessageTemplate::AppointmentReminder, correlation_id)
        .await?;

      appointment.mark_reminded(window);
      ctx
        .store
        .update_appointment(appointment)
        .await
        .map_err(Error::store)
    }

    JobKind::ReactivateNoShow { appointment_id } => {
      let appointment = load_appointment(&ctx.store, appointment_id).await?;
      let lead = load_lead(&ctx.store, appointment.lead_id).await?;
      if !lead.is_active {
        info!(%appointment_id, lead_id = %lead.lead_id, "reactivation skipped: lead inactive");
        return Ok(());
      }

      send_message(ctx, &lead, MessageTemplate::Reactivation, correlation_id).await?;

      // On-record only, nothing processes it: inserted settled.
      let mut event = Event::for_lead(
        EventType::ReactivationTriggered,
        lead.lead_id,
        json!({ "appointment_id": appointment.appointment_id }),
        "orchestrator",
        correlation_id,
      );
      event.appointment_id = Some(appointment.appointment_id);
      event.mark_completed();
      ctx.store.insert_event(event).await.map_err(Error::store)?;
      Ok(())
    }

    JobKind::SweepNoShows => {
      let now = Utc::now();
      let due = ctx
        .store
        .appointments_due_no_show(now)
        .await
        .map_err(Error::store)?;
      info!(count = due.len(), "no-show sweep");

      for mut appointment in due {
        appointment.mark_no_show();
        let appointment_id = appointment.appointment_id;
        let lead_id = appointment.lead_id;
        ctx
          .store
          .update_appointment(appointment)
          .await
          .map_err(Error::store)?;

        // Each flagged appointment starts its own pipeline.
        let sweep_correlation = Uuid::new_v4();
        let mut event = Event::for_lead(
          EventType::AppointmentNoShow,
          lead_id,
          json!({ "appointment_id": appointment_id }),
          "scheduler",
          sweep_correlation,
        );
        event.appointment_id = Some(appointment_id);
        let event_id = event.event_id;
        ctx.store.insert_event(event).await.map_err(Error::store)?;

        ctx.dispatcher.enqueue(
          Lane::HighPriority,
          Job::new(JobKind::ProcessEvent { event_id }, sweep_correlation),
        );
      }
      Ok(())
    }
  }
}

// ─── Shared behaviour ────────────────────────────────────────────────────────

/// Place an outbound call and record it. Advances a brand-new lead to
/// `contacted`.
async fn place_call<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  lead_id: Uuid,
  purpose: CallPurpose,
) -> Result<()>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let lead = load_lead(&ctx.store, lead_id).await?;
  if !lead.is_active {
    info!(%lead_id, %purpose, "call skipped: lead inactive");
    return Ok(());
  }

  let provider_call_id = ctx.voice.initiate_call(&lead, purpose).await?;

  let mut call = Call::create(
    lead.lead_id,
    CallDirection::Outbound,
    ctx.config.outbound_number.clone(),
    lead.phone.clone(),
  );
  call.initiate(Some(provider_call_id));
  ctx.store.insert_call(call).await.map_err(Error::store)?;

  ctx
    .store
    .set_lead_contacted(lead_id, Utc::now())
    .await
    .map_err(Error::store)?;
  if lead.stage == LeadStage::New {
    ctx
      .store
      .set_lead_stage(lead_id, LeadStage::Contacted)
      .await
      .map_err(Error::store)?;
  }
  Ok(())
}

/// Send a templated message, record it with its `message_sent` event in
/// one transaction, and stamp the contact time.
async fn send_message<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  lead: &Lead,
  template: MessageTemplate,
  correlation_id: Uuid,
) -> Result<()>
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  if !lead.is_active {
    info!(lead_id = %lead.lead_id, %template, "message skipped: lead inactive");
    return Ok(());
  }

  let external_id = ctx.messaging.send(lead, template).await?;

  let mut message = Message::create(
    format!("pulso-{}", Uuid::new_v4()),
    lead.lead_id,
    template.render(lead),
    MessageChannel::Whatsapp,
    MessageDirection::Outbound,
  );
  message.mark_sent(Some(external_id));

  // On-record only, nothing processes it: inserted settled.
  let mut event = Event::for_lead(
    EventType::MessageSent,
    lead.lead_id,
    json!({ "template": template.to_string() }),
    "orchestrator",
    correlation_id,
  );
  event.message_id = Some(message.message_id);
  event.mark_completed();

  ctx
    .store
    .upsert_message_with_event(message, event)
    .await
    .map_err(Error::store)?;
  ctx
    .store
    .set_lead_contacted(lead.lead_id, Utc::now())
    .await
    .map_err(Error::store)?;
  Ok(())
}

// ─── Loaders ─────────────────────────────────────────────────────────────────

pub(crate) async fn load_lead<S: Store>(store: &S, lead_id: Uuid) -> Result<Lead> {
  store
    .get_lead(lead_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::LeadNotFound(lead_id))
}

pub(crate) async fn load_call<S: Store>(store: &S, call_id: Uuid) -> Result<Call> {
  store
    .get_call(call_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::CallNotFound(call_id))
}

pub(crate) async fn load_appointment<S: Store>(
  store: &S,
  appointment_id: Uuid,
) -> Result<Appointment> {
  store
    .get_appointment(appointment_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::AppointmentNotFound(appointment_id))
}
