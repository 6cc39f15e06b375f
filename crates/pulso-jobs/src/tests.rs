//! Orchestrator and job-runner tests against the in-memory SQLite store
//! and the recording service fakes.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pulso_core::{
  appointment::{Appointment, AppointmentStatus, ReminderWindow},
  call::{Call, CallDirection},
  event::{ActionType, Event, EventStatus, EventType, TriggeredAction},
  lead::{Lead, LeadClassification, LeadStage},
  store::Store,
};
use pulso_store_sqlite::SqliteStore;
use serde_json::json;
use uuid::Uuid;

use crate::{
  dispatch::{JobDispatcher, RecordingDispatcher},
  job::{Job, JobKind, Lane},
  orchestrator::{process_event, ProcessStatus},
  runner::run_job,
  scheduler::{run_cron, run_worker, JobsConfig, TokioDispatcher},
  services::{
    MessageTemplate, RecordingMessaging, RecordingScheduling, RecordingVoice,
  },
  JobContext,
};

type TestCtx = JobContext<
  SqliteStore,
  RecordingDispatcher,
  RecordingVoice,
  RecordingScheduling,
  RecordingMessaging,
>;

async fn ctx() -> TestCtx {
  JobContext {
    store:      SqliteStore::open_in_memory().await.unwrap(),
    dispatcher: RecordingDispatcher::new(),
    voice:      RecordingVoice::default(),
    scheduling: RecordingScheduling::default(),
    messaging:  RecordingMessaging::default(),
    config:     JobsConfig::default(),
  }
}

async fn stored_lead(ctx: &TestCtx) -> Lead {
  let lead = Lead::create(
    format!("crm-{}", Uuid::new_v4()),
    "Maria",
    "+5511999990000",
  );
  ctx.store.insert_lead(lead.clone()).await.unwrap();
  lead
}

async fn stored_event(ctx: &TestCtx, event: Event) -> Uuid {
  let event_id = event.event_id;
  ctx.store.insert_event(event).await.unwrap();
  event_id
}

fn lead_event(event_type: EventType, lead_id: Uuid) -> Event {
  Event::for_lead(event_type, lead_id, json!({}), "crm", Uuid::new_v4())
}

fn job(kind: JobKind) -> Job {
  Job::new(kind, Uuid::new_v4())
}

fn kinds(dispatcher: &RecordingDispatcher) -> Vec<JobKind> {
  dispatcher.all_jobs().into_iter().map(|j| j.kind).collect()
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_event_is_an_error() {
  let ctx = ctx().await;
  assert!(process_event(&ctx, Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn warm_lead_creation_schedules_only_the_follow_up() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let event_id =
    stored_event(&ctx, lead_event(EventType::LeadCreated, lead.lead_id)).await;

  let report = process_event(&ctx, event_id).await.unwrap();

  assert_eq!(report.status, ProcessStatus::Completed);
  // No immediate outreach for a regular lead.
  assert!(ctx.dispatcher.immediate().is_empty());
  assert!(matches!(kinds(&ctx.dispatcher)[..], [JobKind::FollowUpLead { .. }]));
  // The follow-up waits out the configured delay.
  let (when, _) = ctx.dispatcher.delayed()[0].clone();
  assert!(when > Utc::now() + Duration::minutes(110));

  let stored = ctx.store.get_event(event_id).await.unwrap().unwrap();
  assert_eq!(stored.status, EventStatus::Completed);
  assert!(stored.metadata.contains_key("actions_triggered"));
}

#[tokio::test]
async fn hot_lead_sequence_runs_from_triggered_action() {
  let ctx = ctx().await;
  let mut lead = Lead::create("crm-hot", "Rui", "+5511988880000");
  lead.classification = LeadClassification::Hot;
  ctx.store.insert_lead(lead.clone()).await.unwrap();

  let mut event = lead_event(EventType::LeadCreated, lead.lead_id);
  event.add_triggered_action(
    TriggeredAction::new(ActionType::InitiateHotLeadSequence)
      .with("lead_id", lead.lead_id.to_string()),
  );
  let event_id = stored_event(&ctx, event).await;

  let report = process_event(&ctx, event_id).await.unwrap();

  assert_eq!(report.status, ProcessStatus::Completed);
  assert!(matches!(
    kinds(&ctx.dispatcher)[..],
    [
      JobKind::InitiateHotLeadCall { .. },
      JobKind::SendWelcomeMessage { urgent: true, .. },
    ]
  ));
  assert!(ctx
    .dispatcher
    .immediate()
    .iter()
    .all(|(lane, _)| *lane == Lane::HighPriority));

  // Detection is put on record as its own event, already settled since
  // nothing dispatches it.
  let events = ctx.store.list_events_for_lead(lead.lead_id).await.unwrap();
  let detection = events
    .iter()
    .find(|e| e.event_type == EventType::HotLeadDetected)
    .unwrap();
  assert_eq!(detection.status, EventStatus::Completed);
}

#[tokio::test]
async fn qualified_stage_sends_booking_options() {
  let ctx = ctx().await;
  let mut lead = stored_lead(&ctx).await;
  lead.update_stage(LeadStage::Qualified);
  ctx.store.update_lead(lead.clone()).await.unwrap();

  let event_id =
    stored_event(&ctx, lead_event(EventType::LeadStageChanged, lead.lead_id)).await;
  process_event(&ctx, event_id).await.unwrap();

  assert!(matches!(
    kinds(&ctx.dispatcher)[..],
    [JobKind::SendBookingMessage { .. }]
  ));
}

#[tokio::test]
async fn urgent_tag_calls_once_per_lead() {
  let ctx = ctx().await;
  let mut lead = stored_lead(&ctx).await;
  lead.add_tag("urgent");
  ctx.store.update_lead(lead.clone()).await.unwrap();

  let first =
    stored_event(&ctx, lead_event(EventType::LeadTagAdded, lead.lead_id)).await;
  process_event(&ctx, first).await.unwrap();

  // Tag webhook delivered again: the guard tag suppresses a second call.
  let second =
    stored_event(&ctx, lead_event(EventType::LeadTagAdded, lead.lead_id)).await;
  process_event(&ctx, second).await.unwrap();

  let urgent_calls = kinds(&ctx.dispatcher)
    .iter()
    .filter(|k| matches!(k, JobKind::InitiateUrgentCall { .. }))
    .count();
  assert_eq!(urgent_calls, 1);

  let stored = ctx.store.get_lead(lead.lead_id).await.unwrap().unwrap();
  assert!(stored.has_tag("contacted_urgent"));
}

#[tokio::test]
async fn settled_events_are_not_reprocessed() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let event_id =
    stored_event(&ctx, lead_event(EventType::LeadCreated, lead.lead_id)).await;

  process_event(&ctx, event_id).await.unwrap();
  let jobs_after_first = ctx.dispatcher.all_jobs().len();

  let replay = process_event(&ctx, event_id).await.unwrap();
  assert_eq!(replay.status, ProcessStatus::Skipped);
  assert_eq!(ctx.dispatcher.all_jobs().len(), jobs_after_first);
}

#[tokio::test]
async fn handler_failure_marks_event_failed() {
  let ctx = ctx().await;
  // References a lead that was never stored.
  let event_id =
    stored_event(&ctx, lead_event(EventType::LeadCreated, Uuid::new_v4())).await;

  let report = process_event(&ctx, event_id).await.unwrap();
  assert_eq!(report.status, ProcessStatus::Failed);

  let stored = ctx.store.get_event(event_id).await.unwrap().unwrap();
  assert_eq!(stored.status, EventStatus::Failed);
  assert_eq!(stored.retry_count, 1);
  assert!(stored.error_message.is_some());
  // Auto-retry is off by default.
  assert!(ctx.dispatcher.delayed().is_empty());
}

#[tokio::test]
async fn callback_action_schedules_delayed_call() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;

  let mut event = lead_event(EventType::CallCompleted, lead.lead_id);
  event.add_triggered_action(
    TriggeredAction::new(ActionType::ScheduleCallback)
      .with("lead_id", lead.lead_id.to_string())
      .with("call_id", Uuid::new_v4().to_string()),
  );
  let event_id = stored_event(&ctx, event).await;
  process_event(&ctx, event_id).await.unwrap();

  let delayed = ctx.dispatcher.delayed();
  assert_eq!(delayed.len(), 1);
  assert!(matches!(delayed[0].1.kind, JobKind::InitiateCallback { .. }));
  assert!(delayed[0].0 > Utc::now() + Duration::hours(23));
}

#[tokio::test]
async fn classification_action_enqueues_reclassification() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;

  let mut event = lead_event(EventType::CallCompleted, lead.lead_id);
  event.add_triggered_action(
    TriggeredAction::new(ActionType::UpdateLeadClassification)
      .with("lead_id", lead.lead_id.to_string())
      .with("classification", "cold"),
  );
  let event_id = stored_event(&ctx, event).await;
  process_event(&ctx, event_id).await.unwrap();

  assert!(matches!(
    kinds(&ctx.dispatcher)[..],
    [JobKind::ReclassifyLead { classification: LeadClassification::Cold, .. }]
  ));
}

// ─── Job bodies ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn welcome_message_is_recorded_with_its_event() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;

  run_job(
    &ctx,
    job(JobKind::SendWelcomeMessage { lead_id: lead.lead_id, urgent: false }),
  )
  .await
  .unwrap();

  assert_eq!(
    ctx.messaging.sent(),
    vec![(lead.lead_id, MessageTemplate::Welcome)]
  );

  let stored = ctx.store.get_lead(lead.lead_id).await.unwrap().unwrap();
  assert!(stored.last_contacted_at.is_some());

  let events = ctx.store.list_events_for_lead(lead.lead_id).await.unwrap();
  let sent = events
    .iter()
    .find(|e| e.event_type == EventType::MessageSent)
    .unwrap();
  assert_eq!(sent.status, EventStatus::Completed);
}

#[tokio::test]
async fn follow_up_skips_leads_past_contacted() {
  let ctx = ctx().await;
  let mut lead = stored_lead(&ctx).await;
  lead.update_stage(LeadStage::Qualified);
  ctx.store.update_lead(lead.clone()).await.unwrap();

  run_job(&ctx, job(JobKind::FollowUpLead { lead_id: lead.lead_id }))
    .await
    .unwrap();

  assert!(ctx.messaging.sent().is_empty());
}

#[tokio::test]
async fn hot_lead_call_advances_new_lead() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;

  run_job(&ctx, job(JobKind::InitiateHotLeadCall { lead_id: lead.lead_id }))
    .await
    .unwrap();

  assert_eq!(ctx.voice.calls().len(), 1);
  let stored = ctx.store.get_lead(lead.lead_id).await.unwrap().unwrap();
  assert_eq!(stored.stage, LeadStage::Contacted);
  assert!(stored.last_contacted_at.is_some());
}

#[tokio::test]
async fn callback_skipped_for_cold_lead() {
  let ctx = ctx().await;
  let mut lead = Lead::create("crm-cold", "Iva", "+5511977770000");
  lead.classification = LeadClassification::Cold;
  ctx.store.insert_lead(lead.clone()).await.unwrap();

  run_job(&ctx, job(JobKind::InitiateCallback { lead_id: lead.lead_id }))
    .await
    .unwrap();

  assert!(ctx.voice.calls().is_empty());
}

#[tokio::test]
async fn call_booking_creates_appointment_and_booked_event() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let call = Call::create(
    lead.lead_id,
    CallDirection::Outbound,
    "+5511940000000",
    lead.phone.clone(),
  );
  ctx.store.insert_call(call.clone()).await.unwrap();

  run_job(&ctx, job(JobKind::ProcessCallBooking { call_id: call.call_id }))
    .await
    .unwrap();

  assert_eq!(ctx.scheduling.bookings().len(), 1);

  let appointment = ctx
    .store
    .latest_appointment_for_lead(lead.lead_id)
    .await
    .unwrap()
    .unwrap();
  assert!(appointment.scheduling_id.is_some());

  // The booked event goes straight back through the orchestrator.
  assert!(ctx
    .dispatcher
    .immediate()
    .iter()
    .any(|(lane, j)| *lane == Lane::HighPriority
      && matches!(j.kind, JobKind::ProcessEvent { .. })));
}

#[tokio::test]
async fn booking_confirmation_confirms_and_messages() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let mut appointment = Appointment::create(
    lead.lead_id,
    Utc::now() + Duration::hours(48),
    "prof-1",
    "clinic-1",
  );
  appointment.scheduling_id = Some("sched-1".into());
  ctx.store.insert_appointment(appointment.clone()).await.unwrap();

  run_job(
    &ctx,
    job(JobKind::SendBookingConfirmation {
      appointment_id: appointment.appointment_id,
    }),
  )
  .await
  .unwrap();

  assert_eq!(ctx.scheduling.confirmations(), vec!["sched-1".to_owned()]);
  assert_eq!(
    ctx.messaging.sent(),
    vec![(lead.lead_id, MessageTemplate::BookingConfirmation)]
  );

  let stored = ctx
    .store
    .get_appointment(appointment.appointment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, AppointmentStatus::Confirmed);
  assert!(stored.confirmation_sent);
}

#[tokio::test]
async fn reminder_sends_only_inside_its_window() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let mut appointment = Appointment::create(
    lead.lead_id,
    Utc::now() + Duration::hours(24),
    "prof-1",
    "clinic-1",
  );
  appointment.confirm();
  ctx.store.insert_appointment(appointment.clone()).await.unwrap();

  // 24h out: the 3h reminder is premature, the 24h one is due.
  run_job(
    &ctx,
    job(JobKind::SendAppointmentReminder {
      appointment_id: appointment.appointment_id,
      window:         ReminderWindow::ThreeHour,
    }),
  )
  .await
  .unwrap();
  assert!(ctx.messaging.sent().is_empty());

  run_job(
    &ctx,
    job(JobKind::SendAppointmentReminder {
      appointment_id: appointment.appointment_id,
      window:         ReminderWindow::TwentyFourHour,
    }),
  )
  .await
  .unwrap();
  assert_eq!(
    ctx.messaging.sent(),
    vec![(lead.lead_id, MessageTemplate::AppointmentReminder)]
  );

  let stored = ctx
    .store
    .get_appointment(appointment.appointment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, AppointmentStatus::Reminded);
  assert!(stored.reminder_sent_24h);
}

#[tokio::test]
async fn reminder_scheduling_skips_past_windows() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;

  let near = Appointment::create(
    lead.lead_id,
    Utc::now() + Duration::hours(1),
    "prof-1",
    "clinic-1",
  );
  ctx.store.insert_appointment(near.clone()).await.unwrap();
  run_job(
    &ctx,
    job(JobKind::ScheduleAppointmentReminders {
      appointment_id: near.appointment_id,
    }),
  )
  .await
  .unwrap();
  assert!(ctx.dispatcher.delayed().is_empty());

  let far = Appointment::create(
    lead.lead_id,
    Utc::now() + Duration::hours(30),
    "prof-1",
    "clinic-1",
  );
  ctx.store.insert_appointment(far.clone()).await.unwrap();
  run_job(
    &ctx,
    job(JobKind::ScheduleAppointmentReminders {
      appointment_id: far.appointment_id,
    }),
  )
  .await
  .unwrap();
  assert_eq!(ctx.dispatcher.delayed().len(), 2);
}

#[tokio::test]
async fn sweep_flags_no_shows_and_restarts_the_pipeline() {
  let ctx = ctx().await;
  let lead = stored_lead(&ctx).await;
  let mut appointment = Appointment::create(
    lead.lead_id,
    Utc::now() - Duration::hours(1),
    "prof-1",
    "clinic-1",
  );
  appointment.confirm();
  ctx.store.insert_appointment(appointment.clone()).await.unwrap();

  run_job(&ctx, job(JobKind::SweepNoShows)).await.unwrap();

  let stored = ctx
    .store
    .get_appointment(appointment.appointment_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.status, AppointmentStatus::NoShow);

  let events = ctx.store.list_events_for_lead(lead.lead_id).await.unwrap();
  assert!(events.iter().any(|e| e.event_type == EventType::AppointmentNoShow));
  assert!(ctx
    .dispatcher
    .immediate()
    .iter()
    .any(|(lane, j)| *lane == Lane::HighPriority
      && matches!(j.kind, JobKind::ProcessEvent { .. })));
}

// ─── Queue plumbing ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn tokio_dispatcher_delivers_delayed_jobs() {
  let (dispatcher, mut queues) = TokioDispatcher::new();
  let delayed = job(JobKind::SweepNoShows);
  dispatcher
    .enqueue_at(Utc::now() + Duration::seconds(60), delayed.clone())
    .unwrap();

  let received = queues.default.recv().await.unwrap();
  assert_eq!(received.job_id, delayed.job_id);
}

#[tokio::test]
async fn worker_drains_queues_then_stops() {
  let ctx = Arc::new(ctx().await);
  let lead = stored_lead(&ctx).await;

  let (feeder, queues) = TokioDispatcher::new();
  feeder.enqueue(
    Lane::Default,
    job(JobKind::SendWelcomeMessage { lead_id: lead.lead_id, urgent: false }),
  );
  drop(feeder);

  run_worker(Arc::clone(&ctx), queues).await;
  assert_eq!(ctx.messaging.sent().len(), 1);
}

#[tokio::test]
async fn worker_schedules_a_retry_for_failed_jobs() {
  let ctx = Arc::new(ctx().await);

  let (feeder, queues) = TokioDispatcher::new();
  // A call job whose lead was never stored fails and retries.
  feeder.enqueue(
    Lane::HighPriority,
    job(JobKind::InitiateHotLeadCall { lead_id: Uuid::new_v4() }),
  );
  drop(feeder);

  run_worker(Arc::clone(&ctx), queues).await;

  let delayed = ctx.dispatcher.delayed();
  assert_eq!(delayed.len(), 1);
  assert_eq!(delayed[0].1.attempt, 1);
}

#[tokio::test]
async fn missing_event_fails_permanently_without_retry() {
  let ctx = Arc::new(ctx().await);

  let (feeder, queues) = TokioDispatcher::new();
  // An event id nothing ever stored: a corrupt reference, so no amount
  // of retrying can succeed.
  feeder.enqueue(
    Lane::HighPriority,
    job(JobKind::ProcessEvent { event_id: Uuid::new_v4() }),
  );
  drop(feeder);

  run_worker(Arc::clone(&ctx), queues).await;

  assert!(ctx.dispatcher.delayed().is_empty());
  assert!(ctx.dispatcher.immediate().is_empty());
}

#[tokio::test]
async fn cron_rejects_invalid_patterns() {
  let dispatcher = RecordingDispatcher::new();
  assert!(run_cron(dispatcher, "not a cron pattern").await.is_err());
}
