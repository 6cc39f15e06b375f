//! Queue plumbing: orchestration config, the tokio-backed dispatcher,
//! the worker loop, and the recurring no-show sweep.
//!
//! Two unbounded lanes feed one worker loop; the high-priority lane is
//! always drained first. Delayed jobs live as sleeping tasks that feed
//! the default lane when their deadline arrives, so a process restart
//! drops pending delays — the staleness checks in job bodies make the
//! resulting re-enqueues harmless.

use std::{str::FromStr, sync::Arc, time::Instant};

use chrono::{DateTime, Duration, Utc};
use croner::Cron;
use pulso_core::store::Store;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  dispatch::JobDispatcher,
  error::{Error, Result},
  job::{Job, JobHandle, JobKind, Lane},
  runner::{run_job, JobContext},
  services::{MessagingClient, SchedulingClient, VoiceClient},
};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Orchestration knobs, loaded by the server from its config file.
#[derive(Debug, Clone)]
pub struct JobsConfig {
  /// Wall-clock budget for a single job execution.
  pub job_timeout:        std::time::Duration,
  /// Executions per job beyond the first.
  pub max_retries:        u32,
  /// Base delay before a failed job runs again; scales with the attempt.
  pub retry_backoff:      Duration,
  /// How long after creation an uncontacted lead gets a follow-up.
  pub follow_up_delay:    Duration,
  /// How long after a callback request the return call is placed.
  pub callback_delay:     Duration,
  /// Cron pattern for the no-show sweep.
  pub no_show_sweep_cron: String,
  /// Re-enqueue failed events automatically. Off by default; failed
  /// events stay queryable and can be requeued by hand.
  pub auto_retry_events:  bool,
  /// Caller id for outbound voice calls.
  pub outbound_number:    String,
}

impl Default for JobsConfig {
  fn default() -> Self {
    Self {
      job_timeout:        std::time::Duration::from_secs(300),
      max_retries:        3,
      retry_backoff:      Duration::seconds(30),
      follow_up_delay:    Duration::hours(2),
      callback_delay:     Duration::hours(24),
      no_show_sweep_cron: "*/15 * * * *".to_owned(),
      auto_retry_events:  false,
      outbound_number:    "+5511940000000".to_owned(),
    }
  }
}

// ─── Tokio dispatcher ────────────────────────────────────────────────────────

/// Production [`JobDispatcher`]: immediate jobs go straight onto their
/// lane's channel, delayed jobs sleep in a spawned task first.
#[derive(Clone)]
pub struct TokioDispatcher {
  high:    mpsc::UnboundedSender<Job>,
  default: mpsc::UnboundedSender<Job>,
}

/// Receiving ends of the two lanes, consumed by [`run_worker`].
pub struct JobQueues {
  pub high:    mpsc::UnboundedReceiver<Job>,
  pub default: mpsc::UnboundedReceiver<Job>,
}

impl TokioDispatcher {
  pub fn new() -> (Self, JobQueues) {
    let (high_tx, high_rx) = mpsc::unbounded_channel();
    let (default_tx, default_rx) = mpsc::unbounded_channel();
    (
      Self { high: high_tx, default: default_tx },
      JobQueues { high: high_rx, default: default_rx },
    )
  }
}

impl JobDispatcher for TokioDispatcher {
  fn enqueue(&self, lane: Lane, job: Job) -> JobHandle {
    let handle = JobHandle { job_id: job.job_id, scheduled_for: None };
    let sender = match lane {
      Lane::HighPriority => &self.high,
      Lane::Default => &self.default,
    };
    if let Err(dropped) = sender.send(job) {
      warn!(job = %dropped.0.name(), %lane, "queue closed, job dropped");
    }
    handle
  }

  fn enqueue_at(&self, when: DateTime<Utc>, job: Job) -> Option<JobHandle> {
    // `to_std` fails for negative durations, which is exactly the
    // past-deadline case the contract rejects.
    let delay = (when - Utc::now()).to_std().ok()?;
    let handle = JobHandle { job_id: job.job_id, scheduled_for: Some(when) };
    let sender = self.default.clone();
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      if let Err(dropped) = sender.send(job) {
        warn!(job = %dropped.0.name(), "queue closed, delayed job dropped");
      }
    });
    Some(handle)
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

/// Drain the queues until every sender is gone, high-priority lane first.
pub async fn run_worker<S, D, V, C, M>(
  ctx: Arc<JobContext<S, D, V, C, M>>,
  mut queues: JobQueues,
) where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  loop {
    let job = tokio::select! {
      biased;
      Some(job) = queues.high.recv() => job,
      Some(job) = queues.default.recv() => job,
      else => break,
    };
    execute(&ctx, job).await;
  }
  info!("job worker stopped: all queue senders dropped");
}

async fn execute<S, D, V, C, M>(ctx: &JobContext<S, D, V, C, M>, job: Job)
where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  let name = job.name();
  let started = Instant::now();

  let outcome =
    tokio::time::timeout(ctx.config.job_timeout, run_job(ctx, job.clone())).await;

  match outcome {
    Ok(Ok(())) => {
      info!(
        job = %name,
        job_id = %job.job_id,
        correlation_id = %job.correlation_id,
        attempt = job.attempt,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "job completed"
      );
    }
    // A missing event is data corruption, not a transient fault: no
    // amount of retrying will make the row appear.
    Ok(Err(Error::EventNotFound(event_id))) => {
      error!(
        job = %name,
        job_id = %job.job_id,
        correlation_id = %job.correlation_id,
        %event_id,
        "event missing, job dropped"
      );
    }
    Ok(Err(err)) => retry_or_drop(ctx, job, &name, &err.to_string()),
    Err(_) => retry_or_drop(ctx, job, &name, "timed out"),
  }
}

fn retry_or_drop<S, D, V, C, M>(
  ctx: &JobContext<S, D, V, C, M>,
  mut job: Job,
  name: &str,
  reason: &str,
) where
  S: Store,
  D: JobDispatcher,
  V: VoiceClient,
  C: SchedulingClient,
  M: MessagingClient,
{
  if job.attempt < ctx.config.max_retries {
    job.attempt += 1;
    let backoff = ctx.config.retry_backoff * job.attempt as i32;
    warn!(
      job = %name,
      job_id = %job.job_id,
      correlation_id = %job.correlation_id,
      attempt = job.attempt,
      backoff_secs = backoff.num_seconds(),
      %reason,
      "job failed, retrying"
    );
    ctx.dispatcher.enqueue_after(backoff, job);
  } else {
    error!(
      job = %name,
      job_id = %job.job_id,
      correlation_id = %job.correlation_id,
      attempt = job.attempt,
      %reason,
      "job failed permanently"
    );
  }
}

// ─── No-show sweep ───────────────────────────────────────────────────────────

/// Enqueue a [`JobKind::SweepNoShows`] job on every tick of `pattern`.
/// Returns only on an invalid pattern.
pub async fn run_cron<D: JobDispatcher>(dispatcher: D, pattern: &str) -> Result<()> {
  let cron = Cron::from_str(pattern)?;
  info!(%pattern, "no-show sweep schedule started");
  loop {
    let next = cron.find_next_occurrence(&Utc::now(), false)?;
    let wait = (next - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;

    let job = Job::new(JobKind::SweepNoShows, Uuid::new_v4());
    debug!(job_id = %job.job_id, "no-show sweep tick");
    dispatcher.enqueue(Lane::Default, job);
  }
}
