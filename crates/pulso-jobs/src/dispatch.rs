//! The [`JobDispatcher`] capability and its recording test fake.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::job::{Job, JobHandle, Lane};

/// Hands jobs to the queue backend. An injected capability, so pipeline
/// and orchestrator code never touches queue plumbing directly and tests
/// can swap in [`RecordingDispatcher`].
pub trait JobDispatcher: Send + Sync {
  /// Queue a job for execution as soon as a worker is free.
  fn enqueue(&self, lane: Lane, job: Job) -> JobHandle;

  /// Queue a job to run at `when`. Returns `None` when `when` has already
  /// passed — the caller decides whether a missed slot matters.
  fn enqueue_at(&self, when: DateTime<Utc>, job: Job) -> Option<JobHandle>;

  /// Queue a job to run after `delay`, falling back to an immediate
  /// default-lane enqueue for non-positive delays.
  fn enqueue_after(&self, delay: Duration, job: Job) -> JobHandle {
    match self.enqueue_at(Utc::now() + delay, job.clone()) {
      Some(handle) => handle,
      None => self.enqueue(Lane::Default, job),
    }
  }
}

impl<D: JobDispatcher> JobDispatcher for std::sync::Arc<D> {
  fn enqueue(&self, lane: Lane, job: Job) -> JobHandle {
    (**self).enqueue(lane, job)
  }

  fn enqueue_at(&self, when: DateTime<Utc>, job: Job) -> Option<JobHandle> {
    (**self).enqueue_at(when, job)
  }
}

// ─── Recording fake ──────────────────────────────────────────────────────────

/// Dispatcher fake that records every enqueue instead of running anything.
#[derive(Default)]
pub struct RecordingDispatcher {
  immediate: Mutex<Vec<(Lane, Job)>>,
  delayed:   Mutex<Vec<(DateTime<Utc>, Job)>>,
}

impl RecordingDispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn immediate(&self) -> Vec<(Lane, Job)> {
    self.immediate.lock().unwrap().clone()
  }

  pub fn delayed(&self) -> Vec<(DateTime<Utc>, Job)> {
    self.delayed.lock().unwrap().clone()
  }

  /// All recorded jobs regardless of lane or schedule, in enqueue order
  /// within each group.
  pub fn all_jobs(&self) -> Vec<Job> {
    let mut jobs: Vec<Job> =
      self.immediate().into_iter().map(|(_, j)| j).collect();
    jobs.extend(self.delayed().into_iter().map(|(_, j)| j));
    jobs
  }
}

impl JobDispatcher for RecordingDispatcher {
  fn enqueue(&self, lane: Lane, job: Job) -> JobHandle {
    let handle = JobHandle { job_id: job.job_id, scheduled_for: None };
    self.immediate.lock().unwrap().push((lane, job));
    handle
  }

  fn enqueue_at(&self, when: DateTime<Utc>, job: Job) -> Option<JobHandle> {
    if when <= Utc::now() {
      return None;
    }
    let handle = JobHandle { job_id: job.job_id, scheduled_for: Some(when) };
    self.delayed.lock().unwrap().push((when, job));
    Some(handle)
  }
}
