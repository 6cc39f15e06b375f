//! Job orchestration for the Pulso backend: queue lanes, the dispatcher
//! capability, the worker loop, the recurring no-show sweep, and the
//! event orchestrator that turns stored events into follow-up work.
//!
//! Generic over the [`pulso_core::store::Store`] backend and the three
//! outbound service traits, so the whole layer runs against in-memory
//! fakes in tests.

pub mod dispatch;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;
pub mod services;

pub use dispatch::{JobDispatcher, RecordingDispatcher};
pub use error::{Error, Result};
pub use job::{Job, JobHandle, JobKind, Lane};
pub use orchestrator::{process_event, ProcessReport, ProcessStatus};
pub use runner::{run_job, JobContext};
pub use scheduler::{run_cron, run_worker, JobQueues, JobsConfig, TokioDispatcher};

#[cfg(test)]
mod tests;
