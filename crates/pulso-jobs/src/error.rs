//! Error type for `pulso-jobs`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("event {0} not found")]
  EventNotFound(Uuid),

  #[error("lead {0} not found")]
  LeadNotFound(Uuid),

  #[error("call {0} not found")]
  CallNotFound(Uuid),

  #[error("appointment {0} not found")]
  AppointmentNotFound(Uuid),

  #[error("triggered action is missing field {0:?}")]
  ActionData(&'static str),

  #[error("storage error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("outbound service error: {0}")]
  Service(#[from] crate::services::ServiceError),

  #[error("invalid cron pattern: {0}")]
  Cron(#[from] croner::errors::CronError),
}

impl Error {
  /// Wrap any backend's store error.
  pub fn store<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
