//! Ingestion failure taxonomy.
//!
//! The HTTP layer maps these onto status codes: payload and value errors
//! are the caller's fault, resolution errors mean a referenced entity is
//! missing, store errors are ours.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
  #[error("unsupported event type {0:?}")]
  UnsupportedEventType(String),

  #[error("invalid payload: {0}")]
  Payload(#[from] serde_json::Error),

  #[error("invalid {field} value {value:?}")]
  InvalidValue { field: &'static str, value: String },

  #[error("no lead found for CRM id {0:?}")]
  LeadNotResolved(String),

  #[error("no call or matching lead for provider call {0:?}")]
  CallNotResolved(String),

  #[error("storage error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IngestError {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    Self::Store(Box::new(err))
  }

  /// Whether the failure is the sender's fault (HTTP 4xx territory).
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      Self::UnsupportedEventType(_)
        | Self::Payload(_)
        | Self::InvalidValue { .. }
        | Self::LeadNotResolved(_)
        | Self::CallNotResolved(_)
    )
  }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
