//! Webhook and callback ingestion for the Pulso backend.
//!
//! Two symmetric pipelines: CRM webhooks (leads, messages) and voice
//! provider callbacks (call lifecycle). Both validate into typed
//! envelopes, resolve entities, deduplicate on the idempotency key,
//! persist entity + event atomically, and hand the event to the
//! orchestrator through the job dispatcher.

mod crm;
mod voice;

pub mod envelope;
pub mod error;

pub use crm::ingest_crm;
pub use envelope::{
  CrmLeadData, CrmMessageData, CrmWebhook, IngestReport, VoiceCallData,
  VoiceCallback, VoiceFunctionCall, VoiceTranscript,
};
pub use error::{IngestError, Result};
pub use voice::ingest_voice;

#[cfg(test)]
mod tests;
