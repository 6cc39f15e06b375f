//! Typed envelopes for the two external sources, and the report every
//! ingestion call returns.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// What one ingestion call amounted to. `event_id` is `None` for the
/// voice callback types that only refresh the call record.
#[derive(Debug, Clone)]
pub struct IngestReport {
  pub event_id:       Option<Uuid>,
  pub correlation_id: Uuid,
  pub deduplicated:   bool,
}

/// Deterministic fallback when the sender supplied no idempotency key:
/// identical redeliveries collide on it.
pub fn derive_idempotency_key(
  source: &str,
  event_type: &str,
  external_id: Option<&str>,
  timestamp: DateTime<Utc>,
) -> String {
  format!(
    "{source}_{event_type}_{}_{}",
    external_id.unwrap_or("unknown"),
    timestamp.timestamp()
  )
}

// ─── CRM webhooks ────────────────────────────────────────────────────────────

/// Outer CRM webhook envelope. `data` stays raw until the event type
/// determines its shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmWebhook {
  pub event_type:      String,
  #[serde(default = "Utc::now")]
  pub timestamp:       DateTime<Utc>,
  pub data:            Value,
  #[serde(default)]
  pub crm_lead_id:     Option<String>,
  #[serde(default)]
  pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrmLeadData {
  pub crm_id:            String,
  pub first_name:        String,
  #[serde(default)]
  pub last_name:         Option<String>,
  #[serde(default)]
  pub email:             Option<String>,
  pub phone:             String,
  #[serde(default)]
  pub stage:             Option<String>,
  #[serde(default)]
  pub source:            Option<String>,
  #[serde(default)]
  pub tags:              Vec<String>,
  #[serde(default)]
  pub custom_fields:     Map<String, Value>,
  #[serde(default)]
  pub notes:             Option<String>,
  #[serde(default)]
  pub assigned_agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrmMessageData {
  pub crm_message_id: String,
  pub crm_lead_id:    String,
  pub content:        String,
  pub direction:      String,
  #[serde(default = "default_channel")]
  pub channel:        String,
  #[serde(default)]
  pub status:         Option<String>,
  #[serde(default)]
  pub timestamp:      Option<DateTime<Utc>>,
}

fn default_channel() -> String {
  "whatsapp".to_owned()
}

// ─── Voice callbacks ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceCallback {
  pub event_type:   String,
  #[serde(default = "Utc::now")]
  pub timestamp:    DateTime<Utc>,
  pub data:         VoiceCallData,
  #[serde(default)]
  pub assistant_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceCallData {
  /// The provider's call id; the resolution key.
  pub call_id:        String,
  pub status:         String,
  #[serde(default)]
  pub phone_number:   Option<String>,
  /// Duration in seconds.
  #[serde(default)]
  pub duration:       Option<i64>,
  #[serde(default)]
  pub started_at:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub ended_at:       Option<DateTime<Utc>>,
  #[serde(default)]
  pub answered_at:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub recording_url:  Option<String>,
  #[serde(default)]
  pub transcript:     Option<VoiceTranscript>,
  #[serde(default)]
  pub function_calls: Vec<VoiceFunctionCall>,
  #[serde(default)]
  pub error_message:  Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceTranscript {
  pub text:      String,
  #[serde(default)]
  pub summary:   Option<String>,
  #[serde(default)]
  pub sentiment: Option<String>,
  #[serde(default)]
  pub intent:    Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceFunctionCall {
  pub name:       String,
  #[serde(default)]
  pub parameters: Value,
  #[serde(default)]
  pub result:     Option<Value>,
}
