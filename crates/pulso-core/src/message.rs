//! Message — a single communication with a lead over any channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageDirection {
  Inbound,
  Outbound,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
  #[default]
  Queued,
  Sent,
  Delivered,
  Read,
  Failed,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageChannel {
  #[default]
  Whatsapp,
  Sms,
  Email,
  Voice,
}

/// A message exchanged with a lead. The owning lead must exist before a
/// message can be recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id:     Uuid,
  /// Unique id in the upstream CRM; the resolution key for webhooks.
  pub crm_message_id: String,
  pub lead_id:        Uuid,
  pub content:        String,
  pub channel:        MessageChannel,
  pub direction:      MessageDirection,
  pub status:         MessageStatus,
  /// Provider-side message id, when the channel reports one.
  pub external_id:    Option<String>,
  pub error_message:  Option<String>,
  pub sent_at:        Option<DateTime<Utc>>,
  pub delivered_at:   Option<DateTime<Utc>>,
  pub read_at:        Option<DateTime<Utc>>,
  pub failed_at:      Option<DateTime<Utc>>,
  pub created_at:     DateTime<Utc>,
}

impl Message {
  pub fn create(
    crm_message_id: impl Into<String>,
    lead_id: Uuid,
    content: impl Into<String>,
    channel: MessageChannel,
    direction: MessageDirection,
  ) -> Self {
    Self {
      message_id:     Uuid::new_v4(),
      crm_message_id: crm_message_id.into(),
      lead_id,
      content:        content.into(),
      channel,
      direction,
      status:         MessageStatus::Queued,
      external_id:    None,
      error_message:  None,
      sent_at:        None,
      delivered_at:   None,
      read_at:        None,
      failed_at:      None,
      created_at:     Utc::now(),
    }
  }

  pub fn is_delivered(&self) -> bool {
    matches!(self.status, MessageStatus::Delivered | MessageStatus::Read)
  }

  pub fn mark_sent(&mut self, external_id: Option<String>) {
    self.status = MessageStatus::Sent;
    self.sent_at = Some(Utc::now());
    if external_id.is_some() {
      self.external_id = external_id;
    }
  }

  pub fn mark_delivered(&mut self) {
    self.status = MessageStatus::Delivered;
    self.delivered_at = Some(Utc::now());
  }

  pub fn mark_read(&mut self) {
    self.status = MessageStatus::Read;
    self.read_at = Some(Utc::now());
  }

  pub fn mark_failed(&mut self, error_message: impl Into<String>) {
    self.status = MessageStatus::Failed;
    self.failed_at = Some(Utc::now());
    self.error_message = Some(error_message.into());
  }
}
