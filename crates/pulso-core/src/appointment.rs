//! Appointment — healthcare scheduling record.
//!
//! The reminder-window predicates here are the staleness checks delayed
//! reminder jobs run at execution time: a reminder fires only if the
//! appointment is still confirmed and still inside its window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppointmentStatus {
  #[default]
  Scheduled,
  Confirmed,
  Reminded,
  Completed,
  NoShow,
  Cancelled,
  Rescheduled,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppointmentType {
  #[default]
  Consultation,
  FollowUp,
  Procedure,
  Emergency,
  Preventive,
}

/// Which reminder slot a reminder job is for.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReminderWindow {
  TwentyFourHour,
  ThreeHour,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
  pub appointment_id:    Uuid,
  /// Id in the external scheduling system, once booked there.
  pub scheduling_id:     Option<String>,
  pub lead_id:           Uuid,
  pub scheduled_date:    DateTime<Utc>,
  pub duration_minutes:  i64,
  pub appointment_type:  AppointmentType,
  pub status:            AppointmentStatus,
  pub professional_id:   String,
  pub professional_name: Option<String>,
  pub clinic_id:         String,
  pub clinic_name:       Option<String>,
  pub reminder_sent_24h: bool,
  pub reminder_sent_3h:  bool,
  pub confirmation_sent: bool,
  pub notes:             Option<String>,
  pub cancellation_reason: Option<String>,
  pub confirmed_at:      Option<DateTime<Utc>>,
  pub reminded_at:       Option<DateTime<Utc>>,
  pub completed_at:      Option<DateTime<Utc>>,
  pub no_show_at:        Option<DateTime<Utc>>,
  pub cancelled_at:      Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
}

impl Appointment {
  pub fn create(
    lead_id: Uuid,
    scheduled_date: DateTime<Utc>,
    professional_id: impl Into<String>,
    clinic_id: impl Into<String>,
  ) -> Self {
    Self {
      appointment_id:    Uuid::new_v4(),
      scheduling_id:     None,
      lead_id,
      scheduled_date,
      duration_minutes:  30,
      appointment_type:  AppointmentType::Consultation,
      status:            AppointmentStatus::Scheduled,
      professional_id:   professional_id.into(),
      professional_name: None,
      clinic_id:         clinic_id.into(),
      clinic_name:       None,
      reminder_sent_24h: false,
      reminder_sent_3h:  false,
      confirmation_sent: false,
      notes:             None,
      cancellation_reason: None,
      confirmed_at:      None,
      reminded_at:       None,
      completed_at:      None,
      no_show_at:        None,
      cancelled_at:      None,
      created_at:        Utc::now(),
    }
  }

  pub fn time_until(&self, now: DateTime<Utc>) -> Duration {
    self.scheduled_date - now
  }

  /// The 24h reminder fires only while the appointment is confirmed,
  /// un-reminded, and 20–28 hours out.
  pub fn needs_24h_reminder(&self, now: DateTime<Utc>) -> bool {
    if self.reminder_sent_24h || self.status != AppointmentStatus::Confirmed {
      return false;
    }
    let until = self.time_until(now);
    until >= Duration::hours(20) && until <= Duration::hours(28)
  }

  /// The 3h reminder fires only while the appointment is confirmed,
  /// un-reminded, and 2–4 hours out.
  pub fn needs_3h_reminder(&self, now: DateTime<Utc>) -> bool {
    if self.reminder_sent_3h || self.status != AppointmentStatus::Confirmed {
      return false;
    }
    let until = self.time_until(now);
    until >= Duration::hours(2) && until <= Duration::hours(4)
  }

  /// A confirmed or reminded appointment 15 minutes past its slot with no
  /// completion recorded is a no-show candidate.
  pub fn should_check_no_show(&self, now: DateTime<Utc>) -> bool {
    if !matches!(
      self.status,
      AppointmentStatus::Confirmed | AppointmentStatus::Reminded
    ) {
      return false;
    }
    now > self.scheduled_date + Duration::minutes(15)
  }

  pub fn confirm(&mut self) {
    self.status = AppointmentStatus::Confirmed;
    self.confirmed_at = Some(Utc::now());
    self.confirmation_sent = true;
  }

  pub fn mark_reminded(&mut self, window: ReminderWindow) {
    self.status = AppointmentStatus::Reminded;
    self.reminded_at = Some(Utc::now());
    match window {
      ReminderWindow::TwentyFourHour => self.reminder_sent_24h = true,
      ReminderWindow::ThreeHour => self.reminder_sent_3h = true,
    }
  }

  pub fn mark_completed(&mut self) {
    self.status = AppointmentStatus::Completed;
    self.completed_at = Some(Utc::now());
  }

  pub fn mark_no_show(&mut self) {
    self.status = AppointmentStatus::NoShow;
    self.no_show_at = Some(Utc::now());
  }

  pub fn cancel(&mut self, reason: Option<String>) {
    self.status = AppointmentStatus::Cancelled;
    self.cancelled_at = Some(Utc::now());
    self.cancellation_reason = reason;
  }

  /// Move to a new slot and reset the reminder flags so the reminder
  /// sequence runs again against the new date.
  pub fn reschedule(&mut self, new_date: DateTime<Utc>) {
    self.status = AppointmentStatus::Rescheduled;
    self.scheduled_date = new_date;
    self.reminder_sent_24h = false;
    self.reminder_sent_3h = false;
    self.confirmation_sent = false;
  }
}
