//! Business rules: lead classification predicates, the call-outcome
//! rule list, and the triggered-action derivation tables.
//!
//! Each classification rule is a standalone predicate so it can be unit
//! tested in isolation; the combinators below OR them together. Rules
//! inspect *resolved* entity state, never raw payloads, so the same rule
//! engine serves both ingestion pipelines.

use crate::{
  call::{Call, CallOutcome},
  event::{ActionType, EventType, TriggeredAction},
  lead::{Lead, LeadClassification, LeadSource, LeadStage},
};

// ─── Hot-lead predicates ─────────────────────────────────────────────────────

/// Tags that flag a lead for immediate outreach.
const PRIORITY_TAGS: &[&str] = &["urgent", "hot", "high_value"];

pub fn has_priority_tag(tags: &[String]) -> bool {
  tags
    .iter()
    .any(|t| PRIORITY_TAGS.contains(&t.to_lowercase().as_str()))
}

pub fn is_classified_hot(lead: &Lead) -> bool {
  lead.classification == LeadClassification::Hot
}

/// A brand-new referral gets hot-lead treatment even without tags.
pub fn is_new_referral(lead: &Lead) -> bool {
  lead.source == LeadSource::Referral && lead.stage == LeadStage::New
}

/// A lead requiring immediate action: any one rule suffices.
pub fn is_hot_lead(lead: &Lead) -> bool {
  is_classified_hot(lead) || has_priority_tag(&lead.tags) || is_new_referral(lead)
}

/// Initial temperature for a lead created from a CRM payload.
pub fn classify_new_lead(tags: &[String]) -> LeadClassification {
  if has_priority_tag(tags) {
    LeadClassification::Hot
  } else {
    LeadClassification::Warm
  }
}

// ─── Call-outcome classification ─────────────────────────────────────────────

/// Signals extracted from a `call-ended` callback, in the shape the rule
/// list needs.
#[derive(Debug, Default)]
pub struct OutcomeSignals<'a> {
  /// The assistant invoked `book_appointment` and got a result.
  pub booked_via_function:   bool,
  /// The assistant invoked `schedule_callback` and got a result.
  pub callback_via_function: bool,
  pub transcript:            Option<&'a str>,
  pub sentiment:             Option<&'a str>,
  pub duration_seconds:      Option<i64>,
}

const APPOINTMENT_KEYWORDS: &[&str] = &[
  "book appointment",
  "schedule appointment",
  "yes, book it",
  "when can i come in",
  "what times are available",
];

const CALLBACK_KEYWORDS: &[&str] = &["call me back", "call later", "better time", "not now"];

const INTEREST_KEYWORDS: &[&str] = &["interested", "tell me more", "sounds good", "yes"];

const NOT_INTERESTED_KEYWORDS: &[&str] =
  &["not interested", "no thank you", "remove me", "don't call"];

fn matches_any(text: &str, keywords: &[&str]) -> bool {
  keywords.iter().any(|k| text.contains(k))
}

/// Classify a completed call. This is a prioritized keyword heuristic, not
/// an NLP classifier: explicit function calls win, then appointment
/// keywords, then callback keywords, then interest/disinterest keywords,
/// then sentiment, then a short-duration check.
pub fn classify_call_outcome(signals: &OutcomeSignals) -> CallOutcome {
  if signals.booked_via_function {
    return CallOutcome::AppointmentBooked;
  }
  if signals.callback_via_function {
    return CallOutcome::CallbackRequested;
  }

  if let Some(text) = signals.transcript {
    let text = text.to_lowercase();
    if matches_any(&text, APPOINTMENT_KEYWORDS) {
      return CallOutcome::AppointmentBooked;
    }
    if matches_any(&text, CALLBACK_KEYWORDS) {
      return CallOutcome::CallbackRequested;
    }
    // Disinterest outranks interest: "not interested" contains "interested".
    if matches_any(&text, NOT_INTERESTED_KEYWORDS) {
      return CallOutcome::NotInterested;
    }
    if matches_any(&text, INTEREST_KEYWORDS) {
      return CallOutcome::Interested;
    }
  }

  match signals.sentiment {
    Some("negative") => return CallOutcome::NotInterested,
    Some("positive") => return CallOutcome::Interested,
    _ => {}
  }

  // Very short calls are likely hang-ups or no answer.
  if signals.duration_seconds.is_some_and(|d| d < 10) {
    return CallOutcome::NoAnswer;
  }

  CallOutcome::Successful
}

// ─── Triggered-action derivation ─────────────────────────────────────────────

/// Actions a CRM event should carry, derived from the post-resolution
/// lead state.
pub fn derive_crm_actions(event_type: EventType, lead: Option<&Lead>) -> Vec<TriggeredAction> {
  let mut actions = Vec::new();

  match (event_type, lead) {
    (EventType::LeadCreated, Some(lead)) if is_hot_lead(lead) => {
      actions.push(
        TriggeredAction::new(ActionType::InitiateHotLeadSequence)
          .with("lead_id", lead.lead_id.to_string()),
      );
    }
    (EventType::LeadTagAdded, Some(lead)) if lead.has_tag("handoff") => {
      actions.push(
        TriggeredAction::new(ActionType::TriggerHandoff).with("lead_id", lead.lead_id.to_string()),
      );
    }
    (EventType::LeadStageChanged, Some(lead)) if lead.stage == LeadStage::Booked => {
      actions.push(
        TriggeredAction::new(ActionType::ScheduleAppointmentReminders)
          .with("lead_id", lead.lead_id.to_string()),
      );
    }
    (EventType::MessageReceived, lead) => {
      let mut action = TriggeredAction::new(ActionType::ProcessInboundMessage);
      if let Some(lead) = lead {
        action = action.with("lead_id", lead.lead_id.to_string());
      }
      actions.push(action);
    }
    _ => {}
  }

  actions
}

/// Actions a `call_completed` event should carry, derived from the call's
/// classified outcome.
pub fn derive_call_actions(call: &Call) -> Vec<TriggeredAction> {
  let Some(outcome) = call.outcome else {
    return Vec::new();
  };

  match outcome {
    CallOutcome::AppointmentBooked => vec![
      TriggeredAction::new(ActionType::ProcessAppointmentBooking)
        .with("lead_id", call.lead_id.to_string())
        .with("call_id", call.call_id.to_string()),
    ],
    CallOutcome::CallbackRequested => vec![
      TriggeredAction::new(ActionType::ScheduleCallback)
        .with("lead_id", call.lead_id.to_string())
        .with("call_id", call.call_id.to_string()),
    ],
    CallOutcome::NotInterested => vec![
      TriggeredAction::new(ActionType::UpdateLeadClassification)
        .with("lead_id", call.lead_id.to_string())
        .with("classification", "cold"),
    ],
    _ => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::call::CallDirection;
  use uuid::Uuid;

  fn lead() -> Lead {
    Lead::create("crm-1", "Ana", "+5563999990000")
  }

  #[test]
  fn priority_tags_are_case_insensitive() {
    assert!(has_priority_tag(&["Urgent".into()]));
    assert!(has_priority_tag(&["high_value".into()]));
    assert!(!has_priority_tag(&["vip".into()]));
  }

  #[test]
  fn hot_lead_rules_are_independent() {
    let mut by_class = lead();
    by_class.classification = LeadClassification::Hot;
    assert!(is_hot_lead(&by_class));

    let mut by_tag = lead();
    by_tag.tags.push("urgent".into());
    assert!(is_hot_lead(&by_tag));

    let mut by_referral = lead();
    by_referral.source = LeadSource::Referral;
    assert!(is_hot_lead(&by_referral));

    // A referral past the `new` stage is no longer automatically hot.
    by_referral.stage = LeadStage::Contacted;
    assert!(!is_hot_lead(&by_referral));

    assert!(!is_hot_lead(&lead()));
  }

  #[test]
  fn function_calls_outrank_transcript() {
    let signals = OutcomeSignals {
      booked_via_function: true,
      transcript: Some("not interested"),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::AppointmentBooked);
  }

  #[test]
  fn disinterest_outranks_interest_keywords() {
    let signals = OutcomeSignals {
      transcript: Some("I'm not interested, no thank you"),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::NotInterested);
  }

  #[test]
  fn appointment_keywords_win_over_callback() {
    let signals = OutcomeSignals {
      transcript: Some("Yes, book it. Or call me back."),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::AppointmentBooked);
  }

  #[test]
  fn sentiment_applies_when_no_keywords_match() {
    let signals = OutcomeSignals {
      transcript: Some("hmm"),
      sentiment: Some("negative"),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::NotInterested);
  }

  #[test]
  fn short_calls_default_to_no_answer() {
    let signals = OutcomeSignals {
      duration_seconds: Some(4),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::NoAnswer);

    let signals = OutcomeSignals {
      duration_seconds: Some(120),
      ..Default::default()
    };
    assert_eq!(classify_call_outcome(&signals), CallOutcome::Successful);
  }

  #[test]
  fn hot_lead_creation_derives_sequence_action() {
    let mut hot = lead();
    hot.classification = LeadClassification::Hot;
    let actions = derive_crm_actions(EventType::LeadCreated, Some(&hot));
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, ActionType::InitiateHotLeadSequence);
    assert_eq!(
      actions[0].data.get("lead_id"),
      Some(&hot.lead_id.to_string())
    );
  }

  #[test]
  fn booked_stage_derives_reminder_scheduling() {
    let mut booked = lead();
    booked.stage = LeadStage::Booked;
    let actions = derive_crm_actions(EventType::LeadStageChanged, Some(&booked));
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, ActionType::ScheduleAppointmentReminders);
  }

  #[test]
  fn warm_lead_creation_derives_nothing() {
    let actions = derive_crm_actions(EventType::LeadCreated, Some(&lead()));
    assert!(actions.is_empty());
  }

  #[test]
  fn call_outcome_actions() {
    let mut call = Call::create(Uuid::new_v4(), CallDirection::Outbound, "+550", "+551");
    call.outcome = Some(CallOutcome::CallbackRequested);
    let actions = derive_call_actions(&call);
    assert_eq!(actions[0].action, ActionType::ScheduleCallback);

    call.outcome = Some(CallOutcome::NotInterested);
    let actions = derive_call_actions(&call);
    assert_eq!(actions[0].action, ActionType::UpdateLeadClassification);
    assert_eq!(actions[0].data.get("classification").map(String::as_str), Some("cold"));

    call.outcome = Some(CallOutcome::Successful);
    assert!(derive_call_actions(&call).is_empty());
  }
}
