//! Webhook and callback endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/webhooks/crm` | CRM lead/message webhooks |
//! | `GET`  | `/webhooks/crm/test` | Reachability probe for the CRM |
//! | `POST` | `/callbacks/voice` | Voice-provider call lifecycle |
//! | `GET`  | `/callbacks/voice/test` | Reachability probe |
//!
//! Deliveries always answer 200 once ingested, duplicates included, so
//! the sender stops retrying. Validation failures answer 422 and
//! unresolvable references 404; both are safe for the sender to drop.

use axum::{Json, extract::State};
use pulso_core::store::Store;
use pulso_ingest::{CrmWebhook, IngestReport, VoiceCallback, ingest_crm, ingest_voice};
use pulso_jobs::JobDispatcher;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Body of every successful ingestion response.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub status:         &'static str,
  /// Absent for the voice callback types that only refresh the call.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub event_id:       Option<Uuid>,
  pub correlation_id: Uuid,
  pub deduplicated:   bool,
}

impl From<IngestReport> for IngestResponse {
  fn from(report: IngestReport) -> Self {
    IngestResponse {
      status:         if report.deduplicated { "duplicate" } else { "accepted" },
      event_id:       report.event_id,
      correlation_id: report.correlation_id,
      deduplicated:   report.deduplicated,
    }
  }
}

/// `POST /webhooks/crm`
pub async fn crm<S, D>(
  State(state): State<AppState<S, D>>,
  Json(webhook): Json<CrmWebhook>,
) -> Result<Json<IngestResponse>, ApiError>
where
  S: Store,
  S::Error: std::error::Error + Send + Sync + 'static,
  D: JobDispatcher,
{
  let report = ingest_crm(&*state.store, &*state.dispatcher, webhook).await?;
  Ok(Json(report.into()))
}

/// `POST /callbacks/voice`
pub async fn voice<S, D>(
  State(state): State<AppState<S, D>>,
  Json(callback): Json<VoiceCallback>,
) -> Result<Json<IngestResponse>, ApiError>
where
  S: Store,
  S::Error: std::error::Error + Send + Sync + 'static,
  D: JobDispatcher,
{
  let report = ingest_voice(&*state.store, &*state.dispatcher, callback).await?;
  Ok(Json(report.into()))
}

/// `GET /webhooks/crm/test` — lets the CRM verify the endpoint exists.
pub async fn crm_probe() -> Json<Value> {
  Json(json!({ "status": "ok", "endpoint": "crm" }))
}

/// `GET /callbacks/voice/test`
pub async fn voice_probe() -> Json<Value> {
  Json(json!({ "status": "ok", "endpoint": "voice" }))
}
