//! HTTP layer for the Pulso backend.
//!
//! Exposes an axum [`Router`] with the two ingestion endpoints and the
//! lead read endpoints, backed by any [`Store`] and [`JobDispatcher`]
//! pair. Auth, TLS, and transport concerns are the caller's
//! responsibility.

pub mod error;
pub mod leads;
pub mod webhooks;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use pulso_core::store::Store;
use pulso_jobs::JobDispatcher;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `PULSO_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// Caller id used for outbound calls.
  #[serde(default)]
  pub outbound_number:    Option<String>,
  /// Cron pattern for the no-show sweep.
  #[serde(default)]
  pub no_show_sweep_cron: Option<String>,
  /// Re-enqueue failed event processing automatically.
  #[serde(default)]
  pub auto_retry_events:  bool,
}

fn default_host() -> String {
  "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
  8080
}

fn default_store_path() -> PathBuf {
  PathBuf::from("pulso.db")
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      host:               default_host(),
      port:               default_port(),
      store_path:         default_store_path(),
      outbound_number:    None,
      no_show_sweep_cron: None,
      auto_retry_events:  false,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, D> {
  pub store:      Arc<S>,
  pub dispatcher: Arc<D>,
}

// Both fields are Arcs, so no bounds on S and D.
impl<S, D> Clone for AppState<S, D> {
  fn clone(&self) -> Self {
    AppState {
      store:      Arc::clone(&self.store),
      dispatcher: Arc::clone(&self.dispatcher),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router for `state`.
pub fn router<S, D>(state: AppState<S, D>) -> Router
where
  S: Store + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
  D: JobDispatcher + 'static,
{
  Router::new()
    // Ingestion
    .route("/webhooks/crm", post(webhooks::crm::<S, D>))
    .route("/webhooks/crm/test", get(webhooks::crm_probe))
    .route("/callbacks/voice", post(webhooks::voice::<S, D>))
    .route("/callbacks/voice/test", get(webhooks::voice_probe))
    // Reads
    .route("/leads/{id}", get(leads::get_one::<S, D>))
    .route("/leads/{id}/events", get(leads::events::<S, D>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use pulso_jobs::RecordingDispatcher;
  use pulso_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore, RecordingDispatcher> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState {
      store:      Arc::new(store),
      dispatcher: Arc::new(RecordingDispatcher::new()),
    }
  }

  async fn oneshot_json(
    state: AppState<SqliteStore, RecordingDispatcher>,
    method: &str,
    uri: &str,
    body: Value,
  ) -> (StatusCode, Value) {
    let req = Request::builder()
      .method(method)
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn lead_webhook(event_type: &str) -> Value {
    json!({
      "event_type": event_type,
      "timestamp": chrono::Utc::now(),
      "data": {
        "crm_id": "crm-1",
        "first_name": "Maria",
        "phone": "+5511999990000",
      },
    })
  }

  #[tokio::test]
  async fn crm_webhook_is_accepted() {
    let state = make_state().await;
    let (status, body) =
      oneshot_json(state.clone(), "POST", "/webhooks/crm", lead_webhook("lead_created")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["deduplicated"], false);
    assert!(body["event_id"].is_string());
    assert_eq!(state.dispatcher.all_jobs().len(), 1);
  }

  #[tokio::test]
  async fn redelivered_crm_webhook_answers_duplicate() {
    let state = make_state().await;
    let webhook = lead_webhook("lead_created");

    let (_, first) =
      oneshot_json(state.clone(), "POST", "/webhooks/crm", webhook.clone()).await;
    let (status, second) = oneshot_json(state, "POST", "/webhooks/crm", webhook).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "duplicate");
    assert_eq!(second["event_id"], first["event_id"]);
  }

  #[tokio::test]
  async fn unsupported_event_type_answers_422() {
    let state = make_state().await;
    let (status, body) =
      oneshot_json(state, "POST", "/webhooks/crm", lead_webhook("lead_deleted")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("lead_deleted"));
  }

  #[tokio::test]
  async fn voice_callback_for_unknown_call_answers_404() {
    let state = make_state().await;
    let (status, _) = oneshot_json(
      state,
      "POST",
      "/callbacks/voice",
      json!({
        "event_type": "call-ended",
        "data": { "call_id": "vp-ghost", "status": "ended" },
      }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn probes_answer_ok() {
    let state = make_state().await;
    let (status, body) =
      oneshot_json(state.clone(), "GET", "/webhooks/crm/test", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = oneshot_json(state, "GET", "/callbacks/voice/test", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn lead_read_endpoints_round_trip() {
    let state = make_state().await;
    let (_, created) =
      oneshot_json(state.clone(), "POST", "/webhooks/crm", lead_webhook("lead_created")).await;

    let lead = state
      .store
      .find_lead_by_crm_id("crm-1".to_owned())
      .await
      .unwrap()
      .unwrap();

    let (status, body) = oneshot_json(
      state.clone(),
      "GET",
      &format!("/leads/{}", lead.lead_id),
      Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Maria");

    let (status, events) = oneshot_json(
      state,
      "GET",
      &format!("/leads/{}/events", lead.lead_id),
      Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["event_id"], created["event_id"]);
  }

  #[tokio::test]
  async fn missing_lead_answers_404() {
    let state = make_state().await;
    let (status, _) = oneshot_json(
      state,
      "GET",
      &format!("/leads/{}", uuid::Uuid::new_v4()),
      Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
