//! Read endpoints for leads and their event history.

use axum::{Json, extract::Path, extract::State};
use pulso_core::{event::Event, lead::Lead, store::Store};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// `GET /leads/{id}`
pub async fn get_one<S, D>(
  State(state): State<AppState<S, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Lead>, ApiError>
where
  S: Store,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let lead = state
    .store
    .get_lead(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("lead {id} not found")))?;
  Ok(Json(lead))
}

/// `GET /leads/{id}/events` — newest first.
pub async fn events<S, D>(
  State(state): State<AppState<S, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Event>>, ApiError>
where
  S: Store,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let events = state
    .store
    .list_events_for_lead(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(events))
}
