use std::collections::{BTreeMap, HashSet};

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::lookup::TextKind;
use crate::application::store::StoreHandle;
use crate::domain::types::ResourceId;

use super::error::ApiError;
use super::state::LookupState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerQuery {
    pub repository: Option<String>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateQuery {
    pub repository: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub event: &'static str,
    pub pending: usize,
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn labels(
    State(state): State<LookupState>,
    Query(query): Query<PeerQuery>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    resolve_text(&state, query, ids, TextKind::Label).await
}

pub async fn descriptions(
    State(state): State<LookupState>,
    Query(query): Query<PeerQuery>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    resolve_text(&state, query, ids, TextKind::Description).await
}

/// Answers with the ids that resolved; absent ids had no value.
async fn resolve_text(
    state: &LookupState,
    query: PeerQuery,
    ids: Vec<String>,
    kind: TextKind,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let store = required_repository(query.repository.as_deref())?;
    let ids: HashSet<ResourceId> = ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ResourceId::from)
        .collect();

    let resolved = state
        .lookup
        .resolve(&store, &ids, query.preferred_language.as_deref(), kind)
        .await?;

    Ok(Json(
        resolved
            .into_iter()
            .filter_map(|(id, value)| value.map(|value| (id.as_str().to_string(), value.text)))
            .collect(),
    ))
}

pub async fn invalidate(
    State(state): State<LookupState>,
    Query(query): Query<InvalidateQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: InvalidateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvalidateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            ApiError::bad_request("Invalid invalidation request", Some(err.to_string()))
        })?
    };

    let repository = query
        .repository
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let event = if !request.ids.is_empty() {
        let count = request.ids.len();
        state
            .trigger
            .resources_changed(request.ids.into_iter().map(ResourceId::from));
        info!(ids = count, "Invalidated resources");
        "resources_changed"
    } else if let Some(name) = repository {
        state.trigger.store_changed(&StoreHandle::new(name));
        info!(store = name, "Invalidated store");
        "store_changed"
    } else {
        state.trigger.manual_reload();
        info!("Manual reload requested");
        "manual_reload"
    };

    let body = InvalidateResponse {
        event,
        pending: state.trigger.queue().len(),
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

fn required_repository(repository: Option<&str>) -> Result<StoreHandle, ApiError> {
    match repository.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Ok(StoreHandle::new(name)),
        None => Err(ApiError::bad_request(
            "Missing repository",
            Some("pass the `repository` query parameter".to_string()),
        )),
    }
}
