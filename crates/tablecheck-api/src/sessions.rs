//! Session handlers
//!
//! A session is one user's navigation state. Handlers copy the session's
//! `Navigator` out of the map, run the page controller on the blocking pool
//! and write the result back. Concurrent requests on one session are last
//! write wins. Sessions idle past the TTL are dropped.

use crate::error::{api_error, internal_error, session_not_found, ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tablecheck_core::navigation::{Navigator, TableForm, View};
use tablecheck_core::Result;
use tablecheck_quality::outliers::ObservationSet;
use tablecheck_quality::pages;
use tablecheck_quality::{Interval, RenderedView, SaveSummary};
use tablecheck_warehouse::DynConnector;
use tracing::info;
use uuid::Uuid;

/// Session state as returned to clients
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub navigator: Navigator,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierRequest {
    pub column: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub view: View,
    #[serde(default)]
    pub interval: Interval,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub interval: Interval,
}

/// Run `f` against a copy of the session on the blocking pool, then store
/// the copy back if the session still exists.
async fn with_session<T, F>(state: &AppState, id: Uuid, f: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DynConnector, &mut Navigator) -> Result<T> + Send + 'static,
{
    let mut navigator = state
        .checkout(id)
        .await
        .ok_or_else(|| session_not_found(id))?;
    let connector = Arc::clone(&state.connector);

    let (navigator, result) = tokio::task::spawn_blocking(move || {
        let result = f(connector.as_ref(), &mut navigator);
        (navigator, result)
    })
    .await
    .map_err(|e| internal_error(format!("Task join error: {}", e)))?;

    state.check_in(id, navigator).await;
    result.map_err(api_error)
}

pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let navigator = Navigator::new();
    let id = state.open_session(navigator.clone()).await;
    info!(session = %id, "Session created");
    (StatusCode::CREATED, Json(SessionResponse { id, navigator }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionResponse> {
    let navigator = state
        .checkout(id)
        .await
        .ok_or_else(|| session_not_found(id))?;
    Ok(Json(SessionResponse { id, navigator }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> std::result::Result<StatusCode, ApiError> {
    if !state.close_session(id).await {
        return Err(session_not_found(id));
    }
    info!(session = %id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}

/// Submit warehouse, database, schema and table; returns the input form
/// with the fetched columns.
pub async fn submit_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<TableForm>,
) -> ApiResult<RenderedView> {
    with_session(&state, id, move |connector, nav| {
        pages::submit_form(connector, nav, form)
    })
    .await
    .map(Json)
}

/// Confirm the identifier column and render the Table Overview it
/// redirects to.
pub async fn confirm_identifier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<IdentifierRequest>,
) -> ApiResult<RenderedView> {
    with_session(&state, id, move |connector, nav| {
        pages::confirm_identifier(nav, &request.column)?;
        Ok(pages::render(connector, nav, Interval::default()))
    })
    .await
    .map(Json)
}

pub async fn navigate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<RenderedView> {
    with_session(&state, id, move |connector, nav| {
        pages::select_view(nav, request.view);
        Ok(pages::render(connector, nav, request.interval))
    })
    .await
    .map(Json)
}

pub async fn current_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<RenderedView> {
    with_session(&state, id, move |connector, nav| {
        Ok(pages::render(connector, nav, query.interval))
    })
    .await
    .map(Json)
}

/// Save edited observation rows. Per-row failures are reported in the
/// summary, not as an error status.
pub async fn save_outliers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(edits): Json<ObservationSet>,
) -> ApiResult<SaveSummary> {
    with_session(&state, id, move |connector, nav| {
        pages::save_edits(connector, nav, &edits)
    })
    .await
    .map(Json)
}
