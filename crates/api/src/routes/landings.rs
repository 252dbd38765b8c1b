//! Landing page endpoints. Reading by slug is public; writes need the admin
//! token and drop the cached page.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};

use dermosul_core::{LandingPageId, LandingStatus};

use crate::db::{LandingRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::landing::LandingWrite;
use crate::models::{LandingInput, LandingView};
use crate::state::AppState;

const NOT_FOUND: &str = "Landing Page não encontrada.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/landings", get(list).post(create))
        .route(
            "/api/landings/{key}",
            get(show_public).put(update).delete(destroy),
        )
        .route("/api/landings/{key}/status", patch(set_status))
}

fn landing_id(key: &str) -> Result<LandingPageId> {
    key.trim()
        .parse::<i32>()
        .map(LandingPageId::new)
        .map_err(|_| AppError::BadRequest(format!("Id de landing page inválido: {key}")))
}

fn not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound(NOT_FOUND.to_string()),
        other => other.into(),
    }
}

/// `GET /api/landings`
async fn list(_admin: RequireAdmin, State(state): State<AppState>) -> Result<Json<Vec<LandingView>>> {
    let pages = LandingRepository::new(state.pool()).list().await?;
    Ok(Json(pages.iter().map(LandingView::from).collect()))
}

/// `GET /api/landings/{slug}`
async fn show_public(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<LandingView>> {
    state
        .landing_by_slug(&slug)
        .await?
        .map(|page| Json(LandingView::from(&page)))
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))
}

/// `POST /api/landings`
async fn create(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<LandingInput>,
) -> Result<(StatusCode, Json<LandingView>)> {
    let fields = input
        .validate(LandingWrite::Create)
        .map_err(AppError::BadRequest)?;
    let page = LandingRepository::new(state.pool()).create(&fields).await?;
    state.invalidate_landing(&page.slug).await;
    Ok((StatusCode::CREATED, Json(LandingView::from(&page))))
}

/// `PUT /api/landings/{id}`
async fn update(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(input): Json<LandingInput>,
) -> Result<Json<LandingView>> {
    let id = landing_id(&key)?;
    let fields = input
        .validate(LandingWrite::Update)
        .map_err(AppError::BadRequest)?;

    let (page, old_slug) = LandingRepository::new(state.pool())
        .update(id, &fields)
        .await
        .map_err(not_found)?;

    state.invalidate_landing(&old_slug).await;
    state.invalidate_landing(&page.slug).await;
    tracing::info!(landing_id = id.as_i32(), slug = %page.slug, "Landing page updated");
    Ok(Json(LandingView::from(&page)))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// `DELETE /api/landings/{id}`
async fn destroy(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let id = landing_id(&key)?;
    let slug = LandingRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(not_found)?;

    state.invalidate_landing(&slug).await;
    tracing::info!(landing_id = id.as_i32(), slug = %slug, "Landing page deleted");
    Ok(Json(DeleteResponse { success: true }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: String,
}

impl StatusRequest {
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for anything but `ATIVA` or `PAUSADA`.
    pub fn status(&self) -> Result<LandingStatus> {
        self.status
            .parse()
            .map_err(|_| AppError::BadRequest("Status inválido. Use 'ATIVA' ou 'PAUSADA'.".to_string()))
    }
}

/// `PATCH /api/landings/{id}/status`
async fn set_status(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<LandingView>> {
    let status = body.status()?;
    let id = landing_id(&key)?;
    let page = LandingRepository::new(state.pool())
        .set_status(id, status)
        .await
        .map_err(not_found)?;

    state.invalidate_landing(&page.slug).await;
    Ok(Json(LandingView::from(&page)))
}
