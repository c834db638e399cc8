//! Customer group route handlers.

#![allow(clippy::used_underscore_binding)]

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use thirtybees_core::GroupId;

use crate::db::groups::{CategoryReduction, DefaultGroups, GroupSummary};
use crate::error::AppError;
use crate::middleware::RequireApiToken;
use crate::models::group::GroupInput;
use crate::services::GroupService;
use crate::services::groups::{GroupView, SaveOutcome};
use crate::state::AppState;

use super::LangQuery;

/// Build the groups router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(index).post(create))
        .route("/api/groups/defaults", get(defaults))
        .route("/api/groups/category-reduction", post(check_category_reduction))
        .route("/api/groups/{id}", get(show).put(update).delete(destroy))
        .route("/api/groups/{id}/show-prices", post(toggle_show_prices))
}

fn service(state: &AppState) -> GroupService {
    GroupService::new(state.pool().clone(), state.shops().clone())
}

/// List groups of the shop.
#[instrument(skip(_auth, state))]
pub async fn index(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Query(query): Query<LangQuery>,
) -> Result<Json<Vec<GroupSummary>>, AppError> {
    let lang = query.resolve(&state).await?;
    Ok(Json(service(&state).list(lang).await?))
}

/// Show a group with its members and category discounts.
#[instrument(skip(_auth, state))]
pub async fn show(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<LangQuery>,
) -> Result<Json<GroupView>, AppError> {
    let lang = query.resolve(&state).await?;
    Ok(Json(service(&state).view(GroupId::new(id), lang).await?))
}

/// Create a group.
#[instrument(skip(_auth, state, input))]
pub async fn create(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Json(input): Json<GroupInput>,
) -> Result<(StatusCode, Json<SaveOutcome>), AppError> {
    let outcome = service(&state)
        .save(None, input, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Update a group.
#[instrument(skip(_auth, state, input))]
pub async fn update(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<GroupInput>,
) -> Result<Json<SaveOutcome>, AppError> {
    let outcome = service(&state)
        .save(Some(GroupId::new(id)), input, Utc::now())
        .await?;
    Ok(Json(outcome))
}

/// Delete a group.
#[instrument(skip(_auth, state))]
pub async fn destroy(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    service(&state)
        .delete(GroupId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Response of the show prices toggle.
#[derive(Debug, Serialize)]
pub struct ShowPricesResponse {
    pub show_prices: bool,
}

/// Flip whether group members see prices.
#[instrument(skip(_auth, state))]
pub async fn toggle_show_prices(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ShowPricesResponse>, AppError> {
    let show_prices = service(&state)
        .toggle_show_prices(GroupId::new(id))
        .await?;
    Ok(Json(ShowPricesResponse { show_prices }))
}

/// Category discount to check.
#[derive(Debug, Deserialize)]
pub struct CategoryReductionRequest {
    pub category_id: i32,
    pub reduction: Decimal,
}

/// Check a category discount before it is added to a group.
#[instrument(skip(_auth, state))]
pub async fn check_category_reduction(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Query(query): Query<LangQuery>,
    Json(body): Json<CategoryReductionRequest>,
) -> Result<Json<CategoryReduction>, AppError> {
    let lang = query.resolve(&state).await?;
    let reduction = service(&state)
        .check_category_reduction(body.category_id, body.reduction, lang)
        .await?;
    Ok(Json(reduction))
}

/// The configured default groups.
pub async fn defaults(
    _auth: RequireApiToken,
    State(state): State<AppState>,
) -> Result<Json<DefaultGroups>, AppError> {
    Ok(Json(service(&state).default_groups().await?))
}
