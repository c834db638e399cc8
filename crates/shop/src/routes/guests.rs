//! Visitor tracking route handlers.

#![allow(clippy::used_underscore_binding)]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header},
    routing::post,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use thirtybees_core::{CustomerId, GuestId};

use crate::db::GuestRepository;
use crate::error::AppError;
use crate::middleware::RequireApiToken;
use crate::models::Guest;
use crate::services::{GuestTracker, VisitorRequest};
use crate::state::AppState;

/// Build the guests router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/guests/track", post(track))
        .route("/api/guests/{id}/merge", post(merge))
}

/// A visit to record.
///
/// Header values given in the body take precedence over the request's own
/// `User-Agent` and `Accept-Language`, so a storefront can forward its
/// visitor's headers.
#[derive(Debug, Default, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub customer_id: Option<i32>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub accept_language: Option<String>,
}

/// Tracking result; no guest for crawlers.
#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub guest_id: Option<GuestId>,
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn visitor(headers: &HeaderMap, body: TrackRequest) -> VisitorRequest {
    VisitorRequest {
        user_agent: body
            .user_agent
            .unwrap_or_else(|| header_value(headers, header::USER_AGENT)),
        accept_language: body
            .accept_language
            .unwrap_or_else(|| header_value(headers, header::ACCEPT_LANGUAGE)),
    }
}

/// Record a visit.
#[instrument(skip(_auth, state, headers, body))]
pub async fn track(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TrackRequest>,
) -> Result<Json<TrackResponse>, AppError> {
    let customer = body.customer_id.map(CustomerId::new).filter(CustomerId::is_valid);
    let request = visitor(&headers, body);

    let guest_id = GuestTracker::new(state.pool(), state.shops(), state.references())
        .track(&request, customer, Utc::now())
        .await?;
    Ok(Json(TrackResponse { guest_id }))
}

/// Guest to fold into.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub target_guest_id: i32,
    pub customer_id: i32,
}

/// Fold a guest into a customer's existing guest.
#[instrument(skip(_auth, state))]
pub async fn merge(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<MergeRequest>,
) -> Result<Json<Guest>, AppError> {
    let customer = CustomerId::new(body.customer_id);
    if !customer.is_valid() {
        return Err(AppError::BadRequest("invalid customer id".to_string()));
    }
    let target = GuestId::new(body.target_guest_id);
    if !target.is_valid() || body.target_guest_id == id {
        return Err(AppError::BadRequest("invalid target guest id".to_string()));
    }

    let guest = GuestRepository::new(state.pool(), state.shops())
        .get_by_id(GuestId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("guest {id}")))?;

    let merged = GuestTracker::new(state.pool(), state.shops(), state.references())
        .merge_with_customer(guest, target, customer, Utc::now())
        .await?;
    Ok(Json(merged))
}
