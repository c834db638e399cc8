//! HTTP route handlers for the back office.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                              - Liveness
//! GET    /health/ready                        - Database reachable
//!
//! # Customer groups
//! GET    /api/groups                          - Groups with member counts
//! POST   /api/groups                          - Create a group
//! GET    /api/groups/defaults                 - Configured default groups
//! POST   /api/groups/category-reduction       - Check a category discount
//! GET    /api/groups/{id}                     - Group, members, category discounts
//! PUT    /api/groups/{id}                     - Update a group
//! DELETE /api/groups/{id}                     - Delete a group
//! POST   /api/groups/{id}/show-prices         - Toggle price display
//!
//! # Combinations
//! POST   /api/combinations                    - Create a combination
//! GET    /api/combinations/by-reference       - Look a combination up by reference
//! GET    /api/combinations/status             - Whether combinations are enabled and in use
//! GET    /api/combinations/{id}               - Combination with attributes and images
//! PUT    /api/combinations/{id}               - Update a combination
//! DELETE /api/combinations/{id}               - Delete a combination
//! PUT    /api/combinations/{id}/attributes    - Replace attributes
//! PUT    /api/combinations/{id}/images        - Replace images
//!
//! # Guests
//! POST   /api/guests/track                    - Record a visit
//! POST   /api/guests/{id}/merge               - Fold a guest into a customer's guest
//! ```
//!
//! Every `/api` route requires `Authorization: Bearer <ADMIN_API_TOKEN>`.

pub mod combinations;
pub mod groups;
pub mod guests;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use serde::Deserialize;

use thirtybees_core::LangId;

use crate::error::AppError;
use crate::state::AppState;

/// Build the complete API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(groups::router())
        .merge(combinations::router())
        .merge(guests::router())
}

/// API routes plus health checks, bound to `state`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `?lang=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct LangQuery {
    pub lang: Option<i32>,
}

impl LangQuery {
    /// Requested language, or the shop default.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a non-positive id.
    /// Returns `AppError::Database` if the default cannot be read.
    pub async fn resolve(&self, state: &AppState) -> Result<LangId, AppError> {
        match self.lang {
            Some(id) if id > 0 => Ok(LangId::new(id)),
            Some(id) => Err(AppError::BadRequest(format!("invalid language id {id}"))),
            None => Ok(state.default_lang().await?),
        }
    }
}
