//! Combination route handlers.

#![allow(clippy::used_underscore_binding)]

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use thirtybees_core::{AttributeGroupId, AttributeId, CombinationId, ImageId, ProductId};

use crate::db::CombinationRepository;
use crate::error::AppError;
use crate::middleware::RequireApiToken;
use crate::models::Combination;
use crate::models::combination::{AttributeName, ColorAttribute};
use crate::state::AppState;

use super::LangQuery;

/// Build the combinations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/combinations", post(create))
        .route("/api/combinations/by-reference", get(by_reference))
        .route("/api/combinations/status", get(status))
        .route("/api/combinations/{id}", get(show).put(update).delete(destroy))
        .route("/api/combinations/{id}/attributes", put(set_attributes))
        .route("/api/combinations/{id}/images", put(set_images))
}

/// Combination fields accepted on create and update.
#[derive(Debug, Deserialize)]
pub struct CombinationInput {
    pub product_id: i32,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub supplier_reference: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub ean13: String,
    #[serde(default)]
    pub upc: String,
    #[serde(default)]
    pub wholesale_price: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub ecotax: Decimal,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub depth: f64,
    #[serde(default)]
    pub unit_price_impact: Decimal,
    #[serde(default)]
    pub default_on: Option<bool>,
    #[serde(default = "default_minimal_quantity")]
    pub minimal_quantity: i32,
    #[serde(default)]
    pub available_date: Option<NaiveDate>,
}

const fn default_minimal_quantity() -> i32 {
    1
}

impl CombinationInput {
    fn apply(self, combination: &mut Combination) {
        combination.product_id = ProductId::new(self.product_id);
        combination.reference = self.reference;
        combination.supplier_reference = self.supplier_reference;
        combination.location = self.location;
        combination.ean13 = self.ean13;
        combination.upc = self.upc;
        combination.wholesale_price = self.wholesale_price;
        combination.price = self.price;
        combination.ecotax = self.ecotax;
        combination.quantity = self.quantity;
        combination.weight = self.weight;
        combination.width = self.width;
        combination.height = self.height;
        combination.depth = self.depth;
        combination.unit_price_impact = self.unit_price_impact;
        combination.default_on = self.default_on;
        combination.minimal_quantity = self.minimal_quantity;
        combination.available_date = self.available_date;
    }
}

/// A combination with what hangs off it.
#[derive(Debug, Serialize)]
pub struct CombinationView {
    pub combination: Combination,
    /// Attribute per attribute group.
    pub attributes: BTreeMap<AttributeGroupId, AttributeId>,
    pub attribute_names: Vec<AttributeName>,
    pub colors: Vec<ColorAttribute>,
    pub images: Vec<ImageId>,
    /// Price impact in the context shop.
    pub shop_price: Decimal,
}

/// Id of a created combination.
#[derive(Debug, Serialize)]
pub struct Created {
    pub id: CombinationId,
}

async fn load(repo: &CombinationRepository<'_>, id: i32) -> Result<Combination, AppError> {
    repo.get_by_id(CombinationId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("combination {id}")))
}

/// Create a combination.
#[instrument(skip(_auth, state, input), fields(product_id = input.product_id))]
pub async fn create(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Json(input): Json<CombinationInput>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    let mut combination = Combination::new(ProductId::new(input.product_id));
    input.apply(&mut combination);

    let id = repo.add(&mut combination, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// Show a combination.
#[instrument(skip(_auth, state))]
pub async fn show(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<LangQuery>,
) -> Result<Json<CombinationView>, AppError> {
    let lang = query.resolve(&state).await?;
    let repo = CombinationRepository::new(state.pool(), state.shops());
    let combination = load(&repo, id).await?;
    let id = CombinationId::new(id);

    Ok(Json(CombinationView {
        attributes: repo.attributes(id).await?,
        attribute_names: repo.attribute_names(id, lang).await?,
        colors: repo.color_attributes(id).await?,
        images: repo.images(id).await?,
        shop_price: repo.price(id, state.shops().shop_id()).await?,
        combination,
    }))
}

/// Update a combination.
#[instrument(skip(_auth, state, input))]
pub async fn update(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<CombinationInput>,
) -> Result<StatusCode, AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    let mut combination = load(&repo, id).await?;
    input.apply(&mut combination);

    repo.update(&mut combination, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Result of a delete.
#[derive(Debug, Serialize)]
pub struct Deleted {
    /// False when other shops still carry the combination.
    pub removed: bool,
}

/// Delete a combination from the context shop.
#[instrument(skip(_auth, state))]
pub async fn destroy(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Deleted>, AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    let combination = load(&repo, id).await?;
    let removed = repo.delete(&combination).await?;
    Ok(Json(Deleted { removed }))
}

/// Attribute ids to link.
#[derive(Debug, Deserialize)]
pub struct AttributesRequest {
    pub attributes: Vec<AttributeId>,
}

/// Replace the attributes of a combination.
#[instrument(skip(_auth, state))]
pub async fn set_attributes(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<AttributesRequest>,
) -> Result<StatusCode, AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    load(&repo, id).await?;
    repo.set_attributes(CombinationId::new(id), &body.attributes).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Image ids to link.
#[derive(Debug, Deserialize)]
pub struct ImagesRequest {
    pub images: Vec<ImageId>,
}

/// Replace the images of a combination.
#[instrument(skip(_auth, state))]
pub async fn set_images(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<ImagesRequest>,
) -> Result<StatusCode, AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    load(&repo, id).await?;
    repo.set_images(CombinationId::new(id), &body.images).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `?product=&reference=` query.
#[derive(Debug, Deserialize)]
pub struct ReferenceQuery {
    pub product: i32,
    #[serde(default)]
    pub reference: String,
}

/// Lookup result.
#[derive(Debug, Serialize)]
pub struct Found {
    pub id: Option<CombinationId>,
}

/// Find a combination of a product by reference.
pub async fn by_reference(
    _auth: RequireApiToken,
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<Found>, AppError> {
    let id = CombinationRepository::new(state.pool(), state.shops())
        .id_by_reference(ProductId::new(query.product), &query.reference)
        .await?;
    Ok(Json(Found { id }))
}

/// Combination feature state.
#[derive(Debug, Serialize)]
pub struct FeatureStatus {
    /// `PS_COMBINATION_FEATURE_ACTIVE`
    pub active: bool,
    /// Any combination stored.
    pub used: bool,
}

/// Whether combinations are enabled and in use.
pub async fn status(
    _auth: RequireApiToken,
    State(state): State<AppState>,
) -> Result<Json<FeatureStatus>, AppError> {
    let repo = CombinationRepository::new(state.pool(), state.shops());
    Ok(Json(FeatureStatus {
        active: repo.is_feature_active().await?,
        used: repo.is_currently_used().await?,
    }))
}
