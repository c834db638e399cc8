//! Combination repository.
//!
//! Wraps the object mapper with the catalog side effects of writing a
//! combination: stock rows, specific prices, attribute and image links and
//! the product default combination.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use thirtybees_core::{
    AttributeGroupId, AttributeId, CombinationId, ImageId, LangId, ObjectModel, ProductId,
    ShopContext, ShopId,
};

use super::catalog::{CatalogRepository, combination_out_of_stock};
use super::configuration::{ConfigurationRepository, keys};
use super::{ObjectModelMapper, RepositoryError};
use crate::models::combination::{
    AttributeName, ColorAttribute, Combination, attribute_ids_to_link, image_ids_to_link,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AttributeRow {
    id_attribute_group: i32,
    id_attribute: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct AttributeNameRow {
    id_attribute: i32,
    group_name: Option<String>,
    name: String,
}

impl From<AttributeNameRow> for AttributeName {
    fn from(row: AttributeNameRow) -> Self {
        Self {
            attribute_id: AttributeId::new(row.id_attribute),
            group_name: row.group_name.unwrap_or_default(),
            name: row.name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ColorRow {
    id_attribute: i32,
    color: Option<String>,
}

impl From<ColorRow> for ColorAttribute {
    fn from(row: ColorRow) -> Self {
        Self {
            attribute_id: AttributeId::new(row.id_attribute),
            color: row.color.unwrap_or_default(),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product combinations.
pub struct CombinationRepository<'a> {
    pool: &'a PgPool,
    shops: &'a ShopContext,
}

impl<'a> CombinationRepository<'a> {
    /// Create a new combination repository for the given shops.
    #[must_use]
    pub const fn new(pool: &'a PgPool, shops: &'a ShopContext) -> Self {
        Self { pool, shops }
    }

    const fn mapper(&self) -> ObjectModelMapper<'a> {
        ObjectModelMapper::new(self.pool, self.shops)
    }

    const fn catalog(&self) -> CatalogRepository<'a> {
        CatalogRepository::new(self.pool)
    }

    /// Load a combination as seen from the context shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_id(&self, id: CombinationId) -> Result<Option<Combination>, RepositoryError> {
        self.mapper().load(id, None).await
    }

    /// Insert a combination with its stock row, then refresh the product default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Validation` if a field is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, combination), fields(product_id = %combination.product_id))]
    pub async fn add(
        &self,
        combination: &mut Combination,
        now: DateTime<Utc>,
    ) -> Result<CombinationId, RepositoryError> {
        combination.normalize_default_on();
        self.mapper().check(&*combination).await?;
        let product = combination.product_id;
        let is_virtual = self
            .catalog()
            .is_virtual(product)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        if combination.is_default() {
            self.catalog()
                .clear_default_combination(product, None, self.shops)
                .await?;
        }

        let id = match self.mapper().add(combination, now).await {
            Ok(id) => id,
            Err(e) => {
                self.catalog()
                    .update_default_combination(product, self.shops)
                    .await?;
                return Err(e);
            }
        };

        let product_policy = self
            .catalog()
            .out_of_stock(product, self.shops.shop_id())
            .await?;
        self.catalog()
            .set_out_of_stock(
                product,
                id,
                self.shops,
                combination_out_of_stock(is_virtual, product_policy),
            )
            .await?;

        self.catalog()
            .update_default_combination(product, self.shops)
            .await?;

        tracing::info!(combination_id = %id, "Combination added");
        Ok(id)
    }

    /// Write a combination back, then refresh the product default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the combination is not stored.
    /// Returns `RepositoryError::Validation` if a field is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, combination), fields(combination_id = ?combination.id()))]
    pub async fn update(
        &self,
        combination: &mut Combination,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        combination.normalize_default_on();
        self.mapper().check(&*combination).await?;
        if combination.is_default() {
            self.catalog()
                .clear_default_combination(combination.product_id, combination.id(), self.shops)
                .await?;
        }

        let written = self.mapper().update(combination, now).await;
        self.catalog()
            .update_default_combination(combination.product_id, self.shops)
            .await?;
        written
    }

    /// Delete a combination from the context shops and clean up what
    /// depended on it.
    ///
    /// Attribute, cart and image links go only once no other shop carries
    /// the combination. Returns whether the combination was removed
    /// completely.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the combination is not stored.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, combination), fields(combination_id = ?combination.id()))]
    pub async fn delete(&self, combination: &Combination) -> Result<bool, RepositoryError> {
        let id = combination.id().ok_or(RepositoryError::NotFound)?;
        let product = combination.product_id;

        let removed = self.mapper().delete::<Combination>(id).await?;

        self.catalog().remove_stock(product, id, self.shops).await?;
        self.catalog().delete_specific_prices(product, id).await?;

        if removed {
            self.delete_associations(id).await?;
        }

        self.delete_from_supplier(product, id).await?;
        self.catalog()
            .update_default_combination(product, self.shops)
            .await?;

        tracing::info!(removed, "Combination deleted");
        Ok(removed)
    }

    async fn delete_associations(&self, id: CombinationId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "product_attribute_combination",
            "cart_product",
            "product_attribute_image",
        ] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE id_product_attribute = $1"
            ))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_from_supplier(
        &self,
        product: ProductId,
        id: CombinationId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "DELETE FROM product_supplier WHERE id_product = $1 AND id_product_attribute = $2",
        )
        .bind(product)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Replace the attributes of a combination.
    ///
    /// Zero ids and repeats are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn set_attributes(
        &self,
        id: CombinationId,
        attributes: &[AttributeId],
    ) -> Result<(), RepositoryError> {
        let ids: Vec<i32> = attribute_ids_to_link(attributes)
            .iter()
            .map(AttributeId::as_i32)
            .collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_attribute_combination WHERE id_product_attribute = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !ids.is_empty() {
            sqlx::query(
                r"
                INSERT INTO product_attribute_combination (id_attribute, id_product_attribute)
                SELECT attribute_id, $1 FROM UNNEST($2::INTEGER[]) AS attribute_id
                ",
            )
            .bind(id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace the images of a combination.
    ///
    /// Zero ids and repeats are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn set_images(&self, id: CombinationId, images: &[ImageId]) -> Result<(), RepositoryError> {
        let ids: Vec<i32> = image_ids_to_link(images)
            .iter()
            .map(ImageId::as_i32)
            .collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_attribute_image WHERE id_product_attribute = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !ids.is_empty() {
            sqlx::query(
                r"
                INSERT INTO product_attribute_image (id_product_attribute, id_image)
                SELECT $1, image_id FROM UNNEST($2::INTEGER[]) AS image_id
                ",
            )
            .bind(id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Attribute of each attribute group used by the combination.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn attributes(
        &self,
        id: CombinationId,
    ) -> Result<BTreeMap<AttributeGroupId, AttributeId>, RepositoryError> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            r"
            SELECT a.id_attribute_group, a.id_attribute
            FROM product_attribute_combination pac
            JOIN attribute a ON a.id_attribute = pac.id_attribute
            WHERE pac.id_product_attribute = $1
            ORDER BY a.id_attribute
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    AttributeGroupId::new(r.id_attribute_group),
                    AttributeId::new(r.id_attribute),
                )
            })
            .collect())
    }

    /// Attribute names of the combination in `lang`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn attribute_names(
        &self,
        id: CombinationId,
        lang: LangId,
    ) -> Result<Vec<AttributeName>, RepositoryError> {
        let rows = sqlx::query_as::<_, AttributeNameRow>(
            r"
            SELECT al.id_attribute, agl.name AS group_name, al.name
            FROM product_attribute_combination pac
            JOIN attribute a ON a.id_attribute = pac.id_attribute
            JOIN attribute_lang al ON al.id_attribute = pac.id_attribute AND al.id_lang = $2
            LEFT JOIN attribute_group_lang agl
                ON agl.id_attribute_group = a.id_attribute_group AND agl.id_lang = $2
            WHERE pac.id_product_attribute = $1
            ORDER BY a.id_attribute_group, al.id_attribute
            ",
        )
        .bind(id)
        .bind(lang)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Attributes of the combination that belong to a color group.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn color_attributes(
        &self,
        id: CombinationId,
    ) -> Result<Vec<ColorAttribute>, RepositoryError> {
        let rows = sqlx::query_as::<_, ColorRow>(
            r"
            SELECT a.id_attribute, a.color
            FROM product_attribute_combination pac
            JOIN attribute a ON a.id_attribute = pac.id_attribute
            JOIN attribute_group ag ON ag.id_attribute_group = a.id_attribute_group
            WHERE pac.id_product_attribute = $1 AND ag.is_color_group
            ORDER BY a.id_attribute
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Images linked to the combination.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images(&self, id: CombinationId) -> Result<Vec<ImageId>, RepositoryError> {
        let images: Vec<ImageId> = sqlx::query_scalar(
            r"
            SELECT pai.id_image
            FROM product_attribute_image pai
            JOIN product_attribute_shop pas
                ON pas.id_product_attribute = pai.id_product_attribute AND pas.id_shop = $2
            WHERE pai.id_product_attribute = $1
            ORDER BY pai.id_image
            ",
        )
        .bind(id)
        .bind(self.shops.shop_id())
        .fetch_all(self.pool)
        .await?;
        Ok(images)
    }

    /// First combination of `product` whose reference contains `reference`.
    ///
    /// An empty reference matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn id_by_reference(
        &self,
        product: ProductId,
        reference: &str,
    ) -> Result<Option<CombinationId>, RepositoryError> {
        if reference.is_empty() {
            return Ok(None);
        }

        let id: Option<CombinationId> = sqlx::query_scalar(
            r"
            SELECT id_product_attribute FROM product_attribute
            WHERE id_product = $1 AND STRPOS(reference, $2) > 0
            ORDER BY id_product_attribute
            LIMIT 1
            ",
        )
        .bind(product)
        .bind(reference)
        .fetch_optional(self.pool)
        .await?;
        Ok(id)
    }

    /// Price impact of a combination in `shop`; zero when not sold there.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn price(&self, id: CombinationId, shop: ShopId) -> Result<Decimal, RepositoryError> {
        let price: Option<Decimal> = sqlx::query_scalar(
            r"
            SELECT price FROM product_attribute_shop
            WHERE id_product_attribute = $1 AND id_shop = $2
            ",
        )
        .bind(id)
        .bind(shop)
        .fetch_optional(self.pool)
        .await?;
        Ok(price.unwrap_or_default())
    }

    /// Whether combinations are enabled for the context shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_feature_active(&self) -> Result<bool, RepositoryError> {
        ConfigurationRepository::new(self.pool)
            .get_bool(keys::COMBINATION_FEATURE_ACTIVE, self.shops.shop_id())
            .await
    }

    /// Whether any combination is stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_currently_used(&self) -> Result<bool, RepositoryError> {
        self.mapper()
            .is_currently_used(Combination::DEFINITION.table)
            .await
    }
}
