//! Product-level catalog operations shared by combinations and groups.
//!
//! Covers the product default combination cache, stock rows, specific
//! prices and category paths.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use thirtybees_core::{CategoryId, CombinationId, LangId, ProductId, ShopContext, ShopId};

use super::RepositoryError;

/// Out-of-stock ordering policy stored in `stock_available.out_of_stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfStock {
    Deny,
    Allow,
    /// Follow the shop-wide setting.
    ShopDefault,
}

impl OutOfStock {
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Deny => 0,
            Self::Allow => 1,
            Self::ShopDefault => 2,
        }
    }

    /// Unknown stored values fall back to the shop default.
    #[must_use]
    pub const fn from_i16(value: i16) -> Self {
        match value {
            0 => Self::Deny,
            1 => Self::Allow,
            _ => Self::ShopDefault,
        }
    }
}

/// Policy for a new combination's stock row.
///
/// Virtual products can always be ordered; other products inherit the
/// product-level policy.
#[must_use]
pub const fn combination_out_of_stock(is_virtual: bool, product_policy: OutOfStock) -> OutOfStock {
    if is_virtual {
        OutOfStock::Allow
    } else {
        product_policy
    }
}

/// Which combination should be the product default.
///
/// The one flagged `default_on` wins; otherwise the lowest id is promoted.
/// Returns `None` when the product has no combinations.
#[must_use]
pub fn pick_default_combination(
    flagged: Option<CombinationId>,
    all: &[CombinationId],
) -> Option<CombinationId> {
    flagged.or_else(|| all.iter().min().copied())
}

/// Join category names into a `Root > Child` path.
#[must_use]
pub fn format_category_path(names: &[String]) -> String {
    names.join(" > ")
}

fn shop_ids(shops: &ShopContext) -> Vec<i32> {
    shops.shop_ids().iter().map(ShopId::as_i32).collect()
}

/// Repository for product-level catalog data.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Whether the product is virtual; `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_virtual(&self, product: ProductId) -> Result<Option<bool>, RepositoryError> {
        let row: Option<bool> =
            sqlx::query_scalar("SELECT is_virtual FROM product WHERE id_product = $1")
                .bind(product)
                .fetch_optional(self.pool)
                .await?;
        Ok(row)
    }

    /// Product-level out-of-stock policy in `shop`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn out_of_stock(
        &self,
        product: ProductId,
        shop: ShopId,
    ) -> Result<OutOfStock, RepositoryError> {
        let value: Option<i16> = sqlx::query_scalar(
            r"
            SELECT out_of_stock FROM stock_available
            WHERE id_product = $1 AND id_product_attribute = 0 AND id_shop = $2
            ",
        )
        .bind(product)
        .bind(shop)
        .fetch_optional(self.pool)
        .await?;

        Ok(value.map_or(OutOfStock::ShopDefault, OutOfStock::from_i16))
    }

    /// Create or update the stock row of a combination in each shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, shops))]
    pub async fn set_out_of_stock(
        &self,
        product: ProductId,
        combination: CombinationId,
        shops: &ShopContext,
        policy: OutOfStock,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO stock_available (id_product, id_product_attribute, id_shop, out_of_stock)
            SELECT $1, $2, shop_id, $4 FROM UNNEST($3::INTEGER[]) AS shop_id
            ON CONFLICT (id_product, id_product_attribute, id_shop)
            DO UPDATE SET out_of_stock = EXCLUDED.out_of_stock
            ",
        )
        .bind(product)
        .bind(combination)
        .bind(shop_ids(shops))
        .bind(policy.as_i16())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove the stock rows of a combination in each shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn remove_stock(
        &self,
        product: ProductId,
        combination: CombinationId,
        shops: &ShopContext,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM stock_available
            WHERE id_product = $1 AND id_product_attribute = $2 AND id_shop = ANY($3)
            ",
        )
        .bind(product)
        .bind(combination)
        .bind(shop_ids(shops))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every specific price of a combination.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn delete_specific_prices(
        &self,
        product: ProductId,
        combination: CombinationId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM specific_price WHERE id_product = $1 AND id_product_attribute = $2",
        )
        .bind(product)
        .bind(combination)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Clear the default flag on every other combination of the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn clear_default_combination(
        &self,
        product: ProductId,
        keep: Option<CombinationId>,
        shops: &ShopContext,
    ) -> Result<(), RepositoryError> {
        let keep = keep.map_or(0, |id| id.as_i32());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE product_attribute SET default_on = NULL
            WHERE id_product = $1 AND id_product_attribute <> $2 AND default_on IS TRUE
            ",
        )
        .bind(product)
        .bind(keep)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE product_attribute_shop SET default_on = NULL
            WHERE id_product = $1 AND id_product_attribute <> $2 AND default_on IS TRUE
              AND id_shop = ANY($3)
            ",
        )
        .bind(product)
        .bind(keep)
        .bind(shop_ids(shops))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Recompute the product's default combination and its cached id.
    ///
    /// Returns the default combination, `None` when the product has none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, shops))]
    pub async fn update_default_combination(
        &self,
        product: ProductId,
        shops: &ShopContext,
    ) -> Result<Option<CombinationId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let all: Vec<CombinationId> = sqlx::query_scalar(
            "SELECT id_product_attribute FROM product_attribute WHERE id_product = $1",
        )
        .bind(product)
        .fetch_all(&mut *tx)
        .await?;

        let flagged: Option<CombinationId> = sqlx::query_scalar(
            r"
            SELECT id_product_attribute FROM product_attribute
            WHERE id_product = $1 AND default_on IS TRUE
            ORDER BY id_product_attribute
            LIMIT 1
            ",
        )
        .bind(product)
        .fetch_optional(&mut *tx)
        .await?;

        let default = pick_default_combination(flagged, &all);

        if let Some(id) = default
            && flagged.is_none()
        {
            promote_default(&mut tx, id, shops).await?;
        }

        let cached = default.map_or(0, |id| id.as_i32());
        sqlx::query("UPDATE product SET cache_default_attribute = $2 WHERE id_product = $1")
            .bind(product)
            .bind(cached)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"
            UPDATE product_shop SET cache_default_attribute = $2
            WHERE id_product = $1 AND id_shop = ANY($3)
            ",
        )
        .bind(product)
        .bind(cached)
        .bind(shop_ids(shops))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(?default, "Default combination updated");
        Ok(default)
    }

    /// Names of a category and its ancestors, root first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn category_path(
        &self,
        category: CategoryId,
        lang: LangId,
    ) -> Result<String, RepositoryError> {
        let names: Vec<String> = sqlx::query_scalar(
            r"
            WITH RECURSIVE ancestors (id_category, id_parent, depth) AS (
                SELECT id_category, id_parent, 0 FROM category WHERE id_category = $1
                UNION ALL
                SELECT c.id_category, c.id_parent, a.depth + 1
                FROM category c
                JOIN ancestors a ON c.id_category = a.id_parent
                WHERE a.depth < 64
            )
            SELECT cl.name
            FROM ancestors a
            JOIN category_lang cl ON cl.id_category = a.id_category AND cl.id_lang = $2
            ORDER BY a.depth DESC
            ",
        )
        .bind(category)
        .bind(lang)
        .fetch_all(self.pool)
        .await?;

        Ok(format_category_path(&names))
    }

    /// Whether a category exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn category_exists(&self, category: CategoryId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM category WHERE id_category = $1)")
                .bind(category)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }
}

async fn promote_default(
    tx: &mut Transaction<'static, Postgres>,
    id: CombinationId,
    shops: &ShopContext,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE product_attribute SET default_on = TRUE WHERE id_product_attribute = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        r"
        UPDATE product_attribute_shop SET default_on = TRUE
        WHERE id_product_attribute = $1 AND id_shop = ANY($2)
        ",
    )
    .bind(id)
    .bind(shop_ids(shops))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_products_allow_ordering() {
        assert_eq!(
            combination_out_of_stock(true, OutOfStock::Deny),
            OutOfStock::Allow
        );
        assert_eq!(
            combination_out_of_stock(false, OutOfStock::Deny),
            OutOfStock::Deny
        );
        assert_eq!(
            combination_out_of_stock(false, OutOfStock::ShopDefault),
            OutOfStock::ShopDefault
        );
    }

    #[test]
    fn test_out_of_stock_codes() {
        for policy in [OutOfStock::Deny, OutOfStock::Allow, OutOfStock::ShopDefault] {
            assert_eq!(OutOfStock::from_i16(policy.as_i16()), policy);
        }
        assert_eq!(OutOfStock::from_i16(9), OutOfStock::ShopDefault);
    }

    #[test]
    fn test_flagged_default_wins() {
        let all = [CombinationId::new(4), CombinationId::new(2), CombinationId::new(9)];
        assert_eq!(
            pick_default_combination(Some(CombinationId::new(9)), &all),
            Some(CombinationId::new(9))
        );
    }

    #[test]
    fn test_lowest_id_is_promoted() {
        let all = [CombinationId::new(4), CombinationId::new(2), CombinationId::new(9)];
        assert_eq!(
            pick_default_combination(None, &all),
            Some(CombinationId::new(2))
        );
    }

    #[test]
    fn test_no_combinations_no_default() {
        assert_eq!(pick_default_combination(None, &[]), None);
    }

    #[test]
    fn test_category_path() {
        let names = vec!["Home".to_owned(), "Clothes".to_owned(), "Men".to_owned()];
        assert_eq!(format_category_path(&names), "Home > Clothes > Men");
        assert_eq!(format_category_path(&[]), "");
    }
}
