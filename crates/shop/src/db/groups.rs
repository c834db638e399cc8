//! Customer group repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use thirtybees_core::{
    CategoryId, CustomerId, GroupId, LangId, ObjectModel, PriceDisplayMethod, Reduction,
    ShopContext, ShopId,
};

use super::catalog::CatalogRepository;
use super::configuration::{ConfigurationRepository, keys};
use super::{ObjectModelMapper, RepositoryError};
use crate::models::Group;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct GroupSummaryRow {
    id_group: i32,
    name: Option<String>,
    reduction: Decimal,
    price_display_method: i32,
    show_prices: bool,
    members: i64,
    date_add: DateTime<Utc>,
}

impl TryFrom<GroupSummaryRow> for GroupSummary {
    type Error = RepositoryError;

    fn try_from(row: GroupSummaryRow) -> Result<Self, Self::Error> {
        let price_display_method = PriceDisplayMethod::from_i32(row.price_display_method)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "group {} has unknown price display method {}",
                    row.id_group, row.price_display_method
                ))
            })?;

        Ok(Self {
            id: GroupId::new(row.id_group),
            name: row.name.unwrap_or_default(),
            reduction: row.reduction,
            price_display_method,
            show_prices: row.show_prices,
            members: row.members,
            date_add: row.date_add,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id_customer: i32,
    firstname: String,
    lastname: String,
    email: String,
    active: bool,
    date_add: DateTime<Utc>,
}

impl From<MemberRow> for GroupMember {
    fn from(row: MemberRow) -> Self {
        Self {
            customer_id: CustomerId::new(row.id_customer),
            firstname: row.firstname,
            lastname: row.lastname,
            email: row.email,
            active: row.active,
            date_add: row.date_add,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReductionRow {
    id_category: i32,
    reduction: Decimal,
}

// =============================================================================
// Public Types
// =============================================================================

/// One line of the group list.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    /// Discount in percent.
    pub reduction: Decimal,
    pub price_display_method: PriceDisplayMethod,
    pub show_prices: bool,
    /// Customers in the group, deleted accounts excluded.
    pub members: i64,
    pub date_add: DateTime<Utc>,
}

/// A customer belonging to a group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupMember {
    pub customer_id: CustomerId,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub active: bool,
    pub date_add: DateTime<Utc>,
}

/// Discount a group gets on one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReduction {
    pub category_id: CategoryId,
    /// Category path, root first: `Home > Clothes > Shirts`.
    pub path: String,
    /// Discount in percent.
    pub reduction: Decimal,
}

/// Groups every customer falls into by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefaultGroups {
    /// Visitors without an account or not logged in.
    pub unidentified: Option<GroupId>,
    /// Customers who ordered through guest checkout.
    pub guest: Option<GroupId>,
    /// Registered customers.
    pub customer: Option<GroupId>,
}

impl DefaultGroups {
    /// Whether `id` is one of the default groups.
    #[must_use]
    pub fn contains(&self, id: GroupId) -> bool {
        [self.unidentified, self.guest, self.customer].contains(&Some(id))
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for customer groups and their category discounts.
pub struct GroupRepository<'a> {
    pool: &'a PgPool,
    shops: &'a ShopContext,
}

impl<'a> GroupRepository<'a> {
    /// Create a new group repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool, shops: &'a ShopContext) -> Self {
        Self { pool, shops }
    }

    const fn mapper(&self) -> ObjectModelMapper<'a> {
        ObjectModelMapper::new(self.pool, self.shops)
    }

    /// Load a group with all its translations.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_id(&self, id: GroupId) -> Result<Option<Group>, RepositoryError> {
        self.mapper().load(id, None).await
    }

    /// Groups of the context shop with member counts, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row is invalid.
    #[instrument(skip(self))]
    pub async fn list(&self, lang: LangId) -> Result<Vec<GroupSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, GroupSummaryRow>(
            r#"
            SELECT
                g.id_group, gl.name, g.reduction, g.price_display_method,
                g.show_prices, g.date_add,
                (
                    SELECT COUNT(cg.id_customer)
                    FROM customer_group cg
                    JOIN customer c ON c.id_customer = cg.id_customer
                    WHERE cg.id_group = g.id_group AND NOT c.deleted
                ) AS members
            FROM "group" g
            JOIN group_shop gs ON gs.id_group = g.id_group AND gs.id_shop = $2
            LEFT JOIN group_lang gl ON gl.id_group = g.id_group AND gl.id_lang = $1
            ORDER BY g.id_group
            "#,
        )
        .bind(lang)
        .bind(self.shops.shop_id())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Customers of a group, deleted accounts excluded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn members(&self, id: GroupId) -> Result<Vec<GroupMember>, RepositoryError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r"
            SELECT c.id_customer, c.firstname, c.lastname, c.email, c.active, c.date_add
            FROM customer_group cg
            JOIN customer c ON c.id_customer = cg.id_customer
            WHERE cg.id_group = $1 AND NOT c.deleted
            ORDER BY c.id_customer
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Category discounts of a group, with category paths in `lang`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn category_reductions(
        &self,
        id: GroupId,
        lang: LangId,
    ) -> Result<Vec<CategoryReduction>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReductionRow>(
            r"
            SELECT id_category, reduction FROM group_reduction
            WHERE id_group = $1
            ORDER BY id_category
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let catalog = CatalogRepository::new(self.pool);
        let mut reductions = Vec::with_capacity(rows.len());
        for row in rows {
            let category = CategoryId::new(row.id_category);
            reductions.push(CategoryReduction {
                category_id: category,
                path: catalog.category_path(category, lang).await?,
                reduction: (row.reduction * Decimal::ONE_HUNDRED).normalize(),
            });
        }
        Ok(reductions)
    }

    /// Insert a group and make it available in the context shops.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if a field is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, group))]
    pub async fn add(&self, group: &mut Group, now: DateTime<Utc>) -> Result<GroupId, RepositoryError> {
        let id = self.mapper().add(group, now).await?;

        let shops: Vec<i32> = self.shops.shop_ids().iter().map(ShopId::as_i32).collect();
        sqlx::query(
            r"
            INSERT INTO group_shop (id_group, id_shop)
            SELECT $1, shop_id FROM UNNEST($2::INTEGER[]) AS shop_id
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(id)
        .bind(shops)
        .execute(self.pool)
        .await?;

        tracing::info!(group_id = %id, "Group added");
        Ok(id)
    }

    /// Write a group back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the group is not stored.
    /// Returns `RepositoryError::Validation` if a field is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn update(&self, group: &Group, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.mapper().update(group, now).await
    }

    /// Delete a group and everything attached to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: GroupId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "group_reduction",
            "product_group_reduction_cache",
            "category_group",
            "customer_group",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE id_group = $1"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.mapper().delete::<Group>(id).await
    }

    /// Replace the category discounts of a group.
    ///
    /// Previous discounts and the product discount cache of the group are
    /// cleared. Each discounted category is linked to the group when it is
    /// not already.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, reductions), fields(count = reductions.len()))]
    pub async fn replace_category_reductions(
        &self,
        id: GroupId,
        reductions: &[(CategoryId, Reduction)],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM group_reduction WHERE id_group = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM product_group_reduction_cache WHERE id_group = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !reductions.is_empty() {
            let categories: Vec<i32> = reductions.iter().map(|(c, _)| c.as_i32()).collect();
            let fractions: Vec<Decimal> = reductions.iter().map(|(_, r)| r.as_fraction()).collect();

            sqlx::query(
                r"
                INSERT INTO category_group (id_category, id_group)
                SELECT category_id, $1 FROM UNNEST($2::INTEGER[]) AS category_id
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(id)
            .bind(&categories)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r"
                INSERT INTO group_reduction (id_group, id_category, reduction)
                SELECT $1, category_id, reduction
                FROM UNNEST($2::INTEGER[], $3::NUMERIC[]) AS r (category_id, reduction)
                ON CONFLICT (id_group, id_category) DO UPDATE SET reduction = EXCLUDED.reduction
                ",
            )
            .bind(id)
            .bind(&categories)
            .bind(&fractions)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Flip the show prices flag; returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the group does not exist.
    /// Returns `RepositoryError::Database` if the statement fails.
    #[instrument(skip(self))]
    pub async fn toggle_show_prices(&self, id: GroupId) -> Result<bool, RepositoryError> {
        let value: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE "group" SET show_prices = NOT show_prices, date_upd = NOW()
            WHERE id_group = $1
            RETURNING show_prices
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        value.ok_or(RepositoryError::NotFound)
    }

    /// The configured default groups.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a value is not an id.
    pub async fn default_groups(&self) -> Result<DefaultGroups, RepositoryError> {
        let config = ConfigurationRepository::new(self.pool);
        let shop = self.shops.shop_id();
        let group = |value: Option<i32>| value.map(GroupId::new).filter(GroupId::is_valid);

        Ok(DefaultGroups {
            unidentified: group(config.get_int(keys::UNIDENTIFIED_GROUP, shop).await?),
            guest: group(config.get_int(keys::GUEST_GROUP, shop).await?),
            customer: group(config.get_int(keys::CUSTOMER_GROUP, shop).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groups_contains() {
        let defaults = DefaultGroups {
            unidentified: Some(GroupId::new(1)),
            guest: Some(GroupId::new(2)),
            customer: None,
        };
        assert!(defaults.contains(GroupId::new(2)));
        assert!(!defaults.contains(GroupId::new(3)));
    }

    #[test]
    fn test_summary_rejects_unknown_display_method() {
        let row = GroupSummaryRow {
            id_group: 5,
            name: None,
            reduction: Decimal::ZERO,
            price_display_method: 4,
            show_prices: true,
            members: 0,
            date_add: Utc::now(),
        };
        assert!(matches!(
            GroupSummary::try_from(row),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
