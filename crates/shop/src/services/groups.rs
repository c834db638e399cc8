//! Customer group administration.
//!
//! Saving a group validates the discount first: an invalid discount saves
//! nothing. Category discounts are checked one by one; rejected entries are
//! reported back while the valid ones are stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use thirtybees_core::{
    CategoryId, GroupId, LangId, Reduction, ShopContext, is_price, is_unsigned_id,
};

use crate::db::catalog::CatalogRepository;
use crate::db::configuration::{ConfigurationRepository, keys, parse_bool};
use crate::db::groups::{CategoryReduction, DefaultGroups, GroupMember, GroupSummary};
use crate::db::{GroupRepository, ObjectModelMapper, RepositoryError};
use crate::models::Group;
use crate::models::group::{CategoryReductionInput, GroupInput};

/// Errors raised by group administration.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("the discount value is incorrect (must be a percentage)")]
    InvalidDiscount,

    #[error("wrong category id")]
    InvalidCategory,

    #[error("group not found")]
    NotFound,

    #[error("default groups cannot be deleted")]
    DefaultGroup,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Parse a discount percentage.
///
/// # Errors
///
/// Returns [`GroupError::InvalidDiscount`] unless the value is a price
/// between 0 and 100.
pub fn validate_discount(value: Decimal) -> Result<Reduction, GroupError> {
    if !is_price(value) {
        return Err(GroupError::InvalidDiscount);
    }
    Reduction::from_percent(value).map_err(|_| GroupError::InvalidDiscount)
}

/// A category discount that was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedReduction {
    pub category_id: i32,
    pub reduction: Decimal,
    pub reason: String,
}

/// Split submitted category discounts into storable and rejected entries.
///
/// A category listed twice keeps its last discount.
#[must_use]
pub fn partition_reductions(
    input: &[CategoryReductionInput],
) -> (Vec<(CategoryId, Reduction)>, Vec<RejectedReduction>) {
    let mut accepted: Vec<(CategoryId, Reduction)> = Vec::new();
    let mut rejected = Vec::new();

    for entry in input {
        let outcome = if is_unsigned_id(i64::from(entry.category_id)) {
            validate_discount(entry.reduction)
        } else {
            Err(GroupError::InvalidCategory)
        };

        match outcome {
            Ok(reduction) => {
                let category = CategoryId::new(entry.category_id);
                match accepted.iter_mut().find(|(c, _)| *c == category) {
                    Some(existing) => existing.1 = reduction,
                    None => accepted.push((category, reduction)),
                }
            }
            Err(e) => rejected.push(RejectedReduction {
                category_id: entry.category_id,
                reduction: entry.reduction,
                reason: e.to_string(),
            }),
        }
    }

    (accepted, rejected)
}

/// Group with its members and category discounts.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub group: Group,
    pub members: Vec<GroupMember>,
    pub category_reductions: Vec<CategoryReduction>,
}

/// Result of saving a group.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub id: GroupId,
    /// Category discounts that were not stored.
    pub rejected: Vec<RejectedReduction>,
}

/// Service for the customer group back office.
pub struct GroupService {
    pool: PgPool,
    shops: ShopContext,
}

impl GroupService {
    /// Create a new group service for the given shops.
    #[must_use]
    pub const fn new(pool: PgPool, shops: ShopContext) -> Self {
        Self { pool, shops }
    }

    fn repo(&self) -> GroupRepository<'_> {
        GroupRepository::new(&self.pool, &self.shops)
    }

    /// Groups of the current shop with member counts, names in `lang`.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::Repository` if the query fails.
    pub async fn list(&self, lang: LangId) -> Result<Vec<GroupSummary>, GroupError> {
        Ok(self.repo().list(lang).await?)
    }

    /// A group with its members and category discounts, paths in `lang`.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::NotFound` if the group does not exist.
    /// Returns `GroupError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn view(&self, id: GroupId, lang: LangId) -> Result<GroupView, GroupError> {
        let repo = self.repo();
        let group = repo.get_by_id(id).await?.ok_or(GroupError::NotFound)?;

        Ok(GroupView {
            group,
            members: repo.members(id).await?,
            category_reductions: repo.category_reductions(id, lang).await?,
        })
    }

    /// Create a group, or update it when `id` is given.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::InvalidDiscount` if the group discount is invalid;
    /// nothing is saved in that case.
    /// Returns `GroupError::NotFound` if `id` does not exist.
    /// Returns `GroupError::Repository` if a statement fails.
    #[instrument(skip(self, input))]
    pub async fn save(
        &self,
        id: Option<GroupId>,
        input: GroupInput,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, GroupError> {
        let reduction = validate_discount(input.reduction)?;
        let repo = self.repo();

        let mut group = Group::new(input.name);
        group.reduction = reduction;
        group.price_display_method = input.price_display_method;
        group.show_prices = input.show_prices;

        let id = match id {
            Some(id) => {
                if !self.exists(id).await? {
                    return Err(GroupError::NotFound);
                }
                let group = group.with_id(id);
                repo.update(&group, now).await?;
                id
            }
            None => repo.add(&mut group, now).await?,
        };

        let rejected = self.update_category_reductions(id, &input.category_reductions).await?;
        for entry in &rejected {
            warn!(category_id = entry.category_id, reason = %entry.reason, "Category discount rejected");
        }

        info!(group_id = %id, rejected = rejected.len(), "Group saved");
        Ok(SaveOutcome { id, rejected })
    }

    async fn exists(&self, id: GroupId) -> Result<bool, RepositoryError> {
        ObjectModelMapper::new(&self.pool, &self.shops)
            .exists::<Group>(id)
            .await
    }

    async fn update_category_reductions(
        &self,
        id: GroupId,
        input: &[CategoryReductionInput],
    ) -> Result<Vec<RejectedReduction>, GroupError> {
        let (accepted, mut rejected) = partition_reductions(input);

        let catalog = CatalogRepository::new(&self.pool);
        let mut stored = Vec::with_capacity(accepted.len());
        for (category, reduction) in accepted {
            if catalog.category_exists(category).await? {
                stored.push((category, reduction));
            } else {
                rejected.push(RejectedReduction {
                    category_id: category.as_i32(),
                    reduction: reduction.percent(),
                    reason: GroupError::InvalidCategory.to_string(),
                });
            }
        }

        if !input.is_empty() {
            let config = ConfigurationRepository::new(&self.pool);
            let active = config
                .get_global(keys::GROUP_FEATURE_ACTIVE)
                .await?
                .is_some_and(|v| parse_bool(&v));
            if !active {
                config.update_global_value(keys::GROUP_FEATURE_ACTIVE, "1").await?;
            }
        }

        self.repo().replace_category_reductions(id, &stored).await?;
        Ok(rejected)
    }

    /// Flip whether members of the group see prices.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::NotFound` if the group does not exist.
    /// Returns `GroupError::Repository` if the statement fails.
    pub async fn toggle_show_prices(&self, id: GroupId) -> Result<bool, GroupError> {
        match self.repo().toggle_show_prices(id).await {
            Ok(value) => Ok(value),
            Err(RepositoryError::NotFound) => Err(GroupError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Check a category discount before it is added to the edit form.
    ///
    /// Returns the category path in `lang` and the discount.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::InvalidCategory` if the id is not a valid id.
    /// Returns `GroupError::InvalidDiscount` if the discount is invalid.
    /// Returns `GroupError::Repository` if the path cannot be read.
    pub async fn check_category_reduction(
        &self,
        category: i32,
        discount: Decimal,
        lang: LangId,
    ) -> Result<CategoryReduction, GroupError> {
        if !is_unsigned_id(i64::from(category)) {
            return Err(GroupError::InvalidCategory);
        }
        let reduction = validate_discount(discount)?;
        let category = CategoryId::new(category);

        Ok(CategoryReduction {
            category_id: category,
            path: CatalogRepository::new(&self.pool)
                .category_path(category, lang)
                .await?,
            reduction: reduction.percent(),
        })
    }

    /// Delete a group. The default groups are kept.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::DefaultGroup` for a default group.
    /// Returns `GroupError::NotFound` if the group does not exist.
    /// Returns `GroupError::Repository` if a statement fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: GroupId) -> Result<(), GroupError> {
        let repo = self.repo();
        if repo.default_groups().await?.contains(id) {
            return Err(GroupError::DefaultGroup);
        }
        if !self.exists(id).await? {
            return Err(GroupError::NotFound);
        }
        repo.delete(id).await?;
        info!(group_id = %id, "Group deleted");
        Ok(())
    }

    /// The configured default groups.
    ///
    /// # Errors
    ///
    /// Returns `GroupError::Repository` if the configuration cannot be read.
    pub async fn default_groups(&self) -> Result<DefaultGroups, GroupError> {
        Ok(self.repo().default_groups().await?)
    }
}
