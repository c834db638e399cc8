//! Guest repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use thirtybees_core::{
    CustomerId, GuestId, ObjectModel, OperatingSystemId, ShopContext, WebBrowserId,
};

use super::{ObjectModelMapper, RepositoryError};
use crate::models::guest::Guest;

/// Small name tables referenced by guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceTable {
    OperatingSystem,
    WebBrowser,
}

impl ReferenceTable {
    const fn table(self) -> &'static str {
        match self {
            Self::OperatingSystem => "operating_system",
            Self::WebBrowser => "web_browser",
        }
    }

    const fn primary(self) -> &'static str {
        match self {
            Self::OperatingSystem => "id_operating_system",
            Self::WebBrowser => "id_web_browser",
        }
    }
}

/// Repository for guests and their reference tables.
pub struct GuestRepository<'a> {
    pool: &'a PgPool,
    shops: &'a ShopContext,
}

impl<'a> GuestRepository<'a> {
    /// Create a new guest repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool, shops: &'a ShopContext) -> Self {
        Self { pool, shops }
    }

    const fn mapper(&self) -> ObjectModelMapper<'a> {
        ObjectModelMapper::new(self.pool, self.shops)
    }

    /// Load a guest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: GuestId) -> Result<Option<Guest>, RepositoryError> {
        self.mapper().load(id, None).await
    }

    /// Insert a new guest, or update it when it already has an id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if a field is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn save(&self, guest: &mut Guest, now: DateTime<Utc>) -> Result<GuestId, RepositoryError> {
        match guest.id() {
            Some(id) => {
                self.mapper().update(guest, now).await?;
                Ok(id)
            }
            None => self.mapper().add(guest, now).await,
        }
    }

    /// Delete a guest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn delete(&self, id: GuestId) -> Result<bool, RepositoryError> {
        self.mapper().delete::<Guest>(id).await
    }

    /// Guest record of a customer.
    ///
    /// Zero and negative ids never have one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn guest_of_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Option<GuestId>, RepositoryError> {
        if !customer.is_valid() {
            return Ok(None);
        }

        let id: Option<GuestId> = sqlx::query_scalar(
            "SELECT id_guest FROM guest WHERE id_customer = $1 ORDER BY id_guest LIMIT 1",
        )
        .bind(customer)
        .fetch_optional(self.pool)
        .await?;
        Ok(id)
    }

    /// Id of `name` in a reference table, inserting it when missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn reference_id(
        &self,
        table: ReferenceTable,
        name: &str,
    ) -> Result<i32, RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            table.table()
        ))
        .bind(name)
        .execute(self.pool)
        .await?;

        let id: i32 = sqlx::query_scalar(&format!(
            "SELECT {} FROM {} WHERE name = $1",
            table.primary(),
            table.table()
        ))
        .bind(name)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Id of an operating system name, inserting it when missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn operating_system_id(&self, name: &str) -> Result<OperatingSystemId, RepositoryError> {
        self.reference_id(ReferenceTable::OperatingSystem, name)
            .await
            .map(OperatingSystemId::new)
    }

    /// Id of a browser name, inserting it when missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn web_browser_id(&self, name: &str) -> Result<WebBrowserId, RepositoryError> {
        self.reference_id(ReferenceTable::WebBrowser, name)
            .await
            .map(WebBrowserId::new)
    }

    /// Fold guest `from` into `merged`, which carries the target guest's id.
    ///
    /// Connections of `from` move to the target, `from` is deleted and the
    /// target row is overwritten with `merged`, all in one transaction.
    /// Returns the number of connections moved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if `from` is the target.
    /// Returns `RepositoryError::NotFound` if the target guest does not exist.
    /// Returns `RepositoryError::Validation` if `merged` is invalid.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, merged, now))]
    pub async fn merge_into(
        &self,
        from: GuestId,
        merged: &Guest,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let target = merged.id().ok_or(RepositoryError::NotFound)?;
        if target == from {
            return Err(RepositoryError::Conflict(format!(
                "guest {from} cannot be merged into itself"
            )));
        }
        self.mapper().check(merged).await?;

        let mut tx = self.pool.begin().await?;
        let locked: Option<GuestId> =
            sqlx::query_scalar("SELECT id_guest FROM guest WHERE id_guest = $1 FOR UPDATE")
                .bind(target)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let moved = sqlx::query("UPDATE connections SET id_guest = $2 WHERE id_guest = $1")
            .bind(from)
            .bind(target)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        self.mapper().delete_in::<Guest>(&mut tx, from).await?;
        self.mapper().update_in(&mut tx, merged, now).await?;
        tx.commit().await?;

        Ok(moved)
    }
}
