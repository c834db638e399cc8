//! Generic persistence for [`ObjectModel`] entities.
//!
//! The mapper stores an entity across up to three tables:
//!
//! - `{table}`: one row holding every non-lang field
//! - `{table}_shop`: one row per shop holding the `shop` fields
//! - `{table}_lang`: one row per language holding the `lang` fields
//!
//! Writes touching several tables run in a single transaction.

pub mod row;
pub mod sql;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use thirtybees_core::{
    EntityDefinition, EntityValues, FieldDef, FieldValue, LangId, LangMap, ObjectModel,
    ShopContext,
};

use super::RepositoryError;
use super::configuration::ConfigurationRepository;
use row::{bind_field, decode_field};

/// Maps entities to rows for the shops of a [`ShopContext`].
#[derive(Debug, Clone, Copy)]
pub struct ObjectModelMapper<'a> {
    pool: &'a PgPool,
    shops: &'a ShopContext,
}

impl<'a> ObjectModelMapper<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shops: &'a ShopContext) -> Self {
        Self { pool, shops }
    }

    #[must_use]
    pub const fn pool(&self) -> &'a PgPool {
        self.pool
    }

    #[must_use]
    pub const fn shops(&self) -> &'a ShopContext {
        self.shops
    }

    /// Validate `entity` without writing it.
    ///
    /// Required translations must exist in the shop's default language.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` listing every failing field.
    /// Returns `RepositoryError::Database` if the default language cannot be read.
    pub async fn check<M: ObjectModel>(&self, entity: &M) -> Result<(), RepositoryError> {
        let default_lang = if M::DEFINITION.is_multilang() {
            ConfigurationRepository::new(self.pool)
                .default_lang(self.shops.shop_id())
                .await?
        } else {
            LangId::new(1)
        };
        entity.validate(default_lang)?;
        Ok(())
    }

    /// Insert a new entity and assign its id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the entity already has an id.
    /// Returns `RepositoryError::Validation` if a field fails validation.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, entity), fields(table = M::DEFINITION.table))]
    pub async fn add<M: ObjectModel>(
        &self,
        entity: &mut M,
        now: DateTime<Utc>,
    ) -> Result<M::Id, RepositoryError> {
        if let Some(id) = entity.id() {
            return Err(RepositoryError::Conflict(format!(
                "{} {id:?} is already stored",
                M::DEFINITION.table
            )));
        }
        self.check(&*entity).await?;

        let def = &M::DEFINITION;
        let values = entity.to_values();
        let mut tx = self.pool.begin().await?;

        let insert_sql = sql::insert_base(def);
        let mut query = sqlx::query(&insert_sql);
        for field in sql::base_columns(def) {
            query = bind_field(query, field, values.get(field.name))?;
        }
        if def.timestamps {
            query = query.bind(now).bind(now);
        }
        let id: i32 = query.fetch_one(&mut *tx).await?.try_get(0)?;

        self.write_overlays(&mut tx, def, id, &values).await?;
        tx.commit().await?;

        let id = M::Id::from(id);
        entity.assign_id(id);
        tracing::debug!(?id, "Entity added");
        Ok(id)
    }

    /// Load an entity.
    ///
    /// With `lang` set only that language's translations are read; otherwise
    /// every language is. Shop fields come from the context shop's row when
    /// one exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if stored values do not fit
    /// the entity.
    #[instrument(skip(self), fields(table = M::DEFINITION.table))]
    pub async fn load<M: ObjectModel>(
        &self,
        id: M::Id,
        lang: Option<LangId>,
    ) -> Result<Option<M>, RepositoryError> {
        let def = &M::DEFINITION;
        let key: i32 = id.into();

        let base_sql = sql::select_base(def);
        let Some(base) = sqlx::query(&base_sql)
            .bind(key)
            .fetch_optional(self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut values = decode_row(&base, sql::base_columns(def))?;

        if def.is_multishop() {
            let shop_sql = sql::select_shop(def);
            if let Some(shop_row) = sqlx::query(&shop_sql)
                .bind(key)
                .bind(self.shops.shop_id().as_i32())
                .fetch_optional(self.pool)
                .await?
            {
                values.merge(decode_row(&shop_row, sql::shop_columns(def))?);
            }
        }

        if def.is_multilang() {
            let lang_sql = sql::select_lang(def, lang.is_some());
            let mut query = sqlx::query(&lang_sql).bind(key);
            if let Some(lang) = lang {
                query = query.bind(lang.as_i32());
            }
            for row in query.fetch_all(self.pool).await? {
                let lang_id = LangId::new(row.try_get(sql::LANG_COLUMN)?);
                for field in def.lang_fields() {
                    let text: Option<String> = row.try_get(field.name)?;
                    values
                        .lang_mut(field.name)
                        .insert(lang_id, text.unwrap_or_default());
                }
            }
        }

        Ok(Some(M::from_values(id, &values)?))
    }

    /// Write an existing entity back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entity has no id or its row
    /// no longer exists.
    /// Returns `RepositoryError::Validation` if a field fails validation.
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self, entity), fields(table = M::DEFINITION.table))]
    pub async fn update<M: ObjectModel>(
        &self,
        entity: &M,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check(entity).await?;
        let mut tx = self.pool.begin().await?;
        self.update_in(&mut tx, entity, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// [`update`](Self::update) inside the caller's transaction, without
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entity has no id or its row
    /// no longer exists.
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn update_in<M: ObjectModel>(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: &M,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let id = entity.id().ok_or(RepositoryError::NotFound)?;
        let def = &M::DEFINITION;
        let key: i32 = id.into();
        let values = entity.to_values();

        let update_sql = sql::update_base(def);
        let mut query = sqlx::query(&update_sql).bind(key);
        for field in sql::base_columns(def) {
            query = bind_field(query, field, values.get(field.name))?;
        }
        if def.timestamps {
            query = query.bind(now);
        }
        if query.execute(&mut **tx).await?.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.write_overlays(tx, def, key, &values).await?;

        tracing::debug!(?id, "Entity updated");
        Ok(())
    }

    /// Delete an entity from the context shops.
    ///
    /// The base and translation rows go only once no other shop still
    /// carries the object. Returns whether the object was removed
    /// completely.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    #[instrument(skip(self), fields(table = M::DEFINITION.table))]
    pub async fn delete<M: ObjectModel>(&self, id: M::Id) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let removed = self.delete_in::<M>(&mut tx, id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// [`delete`](Self::delete) inside the caller's transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn delete_in<M: ObjectModel>(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: M::Id,
    ) -> Result<bool, RepositoryError> {
        let def = &M::DEFINITION;
        let key: i32 = id.into();

        if def.is_multishop() {
            let shops: Vec<i32> = self.shops.shop_ids().iter().map(|s| s.as_i32()).collect();
            sqlx::query(&sql::delete_shop(def))
                .bind(key)
                .bind(shops)
                .execute(&mut **tx)
                .await?;

            let remaining: i64 = sqlx::query_scalar(&sql::count_shop(def))
                .bind(key)
                .fetch_one(&mut **tx)
                .await?;
            if remaining > 0 {
                tracing::debug!(?id, remaining, "Entity kept for other shops");
                return Ok(false);
            }
        }

        if def.is_multilang() {
            sqlx::query(&sql::delete_lang(def))
                .bind(key)
                .execute(&mut **tx)
                .await?;
        }
        sqlx::query(&sql::delete_base(def))
            .bind(key)
            .execute(&mut **tx)
            .await?;

        tracing::debug!(?id, "Entity deleted");
        Ok(true)
    }

    /// Whether the object is stored for more than one shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_multishop_entries<M: ObjectModel>(
        &self,
        id: M::Id,
    ) -> Result<bool, RepositoryError> {
        let def = &M::DEFINITION;
        if !def.is_multishop() {
            return Ok(false);
        }
        let key: i32 = id.into();
        let count: i64 = sqlx::query_scalar(&sql::count_shop(def))
            .bind(key)
            .fetch_one(self.pool)
            .await?;
        Ok(count > 1)
    }

    /// Whether the base row exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn exists<M: ObjectModel>(&self, id: M::Id) -> Result<bool, RepositoryError> {
        let key: i32 = id.into();
        let exists: bool = sqlx::query_scalar(&sql::exists(&M::DEFINITION))
            .bind(key)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// Whether `table` holds at least one row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_currently_used(&self, table: &str) -> Result<bool, RepositoryError> {
        let used: bool = sqlx::query_scalar(&sql::table_has_rows(table))
            .fetch_one(self.pool)
            .await?;
        Ok(used)
    }

    async fn write_overlays(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        def: &EntityDefinition,
        key: i32,
        values: &EntityValues,
    ) -> Result<(), RepositoryError> {
        if def.is_multishop() {
            let shop_sql = sql::upsert_shop(def);
            for shop in self.shops.shop_ids() {
                let mut query = sqlx::query(&shop_sql).bind(key).bind(shop.as_i32());
                for field in sql::shop_columns(def) {
                    query = bind_field(query, field, values.get(field.name))?;
                }
                query.execute(&mut **tx).await?;
            }
        }

        if def.is_multilang() {
            let lang_sql = sql::upsert_lang(def);
            for lang in languages_of(def, values) {
                let mut query = sqlx::query(&lang_sql).bind(key).bind(lang.as_i32());
                for field in sql::lang_columns(def) {
                    let text = values
                        .lang(field.name)
                        .and_then(|map| map.get(lang))
                        .cloned()
                        .unwrap_or_default();
                    query = bind_field(query, field, &FieldValue::Text(text))?;
                }
                query.execute(&mut **tx).await?;
            }
        }

        Ok(())
    }
}

/// Every language present in at least one lang field.
fn languages_of(def: &EntityDefinition, values: &EntityValues) -> Vec<LangId> {
    let mut langs: Vec<LangId> = def
        .lang_fields()
        .filter_map(|f| values.lang(f.name))
        .flat_map(LangMap::langs)
        .collect();
    langs.sort_unstable();
    langs.dedup();
    langs
}

fn decode_row(
    row: &PgRow,
    fields: Vec<&'static FieldDef>,
) -> Result<EntityValues, RepositoryError> {
    let mut values = EntityValues::new();
    for field in fields {
        values.set(field.name, decode_field(row, field)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thirtybees_core::FieldType;

    const DEF: EntityDefinition = EntityDefinition {
        table: "thing",
        primary: "id_thing",
        fields: &[
            FieldDef::new("price", FieldType::Price).shop(),
            FieldDef::new("name", FieldType::String).lang(),
            FieldDef::new("description", FieldType::Html).lang(),
        ],
        timestamps: false,
    };

    #[test]
    fn test_languages_of_unions_lang_fields() {
        let values = EntityValues::new()
            .with_lang(
                "name",
                [(LangId::new(2), "b".to_owned()), (LangId::new(1), "a".to_owned())]
                    .into_iter()
                    .collect(),
            )
            .with_lang("description", LangMap::single(LangId::new(3), "c".to_owned()));

        assert_eq!(
            languages_of(&DEF, &values),
            vec![LangId::new(1), LangId::new(2), LangId::new(3)]
        );
    }

    #[test]
    fn test_languages_of_empty_without_translations() {
        assert!(languages_of(&DEF, &EntityValues::new()).is_empty());
    }
}
