//! YAML data loader.
//!
//! A data file describes the rows of one entity:
//!
//! ```yaml
//! entity: attribute
//! rows:
//!   - id: color_red
//!     fields:
//!       id_attribute_group: "@attribute_group:color"
//!       color: "#E84C3D"
//!     lang:
//!       name: { en: Red, fr: Rouge }
//! ```
//!
//! `id` is a symbolic name other rows refer to as `@entity:id`. Values are
//! cast to the column types read from `information_schema`. Translations
//! go to `{entity}_lang`; a language without a translation gets the first
//! one listed. When `{entity}_shop` exists every row is added to every shop,
//! with the base values of the columns both tables share.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use thirtybees_core::LangId;

use super::InstallError;
use crate::db::object_model::sql::quote_ident;

const REFERENCE_PREFIX: char = '@';

// =============================================================================
// Data Files
// =============================================================================

/// One entity's data file.
#[derive(Debug, Clone, Deserialize)]
pub struct DataFile {
    pub entity: String,
    /// Primary key column; `id_{entity}` when omitted.
    #[serde(default)]
    pub primary: Option<String>,
    /// Rows have no primary key of their own (link tables).
    #[serde(default)]
    pub association: bool,
    #[serde(default)]
    pub rows: Vec<DataRow>,
}

/// One row of a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct DataRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Field to language iso code to text.
    #[serde(default)]
    pub lang: BTreeMap<String, BTreeMap<String, String>>,
}

impl DataFile {
    /// Parse a data file.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Io` or `InstallError::Yaml` if the file cannot
    /// be read or parsed.
    pub fn read(path: &Path) -> Result<Self, InstallError> {
        let content = fs::read_to_string(path).map_err(|source| InstallError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| InstallError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Primary key column.
    #[must_use]
    pub fn primary(&self) -> String {
        self.primary
            .clone()
            .unwrap_or_else(|| format!("id_{}", self.entity))
    }

    /// Entities this file refers to, itself excluded.
    #[must_use]
    pub fn dependencies(&self) -> HashSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.fields.values())
            .filter_map(|value| parse_reference(value.as_str()?))
            .map(|(entity, _)| entity.to_owned())
            .filter(|entity| *entity != self.entity)
            .collect()
    }
}

/// Split `@entity:id` into its parts.
#[must_use]
pub fn parse_reference(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix(REFERENCE_PREFIX)?;
    let (entity, id) = rest.split_once(':')?;
    (!entity.is_empty() && !id.is_empty()).then_some((entity, id))
}

/// Order files so every entity comes after the entities it refers to.
///
/// Files keep their given order where no reference forces otherwise.
/// References to entities outside `files` are ignored here and resolved
/// against the id map at load time.
///
/// # Errors
///
/// Returns `InstallError::DependencyCycle` if entities refer to each other.
pub fn sort_by_dependencies(files: Vec<DataFile>) -> Result<Vec<DataFile>, InstallError> {
    let present: HashSet<String> = files.iter().map(|f| f.entity.clone()).collect();
    let mut pending: Vec<(DataFile, HashSet<String>)> = files
        .into_iter()
        .map(|f| {
            let deps = f
                .dependencies()
                .into_iter()
                .filter(|d| present.contains(d))
                .collect();
            (f, deps)
        })
        .collect();

    let mut sorted = Vec::with_capacity(pending.len());
    let mut done: HashSet<String> = HashSet::new();
    while !pending.is_empty() {
        let Some(next) = pending
            .iter()
            .position(|(_, deps)| deps.iter().all(|d| done.contains(d)))
        else {
            let names: Vec<&str> = pending.iter().map(|(f, _)| f.entity.as_str()).collect();
            return Err(InstallError::DependencyCycle(names.join(", ")));
        };
        let (file, _) = pending.remove(next);
        done.insert(file.entity.clone());
        sorted.push(file);
    }
    Ok(sorted)
}

// =============================================================================
// Id Map
// =============================================================================

/// Database ids of the symbolic row ids loaded so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap(HashMap<String, HashMap<String, i32>>);

impl IdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, entity: &str, id: &str) -> Option<i32> {
        self.0.get(entity)?.get(id).copied()
    }

    pub fn insert(&mut self, entity: &str, id: &str, value: i32) {
        self.0
            .entry(entity.to_owned())
            .or_default()
            .insert(id.to_owned(), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Loader
// =============================================================================

/// How rows are matched to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert every row.
    Insert,
    /// Look up rows inserted by an earlier run to rebuild the id map.
    Lookup,
}

/// Loads data files of one directory.
pub struct DataLoader<'a> {
    pool: &'a PgPool,
    dir: PathBuf,
    /// Installed languages by iso code.
    languages: BTreeMap<String, LangId>,
    ids: IdMap,
    column_types: HashMap<String, HashMap<String, String>>,
}

impl<'a> DataLoader<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool, dir: impl Into<PathBuf>, languages: BTreeMap<String, LangId>) -> Self {
        Self {
            pool,
            dir: dir.into(),
            languages,
            ids: IdMap::new(),
            column_types: HashMap::new(),
        }
    }

    /// Start from ids resolved by an earlier loader.
    #[must_use]
    pub fn with_ids(mut self, ids: IdMap) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub const fn ids(&self) -> &IdMap {
        &self.ids
    }

    #[must_use]
    pub fn into_ids(self) -> IdMap {
        self.ids
    }

    /// Data files of the directory, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Io` if the directory cannot be listed.
    pub fn data_files(&self) -> Result<Vec<PathBuf>, InstallError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| InstallError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yml" || ext == "yaml"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn entity_file(&self, entity: &str) -> Result<DataFile, InstallError> {
        for ext in ["yml", "yaml"] {
            let path = self.dir.join(format!("{entity}.{ext}"));
            if path.is_file() {
                return DataFile::read(&path);
            }
        }
        Err(InstallError::DataFileNotFound {
            dir: self.dir.clone(),
            entity: entity.to_owned(),
        })
    }

    /// Load every data file of the directory.
    ///
    /// # Errors
    ///
    /// Returns an `InstallError` on the first file that fails.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn populate_all(&mut self, mode: LoadMode) -> Result<usize, InstallError> {
        let files = self
            .data_files()?
            .iter()
            .map(|p| DataFile::read(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.populate_files(files, mode).await
    }

    /// Load the data files of the named entities.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::DataFileNotFound` if an entity has no file.
    /// Returns an `InstallError` on the first file that fails.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn populate_entities(
        &mut self,
        entities: &[String],
        mode: LoadMode,
    ) -> Result<usize, InstallError> {
        let files = entities
            .iter()
            .map(|e| self.entity_file(e))
            .collect::<Result<Vec<_>, _>>()?;
        self.populate_files(files, mode).await
    }

    async fn populate_files(
        &mut self,
        files: Vec<DataFile>,
        mode: LoadMode,
    ) -> Result<usize, InstallError> {
        let mut total = 0;
        for file in sort_by_dependencies(files)? {
            total += self.populate_entity(&file, mode).await?;
        }
        Ok(total)
    }

    /// Load the rows of one data file.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::UnresolvedReference` if a reference points to
    /// an unknown row, `InstallError::UnknownColumn` if a field is not a
    /// column of the table, or `InstallError::Database` if a statement fails.
    #[instrument(skip(self, file), fields(entity = %file.entity, rows = file.rows.len()))]
    pub async fn populate_entity(&mut self, file: &DataFile, mode: LoadMode) -> Result<usize, InstallError> {
        let table = file.entity.as_str();
        let primary = file.primary();
        let base_types = self.columns(table).await?;
        let lang_table = format!("{table}_lang");
        let shop_table = format!("{table}_shop");
        let lang_types = self.columns(&lang_table).await?;
        let shop_types = self.columns(&shop_table).await?;

        let mut tx = self.pool.begin().await?;
        let mut count = 0;
        let mut claimed: Vec<i32> = Vec::new();
        for (index, row) in file.rows.iter().enumerate() {
            let row_name = row.id.clone().unwrap_or_else(|| index.to_string());
            let values = self.resolve_fields(file, &row_name, row, &base_types)?;

            if file.association {
                if mode == LoadMode::Insert {
                    insert_row(&mut tx, table, None, &values, &base_types).await?;
                }
                count += 1;
                continue;
            }

            let id = match mode {
                LoadMode::Insert => insert_row(&mut tx, table, Some(&primary), &values, &base_types)
                    .await?
                    .ok_or_else(|| InstallError::Loader(format!("{table}: no id returned")))?,
                LoadMode::Lookup => lookup_row(&mut tx, table, &primary, &values, &base_types, &claimed)
                    .await?
                    .ok_or_else(|| InstallError::UnresolvedReference {
                        entity: table.to_owned(),
                        row: row_name.clone(),
                        reference: format!("{REFERENCE_PREFIX}{table}:{row_name}"),
                    })?,
            };

            if mode == LoadMode::Insert {
                if !lang_types.is_empty() {
                    self.insert_translations(&mut tx, &lang_table, &primary, id, row, &lang_types)
                        .await?;
                }
                if !shop_types.is_empty() {
                    insert_shop_rows(&mut tx, &shop_table, &primary, id, &values, &shop_types).await?;
                }
            }

            if let Some(symbol) = &row.id {
                self.ids.insert(table, symbol, id);
            }
            claimed.push(id);
            count += 1;
        }
        tx.commit().await?;

        info!(count, ?mode, "Entity populated");
        Ok(count)
    }

    async fn columns(&mut self, table: &str) -> Result<HashMap<String, String>, InstallError> {
        if let Some(types) = self.column_types.get(table) {
            return Ok(types.clone());
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT column_name::TEXT, data_type::TEXT
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ",
        )
        .bind(table)
        .fetch_all(self.pool)
        .await?;

        let types: HashMap<String, String> = rows.into_iter().collect();
        debug!(table, columns = types.len(), "Column types read");
        self.column_types.insert(table.to_owned(), types.clone());
        Ok(types)
    }

    fn resolve_fields(
        &self,
        file: &DataFile,
        row_name: &str,
        row: &DataRow,
        types: &HashMap<String, String>,
    ) -> Result<Vec<(String, Option<String>)>, InstallError> {
        row.fields
            .iter()
            .map(|(column, value)| {
                if !types.contains_key(column) {
                    return Err(InstallError::UnknownColumn {
                        entity: file.entity.clone(),
                        column: column.clone(),
                    });
                }
                let resolved = match value.as_str().and_then(parse_reference) {
                    Some((entity, id)) => Some(
                        self.ids
                            .get(entity, id)
                            .ok_or_else(|| InstallError::UnresolvedReference {
                                entity: file.entity.clone(),
                                row: row_name.to_owned(),
                                reference: format!("{REFERENCE_PREFIX}{entity}:{id}"),
                            })?
                            .to_string(),
                    ),
                    None => scalar_text(value).map_err(|reason| InstallError::InvalidValue {
                        entity: file.entity.clone(),
                        column: column.clone(),
                        reason,
                    })?,
                };
                Ok((column.clone(), resolved))
            })
            .collect()
    }

    async fn insert_translations(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
        lang_table: &str,
        primary: &str,
        id: i32,
        row: &DataRow,
        types: &HashMap<String, String>,
    ) -> Result<(), InstallError> {
        if row.lang.is_empty() {
            return Ok(());
        }

        for (iso, lang) in &self.languages {
            let mut values: Vec<(String, Option<String>)> = Vec::with_capacity(row.lang.len() + 2);
            values.push((primary.to_owned(), Some(id.to_string())));
            values.push(("id_lang".to_owned(), Some(lang.as_i32().to_string())));
            for (field, texts) in &row.lang {
                if !types.contains_key(field) {
                    return Err(InstallError::UnknownColumn {
                        entity: lang_table.to_owned(),
                        column: field.clone(),
                    });
                }
                values.push((field.clone(), translation(texts, iso).map(str::to_owned)));
            }
            insert_row(tx, lang_table, None, &values, types).await?;
        }
        Ok(())
    }
}

/// Text of `iso`, or the first translation given.
#[must_use]
pub fn translation<'t>(texts: &'t BTreeMap<String, String>, iso: &str) -> Option<&'t str> {
    texts
        .get(iso)
        .or_else(|| texts.values().next())
        .map(String::as_str)
}

/// Text form of a scalar YAML value; `None` for null.
///
/// # Errors
///
/// Returns a reason when the value is a sequence or mapping.
pub fn scalar_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
            Err("only scalar values can be loaded".to_owned())
        }
    }
}

fn cast(index: usize, column: &str, types: &HashMap<String, String>) -> String {
    let ty = types.get(column).map_or("text", String::as_str);
    format!("CAST(${index} AS {ty})")
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    table: &str,
    primary: Option<&str>,
    values: &[(String, Option<String>)],
    types: &HashMap<String, String>,
) -> Result<Option<i32>, InstallError> {
    let returning = primary.map(|p| format!(" RETURNING {}", quote_ident(p)));
    let sql = if values.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES{}",
            quote_ident(table),
            returning.unwrap_or_default()
        )
    } else {
        let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
        let params: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (c, _))| cast(i + 1, c, types))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            quote_ident(table),
            columns.join(", "),
            params.join(", "),
            returning.unwrap_or_default()
        )
    };

    if primary.is_some() {
        let mut query = sqlx::query_scalar::<_, i32>(&sql);
        for (_, value) in values {
            query = query.bind(value.as_deref());
        }
        Ok(Some(query.fetch_one(&mut **tx).await?))
    } else {
        let mut query = sqlx::query(&sql);
        for (_, value) in values {
            query = query.bind(value.as_deref());
        }
        query.execute(&mut **tx).await?;
        Ok(None)
    }
}

async fn lookup_row(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    table: &str,
    primary: &str,
    values: &[(String, Option<String>)],
    types: &HashMap<String, String>,
    claimed: &[i32],
) -> Result<Option<i32>, InstallError> {
    let mut conditions: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, (c, _))| {
            format!("{} IS NOT DISTINCT FROM {}", quote_ident(c), cast(i + 1, c, types))
        })
        .collect();
    // Rows with identical values map to distinct ids in file order.
    conditions.push(format!(
        "{} <> ALL(${}::INTEGER[])",
        quote_ident(primary),
        values.len() + 1
    ));
    let sql = format!(
        "SELECT {primary} FROM {table} WHERE {filter} ORDER BY {primary} LIMIT 1",
        primary = quote_ident(primary),
        table = quote_ident(table),
        filter = conditions.join(" AND "),
    );

    let mut query = sqlx::query_scalar::<_, i32>(&sql);
    for (_, value) in values {
        query = query.bind(value.as_deref());
    }
    Ok(query.bind(claimed.to_vec()).fetch_optional(&mut **tx).await?)
}

async fn insert_shop_rows(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    shop_table: &str,
    primary: &str,
    id: i32,
    values: &[(String, Option<String>)],
    types: &HashMap<String, String>,
) -> Result<(), InstallError> {
    let shops: Vec<i32> = sqlx::query_scalar("SELECT id_shop FROM shop ORDER BY id_shop")
        .fetch_all(&mut **tx)
        .await?;

    for shop in shops {
        let mut shop_values = vec![
            (primary.to_owned(), Some(id.to_string())),
            ("id_shop".to_owned(), Some(shop.to_string())),
        ];
        shop_values.extend(
            values
                .iter()
                .filter(|(c, _)| types.contains_key(c) && c != primary && c != "id_shop")
                .cloned(),
        );
        insert_row(tx, shop_table, None, &shop_values, types).await?;
    }
    Ok(())
}
