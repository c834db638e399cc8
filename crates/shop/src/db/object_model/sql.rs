//! SQL statements for the object mapper.
//!
//! Every builder is a pure function of an [`EntityDefinition`]. Identifiers are
//! double-quoted and values are always bound through `$n` placeholders. The
//! bind order of each statement is documented on the builder and mirrored by
//! the mapper.

use thirtybees_core::{EntityDefinition, FieldDef};

/// Column holding the shop id in `{table}_shop`.
pub const SHOP_COLUMN: &str = "id_shop";
/// Column holding the language id in `{table}_lang`.
pub const LANG_COLUMN: &str = "id_lang";

/// Quote an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn names<'a>(fields: &'a [&'static FieldDef]) -> impl Iterator<Item = &'static str> + 'a {
    fields.iter().map(|f| f.name)
}

/// Columns written to the base table, in bind order.
#[must_use]
pub fn base_columns(def: &EntityDefinition) -> Vec<&'static FieldDef> {
    def.base_fields().collect()
}

/// Columns written to `{table}_shop` after the primary key and shop id.
#[must_use]
pub fn shop_columns(def: &EntityDefinition) -> Vec<&'static FieldDef> {
    def.shop_fields().collect()
}

/// Columns written to `{table}_lang` after the primary key and language id.
#[must_use]
pub fn lang_columns(def: &EntityDefinition) -> Vec<&'static FieldDef> {
    def.lang_fields().collect()
}

/// `INSERT` of the base row.
///
/// Binds: base columns, then `date_add` and `date_upd` when the definition
/// keeps timestamps. Returns the generated primary key.
#[must_use]
pub fn insert_base(def: &EntityDefinition) -> String {
    let mut columns: Vec<&str> = names(&base_columns(def)).collect();
    if def.timestamps {
        columns.extend(["date_add", "date_upd"]);
    }
    format!(
        "INSERT INTO {table} ({columns}) VALUES ({values}) RETURNING {primary}",
        table = quote_ident(def.table),
        values = placeholders(1, columns.len()),
        columns = column_list(columns),
        primary = quote_ident(def.primary),
    )
}

/// `UPDATE` of the base row.
///
/// Binds: primary key, base columns, then `date_upd` when the definition
/// keeps timestamps.
#[must_use]
pub fn update_base(def: &EntityDefinition) -> String {
    let mut columns: Vec<&str> = names(&base_columns(def)).collect();
    if def.timestamps {
        columns.push("date_upd");
    }
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {table} SET {assignments} WHERE {primary} = $1",
        table = quote_ident(def.table),
        primary = quote_ident(def.primary),
    )
}

/// `SELECT` of the base row. Binds: primary key.
#[must_use]
pub fn select_base(def: &EntityDefinition) -> String {
    let columns = base_columns(def);
    format!(
        "SELECT {primary}, {columns} FROM {table} WHERE {primary} = $1",
        primary = quote_ident(def.primary),
        columns = column_list(names(&columns)),
        table = quote_ident(def.table),
    )
}

fn shop_upsert_tail(def: &EntityDefinition, columns: &[&'static FieldDef]) -> String {
    let conflict = column_list([def.primary, SHOP_COLUMN]);
    if columns.is_empty() {
        return format!(" ON CONFLICT ({conflict}) DO NOTHING");
    }
    let updates = columns
        .iter()
        .map(|f| format!("{0} = EXCLUDED.{0}", quote_ident(f.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ON CONFLICT ({conflict}) DO UPDATE SET {updates}")
}

/// Insert-or-update of one `{table}_shop` row.
///
/// Binds: primary key, shop id, then the shop columns.
#[must_use]
pub fn upsert_shop(def: &EntityDefinition) -> String {
    let columns = shop_columns(def);
    let mut all = vec![def.primary, SHOP_COLUMN];
    all.extend(names(&columns));
    format!(
        "INSERT INTO {table} ({list}) VALUES ({values}){tail}",
        table = quote_ident(&def.shop_table()),
        values = placeholders(1, all.len()),
        list = column_list(all),
        tail = shop_upsert_tail(def, &columns),
    )
}

/// `SELECT` of the shop overlay for one shop. Binds: primary key, shop id.
#[must_use]
pub fn select_shop(def: &EntityDefinition) -> String {
    format!(
        "SELECT {columns} FROM {table} WHERE {primary} = $1 AND {shop} = $2",
        columns = column_list(names(&shop_columns(def))),
        table = quote_ident(&def.shop_table()),
        primary = quote_ident(def.primary),
        shop = quote_ident(SHOP_COLUMN),
    )
}

/// Removal of the shop rows of the given shops.
///
/// Binds: primary key, shop ids as an `INTEGER[]`.
#[must_use]
pub fn delete_shop(def: &EntityDefinition) -> String {
    format!(
        "DELETE FROM {table} WHERE {primary} = $1 AND {shop} = ANY($2)",
        table = quote_ident(&def.shop_table()),
        primary = quote_ident(def.primary),
        shop = quote_ident(SHOP_COLUMN),
    )
}

/// Number of shop rows of one object. Binds: primary key.
#[must_use]
pub fn count_shop(def: &EntityDefinition) -> String {
    format!(
        "SELECT COUNT(*) FROM {table} WHERE {primary} = $1",
        table = quote_ident(&def.shop_table()),
        primary = quote_ident(def.primary),
    )
}

/// Insert-or-update of one `{table}_lang` row.
///
/// Binds: primary key, language id, then the lang columns.
#[must_use]
pub fn upsert_lang(def: &EntityDefinition) -> String {
    let columns = lang_columns(def);
    let mut all = vec![def.primary, LANG_COLUMN];
    all.extend(names(&columns));
    let updates = columns
        .iter()
        .map(|f| format!("{0} = EXCLUDED.{0}", quote_ident(f.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({list}) VALUES ({values}) ON CONFLICT ({conflict}) DO UPDATE SET {updates}",
        table = quote_ident(&def.lang_table()),
        values = placeholders(1, all.len()),
        list = column_list(all),
        conflict = column_list([def.primary, LANG_COLUMN]),
    )
}

/// `SELECT` of translations, ordered by language.
///
/// Binds: primary key, plus the language id when `single_lang` is set.
#[must_use]
pub fn select_lang(def: &EntityDefinition, single_lang: bool) -> String {
    let filter = if single_lang {
        format!(" AND {} = $2", quote_ident(LANG_COLUMN))
    } else {
        String::new()
    };
    format!(
        "SELECT {lang}, {columns} FROM {table} WHERE {primary} = $1{filter} ORDER BY {lang}",
        lang = quote_ident(LANG_COLUMN),
        columns = column_list(names(&lang_columns(def))),
        table = quote_ident(&def.lang_table()),
        primary = quote_ident(def.primary),
    )
}

/// Removal of every translation of one object. Binds: primary key.
#[must_use]
pub fn delete_lang(def: &EntityDefinition) -> String {
    delete_by_primary(&def.lang_table(), def.primary)
}

/// Removal of the base row. Binds: primary key.
#[must_use]
pub fn delete_base(def: &EntityDefinition) -> String {
    delete_by_primary(def.table, def.primary)
}

fn delete_by_primary(table: &str, primary: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        quote_ident(table),
        quote_ident(primary)
    )
}

/// Whether the base row exists. Binds: primary key.
#[must_use]
pub fn exists(def: &EntityDefinition) -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
        quote_ident(def.table),
        quote_ident(def.primary)
    )
}

/// Whether `table` holds at least one row. No binds.
#[must_use]
pub fn table_has_rows(table: &str) -> String {
    format!("SELECT EXISTS (SELECT 1 FROM {})", quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use thirtybees_core::FieldType;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("id_product", FieldType::Int).shop().required(),
        FieldDef::new("reference", FieldType::String).size(32),
        FieldDef::new("price", FieldType::Price).shop(),
        FieldDef::new("name", FieldType::String).lang(),
    ];

    const DEF: EntityDefinition = EntityDefinition {
        table: "thing",
        primary: "id_thing",
        fields: FIELDS,
        timestamps: true,
    };

    const PLAIN: EntityDefinition = EntityDefinition {
        table: "group",
        primary: "id_group",
        fields: &[FieldDef::new("reduction", FieldType::Price)],
        timestamps: false,
    };

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("group"), "\"group\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_insert_base_with_timestamps() {
        assert_eq!(
            insert_base(&DEF),
            "INSERT INTO \"thing\" (\"id_product\", \"reference\", \"price\", \"date_add\", \"date_upd\") \
             VALUES ($1, $2, $3, $4, $5) RETURNING \"id_thing\""
        );
    }

    #[test]
    fn test_insert_base_without_timestamps() {
        assert_eq!(
            insert_base(&PLAIN),
            "INSERT INTO \"group\" (\"reduction\") VALUES ($1) RETURNING \"id_group\""
        );
    }

    #[test]
    fn test_update_base_binds_primary_first() {
        assert_eq!(
            update_base(&DEF),
            "UPDATE \"thing\" SET \"id_product\" = $2, \"reference\" = $3, \"price\" = $4, \
             \"date_upd\" = $5 WHERE \"id_thing\" = $1"
        );
    }

    #[test]
    fn test_select_base_lists_columns() {
        assert_eq!(
            select_base(&DEF),
            "SELECT \"id_thing\", \"id_product\", \"reference\", \"price\" FROM \"thing\" \
             WHERE \"id_thing\" = $1"
        );
    }

    #[test]
    fn test_upsert_shop_updates_shop_columns() {
        assert_eq!(
            upsert_shop(&DEF),
            "INSERT INTO \"thing_shop\" (\"id_thing\", \"id_shop\", \"id_product\", \"price\") \
             VALUES ($1, $2, $3, $4) ON CONFLICT (\"id_thing\", \"id_shop\") DO UPDATE SET \
             \"id_product\" = EXCLUDED.\"id_product\", \"price\" = EXCLUDED.\"price\""
        );
    }

    #[test]
    fn test_upsert_shop_without_columns_does_nothing_on_conflict() {
        let sql = upsert_shop(&PLAIN);
        assert!(sql.starts_with("INSERT INTO \"group_shop\" (\"id_group\", \"id_shop\") VALUES ($1, $2)"));
        assert!(sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn test_select_lang_single_and_all() {
        assert_eq!(
            select_lang(&DEF, true),
            "SELECT \"id_lang\", \"name\" FROM \"thing_lang\" WHERE \"id_thing\" = $1 \
             AND \"id_lang\" = $2 ORDER BY \"id_lang\""
        );
        assert!(!select_lang(&DEF, false).contains("$2"));
    }

    #[test]
    fn test_upsert_lang() {
        assert_eq!(
            upsert_lang(&DEF),
            "INSERT INTO \"thing_lang\" (\"id_thing\", \"id_lang\", \"name\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id_thing\", \"id_lang\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );
    }

    #[test]
    fn test_delete_statements() {
        assert_eq!(
            delete_shop(&DEF),
            "DELETE FROM \"thing_shop\" WHERE \"id_thing\" = $1 AND \"id_shop\" = ANY($2)"
        );
        assert_eq!(delete_base(&DEF), "DELETE FROM \"thing\" WHERE \"id_thing\" = $1");
        assert_eq!(
            delete_lang(&DEF),
            "DELETE FROM \"thing_lang\" WHERE \"id_thing\" = $1"
        );
    }

    #[test]
    fn test_existence_checks() {
        assert_eq!(
            exists(&DEF),
            "SELECT EXISTS (SELECT 1 FROM \"thing\" WHERE \"id_thing\" = $1)"
        );
        assert_eq!(
            table_has_rows("product_attribute"),
            "SELECT EXISTS (SELECT 1 FROM \"product_attribute\")"
        );
        assert_eq!(
            count_shop(&DEF),
            "SELECT COUNT(*) FROM \"thing_shop\" WHERE \"id_thing\" = $1"
        );
    }
}
