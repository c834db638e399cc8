//! Typed binding and decoding of entity values.
//!
//! `PostgreSQL` needs every parameter to carry a concrete type, including
//! nulls, so values are bound according to the field's [`FieldType`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use thirtybees_core::{FieldDef, FieldType, FieldValue, ModelError};

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Value stored for a `NULL` in a column that does not accept it.
#[must_use]
pub fn zero_value(ty: FieldType) -> FieldValue {
    match ty {
        FieldType::Int => FieldValue::Int(0),
        FieldType::Bool => FieldValue::Bool(false),
        FieldType::Float => FieldValue::Float(0.0),
        FieldType::Price => FieldValue::Price(Decimal::ZERO),
        FieldType::String | FieldType::Html => FieldValue::Text(String::new()),
        FieldType::Date => FieldValue::Date(NaiveDate::default()),
        FieldType::DateTime => FieldValue::DateTime(DateTime::<Utc>::default()),
    }
}

/// Bind `value` as a parameter of `field`'s type.
///
/// # Errors
///
/// Returns [`ModelError::TypeMismatch`] when the value kind does not fit the
/// field type.
pub fn bind_field<'q>(
    query: PgQuery<'q>,
    field: &FieldDef,
    value: &FieldValue,
) -> Result<PgQuery<'q>, ModelError> {
    if !value.matches(field.ty) {
        return Err(ModelError::TypeMismatch {
            field: field.name,
            expected: field.ty,
            found: value.kind(),
        });
    }

    if value.is_null() && !field.allow_null {
        return Ok(bind_present(query, &zero_value(field.ty)));
    }

    Ok(match (value, field.ty) {
        (FieldValue::Null, FieldType::Int) => query.bind(None::<i32>),
        (FieldValue::Null, FieldType::Bool) => query.bind(None::<bool>),
        (FieldValue::Null, FieldType::Float) => query.bind(None::<f64>),
        (FieldValue::Null, FieldType::Price) => query.bind(None::<Decimal>),
        (FieldValue::Null, FieldType::String | FieldType::Html) => query.bind(None::<String>),
        (FieldValue::Null, FieldType::Date) => query.bind(None::<NaiveDate>),
        (FieldValue::Null, FieldType::DateTime) => query.bind(None::<DateTime<Utc>>),
        (present, _) => bind_present(query, present),
    })
}

fn bind_present<'q>(query: PgQuery<'q>, value: &FieldValue) -> PgQuery<'q> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Bool(v) => query.bind(*v),
        FieldValue::Int(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::Price(v) => query.bind(*v),
        FieldValue::Text(v) => query.bind(v.clone()),
        FieldValue::Date(v) => query.bind(*v),
        FieldValue::DateTime(v) => query.bind(*v),
    }
}

/// Read the column named after `field` from `row`.
///
/// # Errors
///
/// Returns `sqlx::Error` when the column is missing or has another type.
pub fn decode_field(row: &PgRow, field: &FieldDef) -> Result<FieldValue, sqlx::Error> {
    let name = field.name;
    Ok(match field.ty {
        FieldType::Int => row.try_get::<Option<i32>, _>(name)?.into(),
        FieldType::Bool => row.try_get::<Option<bool>, _>(name)?.into(),
        FieldType::Float => row.try_get::<Option<f64>, _>(name)?.into(),
        FieldType::Price => row.try_get::<Option<Decimal>, _>(name)?.into(),
        FieldType::String | FieldType::Html => row.try_get::<Option<String>, _>(name)?.into(),
        FieldType::Date => row.try_get::<Option<NaiveDate>, _>(name)?.into(),
        FieldType::DateTime => row.try_get::<Option<DateTime<Utc>>, _>(name)?.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_match_their_type() {
        for ty in [
            FieldType::Int,
            FieldType::Bool,
            FieldType::Float,
            FieldType::Price,
            FieldType::String,
            FieldType::Html,
            FieldType::Date,
            FieldType::DateTime,
        ] {
            let zero = zero_value(ty);
            assert!(!zero.is_null());
            assert!(zero.matches(ty), "{ty:?}");
        }
    }

    #[test]
    fn test_bind_rejects_mismatched_kind() {
        let field = FieldDef::new("quantity", FieldType::Int);
        let result = bind_field(sqlx::query("SELECT $1"), &field, &FieldValue::from("many"));
        assert!(matches!(
            result,
            Err(ModelError::TypeMismatch {
                field: "quantity",
                found: "text",
                ..
            })
        ));
    }

    #[test]
    fn test_bind_accepts_null_for_any_type() {
        let field = FieldDef::new("default_on", FieldType::Bool).nullable();
        assert!(bind_field(sqlx::query("SELECT $1"), &field, &FieldValue::Null).is_ok());
    }
}
