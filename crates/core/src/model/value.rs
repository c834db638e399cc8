//! Field values exchanged between entities and the persistence mapper.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::definition::FieldType;
use crate::types::LangMap;

/// Errors raised while converting stored values back into an entity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A stored value does not have the type the entity expects.
    #[error("field {field} holds a {found} value, expected {expected:?}")]
    TypeMismatch {
        field: &'static str,
        expected: FieldType,
        found: &'static str,
    },
    /// A value the entity cannot do without is missing.
    #[error("field {0} is missing")]
    Missing(&'static str),
    /// A stored value is outside the domain of the entity type.
    #[error("field {field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A single, typed field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Price(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Whether the value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value kind, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Price(_) => "price",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
        }
    }

    /// Whether a value of this kind can be stored in a field of type `ty`.
    ///
    /// `Null` matches every type.
    #[must_use]
    pub const fn matches(&self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (Self::Null, _)
                | (Self::Bool(_), FieldType::Bool)
                | (Self::Int(_), FieldType::Int)
                | (Self::Float(_), FieldType::Float)
                | (Self::Price(_), FieldType::Price)
                | (Self::Text(_), FieldType::String | FieldType::Html)
                | (Self::Date(_), FieldType::Date)
                | (Self::DateTime(_), FieldType::DateTime)
        )
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Price(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

static NULL: FieldValue = FieldValue::Null;

/// The stored representation of one entity: plain field values plus
/// per-language values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityValues {
    fields: BTreeMap<&'static str, FieldValue>,
    lang: BTreeMap<&'static str, LangMap<String>>,
}

impl EntityValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`EntityValues::set`].
    #[must_use]
    pub fn with(mut self, field: &'static str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Builder-style [`EntityValues::set_lang`].
    #[must_use]
    pub fn with_lang(mut self, field: &'static str, values: LangMap<String>) -> Self {
        self.set_lang(field, values);
        self
    }

    pub fn set(&mut self, field: &'static str, value: impl Into<FieldValue>) {
        self.fields.insert(field, value.into());
    }

    pub fn set_lang(&mut self, field: &'static str, values: LangMap<String>) {
        self.lang.insert(field, values);
    }

    /// Value of a plain field; `Null` when unset.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Translations of a lang field.
    #[must_use]
    pub fn lang(&self, field: &str) -> Option<&LangMap<String>> {
        self.lang.get(field)
    }

    /// Mutable translations of a lang field, created empty when missing.
    pub fn lang_mut(&mut self, field: &'static str) -> &mut LangMap<String> {
        self.lang.entry(field).or_default()
    }

    /// Iterate over plain field values.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    /// Overwrite every plain and lang value present in `other`.
    pub fn merge(&mut self, other: Self) {
        self.fields.extend(other.fields);
        self.lang.extend(other.lang);
    }

    fn mismatch(field: &'static str, expected: FieldType, found: &FieldValue) -> ModelError {
        ModelError::TypeMismatch {
            field,
            expected,
            found: found.kind(),
        }
    }

    /// Integer value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not an integer.
    pub fn int(&self, field: &'static str) -> Result<Option<i32>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Int(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::Int, other)),
        }
    }

    /// Boolean value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not a boolean.
    pub fn bool(&self, field: &'static str) -> Result<Option<bool>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Bool(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::Bool, other)),
        }
    }

    /// Float value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not a float.
    pub fn float(&self, field: &'static str) -> Result<Option<f64>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Float(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::Float, other)),
        }
    }

    /// Price value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not a price.
    pub fn price(&self, field: &'static str) -> Result<Option<Decimal>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Price(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::Price, other)),
        }
    }

    /// Text value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not text.
    pub fn text(&self, field: &'static str) -> Result<Option<String>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Text(v) => Ok(Some(v.clone())),
            other => Err(Self::mismatch(field, FieldType::String, other)),
        }
    }

    /// Date value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not a date.
    pub fn date(&self, field: &'static str) -> Result<Option<NaiveDate>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::Date(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::Date, other)),
        }
    }

    /// Timestamp value of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TypeMismatch`] when the value is not a timestamp.
    pub fn datetime(&self, field: &'static str) -> Result<Option<DateTime<Utc>>, ModelError> {
        match self.get(field) {
            FieldValue::Null => Ok(None),
            FieldValue::DateTime(v) => Ok(Some(*v)),
            other => Err(Self::mismatch(field, FieldType::DateTime, other)),
        }
    }
}
