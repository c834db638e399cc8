//! Field validation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::definition::{EntityDefinition, FieldDef, FieldType, Rule};
use super::value::{EntityValues, FieldValue};
use crate::types::LangId;

static GENERIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>={}]*$").expect("valid generic name pattern"));
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>;={}]*$").expect("valid reference pattern"));
static EAN13: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{0,13}$").expect("valid ean13 pattern"));
static UPC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{0,12}$").expect("valid upc pattern"));
static DATE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4})-((0?[0-9])|(1[0-2]))-((0?[0-9])|([1-2][0-9])|(3[01]))( [0-9]{2}:[0-9]{2}:[0-9]{2})?$",
    )
    .expect("valid date pattern")
});

/// Most integer digits a price may carry.
const PRICE_INTEGER_DIGITS: u32 = 10;
/// Most decimal digits a price may carry.
const PRICE_SCALE: u32 = 9;

/// What went wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Required value is absent.
    Missing,
    /// Required translation is absent for the default language.
    MissingTranslation(LangId),
    /// String longer than the field size.
    TooLong { max: usize },
    /// Value kind does not fit the field type.
    TypeMismatch { expected: FieldType, found: &'static str },
    /// Value fails the field's rule.
    Invalid(Rule),
}

/// A validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub kind: FieldErrorKind,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldErrorKind::Missing => write!(f, "{} is required", self.field),
            FieldErrorKind::MissingTranslation(lang) => {
                write!(f, "{} is required for language {lang}", self.field)
            }
            FieldErrorKind::TooLong { max } => {
                write!(f, "{} is too long ({max} characters max)", self.field)
            }
            FieldErrorKind::TypeMismatch { expected, found } => {
                write!(f, "{} expects {expected:?}, got {found}", self.field)
            }
            FieldErrorKind::Invalid(rule) => {
                write!(f, "{} is not a valid {}", self.field, rule.name())
            }
        }
    }
}

/// All validation failures of one entity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed: {}", join(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Failures for a given field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> {
        self.0.iter().filter(move |e| e.field == field)
    }
}

/// Whether `value` is a valid, strictly positive row id.
#[must_use]
pub const fn is_unsigned_id(value: i64) -> bool {
    value > 0 && value <= i32::MAX as i64
}

/// Whether `value` looks like a price: up to 10 integer and 9 decimal digits.
#[must_use]
pub fn is_price(value: Decimal) -> bool {
    !value.is_sign_negative() && is_negative_price(value)
}

/// Like [`is_price`] but negative values are allowed (price impacts).
#[must_use]
pub fn is_negative_price(value: Decimal) -> bool {
    let normalized = value.normalize();
    if normalized.scale() > PRICE_SCALE {
        return false;
    }
    let integer = normalized.abs().trunc();
    integer.to_string().len() <= PRICE_INTEGER_DIGITS as usize
}

/// Whether `value` is a percentage between 0 and 100.
#[must_use]
pub fn is_percentage(value: Decimal) -> bool {
    is_price(value) && value <= Decimal::ONE_HUNDRED
}

/// Whether a free-form name is free of markup characters.
#[must_use]
pub fn is_generic_name(value: &str) -> bool {
    GENERIC_NAME.is_match(value)
}

/// Whether a product reference is acceptable.
#[must_use]
pub fn is_reference(value: &str) -> bool {
    REFERENCE.is_match(value)
}

/// Whether `value` is an EAN-13 code (up to 13 digits, may be empty).
#[must_use]
pub fn is_ean13(value: &str) -> bool {
    EAN13.is_match(value)
}

/// Whether `value` is a UPC code (up to 12 digits, may be empty).
#[must_use]
pub fn is_upc(value: &str) -> bool {
    UPC.is_match(value)
}

/// Whether `value` is formatted as `YYYY-MM-DD` with an optional time.
#[must_use]
pub fn is_date_format(value: &str) -> bool {
    DATE_FORMAT.is_match(value)
}

/// Check a single non-null value against a rule.
#[must_use]
pub fn check_rule(rule: Rule, value: &FieldValue) -> bool {
    match (rule, value) {
        (_, FieldValue::Null) | (Rule::Bool, FieldValue::Bool(_)) | (Rule::Int, FieldValue::Int(_)) => {
            true
        }
        (Rule::DateFormat, FieldValue::Date(_) | FieldValue::DateTime(_)) => true,
        (Rule::UnsignedId, FieldValue::Int(v)) => is_unsigned_id(i64::from(*v)),
        (Rule::UnsignedInt, FieldValue::Int(v)) => *v >= 0,
        (Rule::Float, FieldValue::Float(v)) => v.is_finite(),
        (Rule::UnsignedFloat, FieldValue::Float(v)) => v.is_finite() && *v >= 0.0,
        (Rule::Price, FieldValue::Price(v)) => is_price(*v),
        (Rule::NegativePrice, FieldValue::Price(v)) => is_negative_price(*v),
        (Rule::Percentage, FieldValue::Price(v)) => is_percentage(*v),
        (Rule::GenericName, FieldValue::Text(v)) => is_generic_name(v),
        (Rule::Reference, FieldValue::Text(v)) => is_reference(v),
        (Rule::Ean13, FieldValue::Text(v)) => is_ean13(v),
        (Rule::Upc, FieldValue::Text(v)) => is_upc(v),
        (Rule::DateFormat, FieldValue::Text(v)) => is_date_format(v),
        _ => false,
    }
}

fn check_value(field: &'static FieldDef, value: &FieldValue, errors: &mut Vec<FieldError>) {
    if !value.matches(field.ty) {
        errors.push(FieldError {
            field: field.name,
            kind: FieldErrorKind::TypeMismatch {
                expected: field.ty,
                found: value.kind(),
            },
        });
        return;
    }

    if let (Some(max), FieldValue::Text(text)) = (field.size, value)
        && text.chars().count() > max
    {
        errors.push(FieldError {
            field: field.name,
            kind: FieldErrorKind::TooLong { max },
        });
    }

    if let Some(rule) = field.validate
        && !check_rule(rule, value)
    {
        errors.push(FieldError {
            field: field.name,
            kind: FieldErrorKind::Invalid(rule),
        });
    }
}

/// Validate stored values against an entity definition.
///
/// Every failure is collected; the caller gets all of them at once.
///
/// # Errors
///
/// Returns [`ValidationErrors`] listing each failing field.
pub fn validate_entity(
    definition: &EntityDefinition,
    values: &EntityValues,
    default_lang: LangId,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    for field in definition.fields {
        if field.lang {
            let translations = values.lang(field.name);
            let has_default = translations
                .and_then(|t| t.get(default_lang))
                .is_some_and(|v| !v.is_empty());
            if field.required && !has_default {
                errors.push(FieldError {
                    field: field.name,
                    kind: FieldErrorKind::MissingTranslation(default_lang),
                });
            }
            for (_, text) in translations.into_iter().flat_map(|t| t.iter()) {
                check_value(field, &FieldValue::Text(text.clone()), &mut errors);
            }
            continue;
        }

        let value = values.get(field.name);
        let empty = match value {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            _ => false,
        };
        if field.required && empty {
            errors.push(FieldError {
                field: field.name,
                kind: FieldErrorKind::Missing,
            });
            continue;
        }
        check_value(field, value, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LangMap;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("id_product", FieldType::Int)
            .required()
            .validate(Rule::UnsignedId),
        FieldDef::new("ean13", FieldType::String)
            .size(13)
            .validate(Rule::Ean13),
        FieldDef::new("price", FieldType::Price).validate(Rule::NegativePrice),
        FieldDef::new("name", FieldType::String)
            .lang()
            .required()
            .size(32)
            .validate(Rule::GenericName),
    ];

    const DEF: EntityDefinition = EntityDefinition {
        table: "thing",
        primary: "id_thing",
        fields: FIELDS,
        timestamps: false,
    };

    fn en() -> LangId {
        LangId::new(1)
    }

    #[test]
    fn test_price_rules() {
        assert!(is_price(Decimal::new(1999, 2)));
        assert!(!is_price(Decimal::new(-1999, 2)));
        assert!(is_negative_price(Decimal::new(-1999, 2)));
        assert!(!is_negative_price(Decimal::new(12_345_678_901, 0)));
        assert!(!is_negative_price(Decimal::new(1, 10)));
        assert!(is_negative_price(Decimal::new(1_000, 12)));
    }

    #[test]
    fn test_text_rules() {
        assert!(is_generic_name("Visitors"));
        assert!(!is_generic_name("<script>"));
        assert!(is_ean13(""));
        assert!(is_ean13("4006381333931"));
        assert!(!is_ean13("40063813339310"));
        assert!(!is_upc("12345678901a"));
        assert!(is_date_format("2024-02-29"));
        assert!(is_date_format("2024-2-9 10:00:00"));
        assert!(!is_date_format("29/02/2024"));
        assert!(!is_reference("a;b"));
    }

    #[test]
    fn test_unsigned_id() {
        assert!(!is_unsigned_id(0));
        assert!(is_unsigned_id(1));
        assert!(!is_unsigned_id(i64::from(i32::MAX) + 1));
    }

    #[test]
    fn test_valid_entity_passes() {
        let values = EntityValues::new()
            .with("id_product", 3)
            .with("ean13", "4006381333931")
            .with("price", Decimal::new(-5, 0))
            .with_lang("name", LangMap::single(en(), "Blue".to_owned()));
        assert_eq!(validate_entity(&DEF, &values, en()), Ok(()));
    }

    #[test]
    fn test_all_errors_are_collected() {
        let values = EntityValues::new()
            .with("ean13", "not-a-code-at-all")
            .with("price", 7)
            .with_lang("name", LangMap::single(LangId::new(2), "a{b}".to_owned()));

        let errors = validate_entity(&DEF, &values, en()).unwrap_err();

        assert_eq!(
            errors.for_field("id_product").next().map(|e| &e.kind),
            Some(&FieldErrorKind::Missing)
        );
        let ean: Vec<_> = errors.for_field("ean13").map(|e| e.kind.clone()).collect();
        assert_eq!(
            ean,
            vec![
                FieldErrorKind::TooLong { max: 13 },
                FieldErrorKind::Invalid(Rule::Ean13)
            ]
        );
        assert!(matches!(
            errors.for_field("price").next().map(|e| &e.kind),
            Some(FieldErrorKind::TypeMismatch { .. })
        ));
        let name: Vec<_> = errors.for_field("name").map(|e| e.kind.clone()).collect();
        assert_eq!(
            name,
            vec![
                FieldErrorKind::MissingTranslation(en()),
                FieldErrorKind::Invalid(Rule::GenericName)
            ]
        );
    }

    #[test]
    fn test_zero_required_id_is_rejected_by_rule() {
        let values = EntityValues::new()
            .with("id_product", 0)
            .with_lang("name", LangMap::single(en(), "Blue".to_owned()));
        let errors = validate_entity(&DEF, &values, en()).unwrap_err();
        assert_eq!(
            errors.0,
            vec![FieldError {
                field: "id_product",
                kind: FieldErrorKind::Invalid(Rule::UnsignedId)
            }]
        );
    }

    #[test]
    fn test_error_display() {
        let errors = ValidationErrors(vec![FieldError {
            field: "upc",
            kind: FieldErrorKind::Invalid(Rule::Upc),
        }]);
        assert_eq!(errors.to_string(), "validation failed: upc is not a valid UPC");
    }
}
