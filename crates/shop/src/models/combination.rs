//! Product combination (a purchasable variant of a product).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use thirtybees_core::{
    AttributeId, CombinationId, EntityDefinition, EntityValues, FieldDef,
    FieldType, ImageId, ModelError, ObjectModel, ProductId, Rule,
};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("id_product", FieldType::Int)
        .shop()
        .required()
        .validate(Rule::UnsignedId),
    FieldDef::new("location", FieldType::String)
        .size(64)
        .validate(Rule::GenericName),
    FieldDef::new("ean13", FieldType::String)
        .size(13)
        .validate(Rule::Ean13),
    FieldDef::new("upc", FieldType::String)
        .size(12)
        .validate(Rule::Upc),
    FieldDef::new("quantity", FieldType::Int).validate(Rule::Int),
    FieldDef::new("reference", FieldType::String)
        .size(32)
        .validate(Rule::Reference),
    FieldDef::new("supplier_reference", FieldType::String)
        .size(32)
        .validate(Rule::Reference),
    FieldDef::new("wholesale_price", FieldType::Price)
        .shop()
        .validate(Rule::Price),
    FieldDef::new("price", FieldType::Price)
        .shop()
        .validate(Rule::NegativePrice),
    FieldDef::new("ecotax", FieldType::Price)
        .shop()
        .validate(Rule::Price),
    FieldDef::new("weight", FieldType::Float)
        .shop()
        .validate(Rule::Float),
    FieldDef::new("unit_price_impact", FieldType::Price)
        .shop()
        .validate(Rule::NegativePrice),
    FieldDef::new("minimal_quantity", FieldType::Int)
        .shop()
        .required()
        .validate(Rule::UnsignedId),
    FieldDef::new("default_on", FieldType::Bool)
        .shop()
        .nullable()
        .validate(Rule::Bool),
    FieldDef::new("available_date", FieldType::Date)
        .shop()
        .validate(Rule::DateFormat),
    FieldDef::new("width", FieldType::Float)
        .shop()
        .validate(Rule::UnsignedFloat),
    FieldDef::new("height", FieldType::Float)
        .shop()
        .validate(Rule::UnsignedFloat),
    FieldDef::new("depth", FieldType::Float)
        .shop()
        .validate(Rule::UnsignedFloat),
];

/// A product variant, stored in `product_attribute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Combination {
    id: Option<CombinationId>,
    pub product_id: ProductId,
    pub reference: String,
    pub supplier_reference: String,
    pub location: String,
    pub ean13: String,
    pub upc: String,
    pub wholesale_price: Decimal,
    /// Price impact on the product price, may be negative.
    pub price: Decimal,
    pub ecotax: Decimal,
    pub quantity: i32,
    pub weight: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub unit_price_impact: Decimal,
    /// `Some(true)` for the product's default combination, `None` otherwise.
    pub default_on: Option<bool>,
    pub minimal_quantity: i32,
    pub available_date: Option<NaiveDate>,
}

impl Combination {
    /// A new, unsaved combination of `product_id`.
    #[must_use]
    pub fn new(product_id: ProductId) -> Self {
        Self {
            id: None,
            product_id,
            reference: String::new(),
            supplier_reference: String::new(),
            location: String::new(),
            ean13: String::new(),
            upc: String::new(),
            wholesale_price: Decimal::ZERO,
            price: Decimal::ZERO,
            ecotax: Decimal::ZERO,
            quantity: 0,
            weight: 0.0,
            width: 0.0,
            height: 0.0,
            depth: 0.0,
            unit_price_impact: Decimal::ZERO,
            default_on: None,
            minimal_quantity: 1,
            available_date: None,
        }
    }

    /// Whether this is the product's default combination.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.default_on == Some(true)
    }

    /// Collapse `default_on` to `Some(true)` or `None`.
    ///
    /// The `(id_product, default_on)` unique key admits a single `TRUE` per
    /// product but any number of `NULL`s.
    pub fn normalize_default_on(&mut self) {
        self.default_on = normalize_default_on(self.default_on);
    }
}

/// `Some(true)` stays, everything else becomes `None`.
#[must_use]
pub const fn normalize_default_on(value: Option<bool>) -> Option<bool> {
    match value {
        Some(true) => Some(true),
        _ => None,
    }
}

fn required<T>(field: &'static str, value: Option<T>) -> Result<T, ModelError> {
    value.ok_or(ModelError::Missing(field))
}

impl ObjectModel for Combination {
    type Id = CombinationId;

    const DEFINITION: EntityDefinition = EntityDefinition {
        table: "product_attribute",
        primary: "id_product_attribute",
        fields: FIELDS,
        timestamps: false,
    };

    fn id(&self) -> Option<CombinationId> {
        self.id
    }

    fn assign_id(&mut self, id: CombinationId) {
        self.id = Some(id);
    }

    fn to_values(&self) -> EntityValues {
        EntityValues::new()
            .with("id_product", self.product_id.as_i32())
            .with("location", self.location.as_str())
            .with("ean13", self.ean13.as_str())
            .with("upc", self.upc.as_str())
            .with("quantity", self.quantity)
            .with("reference", self.reference.as_str())
            .with("supplier_reference", self.supplier_reference.as_str())
            .with("wholesale_price", self.wholesale_price)
            .with("price", self.price)
            .with("ecotax", self.ecotax)
            .with("weight", self.weight)
            .with("unit_price_impact", self.unit_price_impact)
            .with("minimal_quantity", self.minimal_quantity)
            .with("default_on", self.default_on)
            .with("available_date", self.available_date)
            .with("width", self.width)
            .with("height", self.height)
            .with("depth", self.depth)
    }

    fn from_values(id: CombinationId, values: &EntityValues) -> Result<Self, ModelError> {
        let text = |field: &'static str| values.text(field).map(Option::unwrap_or_default);
        let price = |field: &'static str| values.price(field).map(Option::unwrap_or_default);
        let float = |field: &'static str| values.float(field).map(Option::unwrap_or_default);

        Ok(Self {
            id: Some(id),
            product_id: ProductId::new(required("id_product", values.int("id_product")?)?),
            reference: text("reference")?,
            supplier_reference: text("supplier_reference")?,
            location: text("location")?,
            ean13: text("ean13")?,
            upc: text("upc")?,
            wholesale_price: price("wholesale_price")?,
            price: price("price")?,
            ecotax: price("ecotax")?,
            quantity: values.int("quantity")?.unwrap_or_default(),
            weight: float("weight")?,
            width: float("width")?,
            height: float("height")?,
            depth: float("depth")?,
            unit_price_impact: price("unit_price_impact")?,
            default_on: normalize_default_on(values.bool("default_on")?),
            minimal_quantity: values.int("minimal_quantity")?.unwrap_or(1),
            // The zero date stands for "no availability date".
            available_date: values
                .date("available_date")?
                .filter(|d| *d != NaiveDate::default()),
        })
    }
}

/// Attribute and group names of a combination in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeName {
    pub attribute_id: AttributeId,
    pub group_name: String,
    pub name: String,
}

/// An attribute of a color group, with its color code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorAttribute {
    pub attribute_id: AttributeId,
    pub color: String,
}

/// Keep the first occurrence of every valid id.
#[must_use]
pub fn unique_valid_ids<T: Copy + PartialEq>(ids: &[T], is_valid: impl Fn(&T) -> bool) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(ids.len());
    for id in ids {
        if is_valid(id) && !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

/// Image ids to link, without zero ids or repeats.
#[must_use]
pub fn image_ids_to_link(ids: &[ImageId]) -> Vec<ImageId> {
    unique_valid_ids(ids, ImageId::is_valid)
}

/// Attribute ids to link, without zero ids or repeats.
#[must_use]
pub fn attribute_ids_to_link(ids: &[AttributeId]) -> Vec<AttributeId> {
    unique_valid_ids(ids, AttributeId::is_valid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use thirtybees_core::{FieldErrorKind, LangId, ValidationErrors};

    fn sample() -> Combination {
        let mut combination = Combination::new(ProductId::new(7));
        combination.reference = "TSHIRT-RED-M".to_owned();
        combination.price = Decimal::new(-250, 2);
        combination.weight = 0.2;
        combination.default_on = Some(true);
        combination.available_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        combination
    }

    #[test]
    fn test_normalize_default_on() {
        assert_eq!(normalize_default_on(Some(true)), Some(true));
        assert_eq!(normalize_default_on(Some(false)), None);
        assert_eq!(normalize_default_on(None), None);
    }

    #[test]
    fn test_values_round_trip_through_definition() {
        let combination = sample();
        let id = CombinationId::new(12);
        let restored = Combination::from_values(id, &combination.to_values()).unwrap();

        assert_eq!(restored.id(), Some(id));
        assert_eq!(restored.product_id, combination.product_id);
        assert_eq!(restored.price, Decimal::new(-250, 2));
        assert_eq!(restored.available_date, combination.available_date);
        assert!(restored.is_default());
    }

    #[test]
    fn test_zero_date_reads_as_none() {
        let values = sample()
            .to_values()
            .with("available_date", NaiveDate::default());
        let restored = Combination::from_values(CombinationId::new(1), &values).unwrap();
        assert_eq!(restored.available_date, None);
    }

    #[test]
    fn test_false_default_on_is_loaded_as_none() {
        let values = sample().to_values().with("default_on", false);
        let restored = Combination::from_values(CombinationId::new(1), &values).unwrap();
        assert_eq!(restored.default_on, None);
    }

    #[test]
    fn test_missing_product_is_an_error() {
        let values = EntityValues::new();
        assert_eq!(
            Combination::from_values(CombinationId::new(1), &values),
            Err(ModelError::Missing("id_product"))
        );
    }

    #[test]
    fn test_validation_collects_field_errors() {
        let mut combination = sample();
        combination.ean13 = "12345678901234".to_owned();
        combination.reference = "bad;ref".to_owned();
        combination.wholesale_price = Decimal::new(-1, 0);
        combination.product_id = ProductId::new(0);

        let ValidationErrors(errors) = combination.validate(LangId::new(1)).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();

        assert!(fields.contains(&"ean13"));
        assert!(fields.contains(&"reference"));
        assert!(fields.contains(&"wholesale_price"));
        assert!(
            errors
                .iter()
                .any(|e| e.field == "id_product" && e.kind == FieldErrorKind::Invalid(Rule::UnsignedId))
        );
    }

    #[test]
    fn test_sample_is_valid() {
        assert!(sample().validate(LangId::new(1)).is_ok());
    }

    #[test]
    fn test_unique_valid_ids_drops_zero_and_duplicates() {
        let ids = [
            ImageId::new(3),
            ImageId::new(0),
            ImageId::new(3),
            ImageId::new(1),
        ];
        assert_eq!(image_ids_to_link(&ids), vec![ImageId::new(3), ImageId::new(1)]);

        let attributes = [AttributeId::new(0), AttributeId::new(5), AttributeId::new(5)];
        assert_eq!(attribute_ids_to_link(&attributes), vec![AttributeId::new(5)]);
    }
}
