//! Customer group.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use thirtybees_core::{
    EntityDefinition, EntityValues, FieldDef, FieldType, GroupId, LangMap, ModelError,
    ObjectModel, PriceDisplayMethod, Reduction, Rule,
};

const FIELDS: &[FieldDef] = &[
    FieldDef::new("reduction", FieldType::Price).validate(Rule::Percentage),
    FieldDef::new("price_display_method", FieldType::Int)
        .required()
        .validate(Rule::UnsignedInt),
    FieldDef::new("show_prices", FieldType::Bool).validate(Rule::Bool),
    FieldDef::new("name", FieldType::String)
        .lang()
        .required()
        .size(32)
        .validate(Rule::GenericName),
];

/// A customer group with its default discount and price display rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    id: Option<GroupId>,
    pub name: LangMap<String>,
    pub reduction: Reduction,
    pub price_display_method: PriceDisplayMethod,
    pub show_prices: bool,
}

impl Group {
    #[must_use]
    pub fn new(name: LangMap<String>) -> Self {
        Self {
            id: None,
            name,
            reduction: Reduction::default(),
            price_display_method: PriceDisplayMethod::default(),
            show_prices: true,
        }
    }

    /// Apply edited values to a stored group.
    #[must_use]
    pub const fn with_id(mut self, id: GroupId) -> Self {
        self.id = Some(id);
        self
    }
}

impl ObjectModel for Group {
    type Id = GroupId;

    const DEFINITION: EntityDefinition = EntityDefinition {
        table: "group",
        primary: "id_group",
        fields: FIELDS,
        timestamps: true,
    };

    fn id(&self) -> Option<GroupId> {
        self.id
    }

    fn assign_id(&mut self, id: GroupId) {
        self.id = Some(id);
    }

    fn to_values(&self) -> EntityValues {
        EntityValues::new()
            .with("reduction", self.reduction.percent())
            .with("price_display_method", self.price_display_method.as_i32())
            .with("show_prices", self.show_prices)
            .with_lang("name", self.name.clone())
    }

    fn from_values(id: GroupId, values: &EntityValues) -> Result<Self, ModelError> {
        let reduction = Reduction::from_percent(values.price("reduction")?.unwrap_or(Decimal::ZERO))
            .map_err(|e| ModelError::Invalid {
                field: "reduction",
                reason: e.to_string(),
            })?;
        let method = values.int("price_display_method")?.unwrap_or_default();
        let price_display_method =
            PriceDisplayMethod::from_i32(method).ok_or_else(|| ModelError::Invalid {
                field: "price_display_method",
                reason: format!("unknown price display method {method}"),
            })?;

        Ok(Self {
            id: Some(id),
            name: values.lang("name").cloned().unwrap_or_default(),
            reduction,
            price_display_method,
            show_prices: values.bool("show_prices")?.unwrap_or(true),
        })
    }
}

/// Editable fields of a group, as submitted by the back office.
///
/// The discount arrives as a raw number so that an out of range value can
/// be reported instead of rejected at deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInput {
    pub name: LangMap<String>,
    #[serde(default)]
    pub reduction: Decimal,
    #[serde(default)]
    pub price_display_method: PriceDisplayMethod,
    #[serde(default = "default_show_prices")]
    pub show_prices: bool,
    /// Category id to discount percentage.
    #[serde(default)]
    pub category_reductions: Vec<CategoryReductionInput>,
}

const fn default_show_prices() -> bool {
    true
}

/// One submitted category discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CategoryReductionInput {
    pub category_id: i32,
    pub reduction: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use thirtybees_core::LangId;

    fn named(name: &str) -> LangMap<String> {
        LangMap::single(LangId::new(1), name.to_owned())
    }

    #[test]
    fn test_new_group_shows_prices() {
        let group = Group::new(named("Wholesale"));
        assert!(group.show_prices);
        assert_eq!(group.id(), None);
        assert!(group.validate(LangId::new(1)).is_ok());
    }

    #[test]
    fn test_name_is_required_in_default_language() {
        let group = Group::new(LangMap::new());
        assert!(group.validate(LangId::new(1)).is_err());
    }

    #[test]
    fn test_name_is_limited_to_32_chars() {
        let group = Group::new(named(&"x".repeat(33)));
        assert!(group.validate(LangId::new(1)).is_err());
    }

    #[test]
    fn test_values_round_trip() {
        let mut group = Group::new(named("Pros"));
        group.reduction = Reduction::from_percent(Decimal::new(15, 0)).unwrap();
        group.price_display_method = PriceDisplayMethod::TaxExcluded;
        group.show_prices = false;

        let restored = Group::from_values(GroupId::new(4), &group.to_values()).unwrap();
        assert_eq!(restored, group.with_id(GroupId::new(4)));
    }

    #[test]
    fn test_unknown_display_method_is_rejected() {
        let values = Group::new(named("Pros"))
            .to_values()
            .with("price_display_method", 9);
        assert!(matches!(
            Group::from_values(GroupId::new(1), &values),
            Err(ModelError::Invalid { field: "price_display_method", .. })
        ));
    }

    #[test]
    fn test_input_defaults() {
        let input: GroupInput =
            serde_json::from_str(r#"{"name": {"1": "Resellers"}, "reduction": "12.5"}"#).unwrap();
        assert!(input.show_prices);
        assert_eq!(input.reduction, Decimal::new(125, 1));
        assert!(input.category_reductions.is_empty());
    }
}
