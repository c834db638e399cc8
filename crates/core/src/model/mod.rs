//! Active-record style entity contract.
//!
//! An entity maps one row of a relational table (plus its optional per-shop
//! and per-language overlay rows) to a Rust value. The entity itself only
//! knows how to convert to and from [`EntityValues`]; reading and writing the
//! rows is the job of the persistence mapper in the `shop` crate.
//!
//! # Invariants
//!
//! - The primary key is assigned once, by the mapper, when the row is
//!   inserted. Entities never change their id afterwards.
//! - Per-language values are keyed by language id, per-shop values by shop id.

pub mod definition;
pub mod validate;
pub mod value;

pub use definition::{EntityDefinition, FieldDef, FieldType, Rule};
pub use validate::{
    FieldError, FieldErrorKind, ValidationErrors, is_date_format, is_ean13, is_generic_name,
    is_negative_price, is_percentage, is_price, is_reference, is_unsigned_id, is_upc,
    validate_entity,
};
pub use value::{EntityValues, FieldValue, ModelError};

use crate::types::LangId;

/// An entity persisted through the object mapper.
pub trait ObjectModel: Sized + Send + Sync {
    /// Typed primary key.
    type Id: Copy + Into<i32> + From<i32> + Send + Sync + std::fmt::Debug;

    /// Storage layout of the entity.
    const DEFINITION: EntityDefinition;

    /// Primary key, `None` until the entity has been inserted.
    fn id(&self) -> Option<Self::Id>;

    /// Record the primary key assigned on insert.
    ///
    /// Only the mapper calls this, exactly once per entity.
    fn assign_id(&mut self, id: Self::Id);

    /// Field values to store.
    fn to_values(&self) -> EntityValues;

    /// Rebuild the entity from stored values.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when a stored value has an unexpected type or
    /// violates an entity invariant.
    fn from_values(id: Self::Id, values: &EntityValues) -> Result<Self, ModelError>;

    /// Validate the entity's current values against its definition.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing every failing field.
    fn validate(&self, default_lang: LangId) -> Result<(), ValidationErrors> {
        validate_entity(&Self::DEFINITION, &self.to_values(), default_lang)
    }
}
