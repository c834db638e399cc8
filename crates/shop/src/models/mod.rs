//! Entities persisted through the object mapper.
//!
//! Each entity declares its storage layout as an
//! [`EntityDefinition`](thirtybees_core::EntityDefinition) and converts to
//! and from [`EntityValues`](thirtybees_core::EntityValues).

pub mod combination;
pub mod group;
pub mod guest;

pub use combination::Combination;
pub use group::Group;
pub use guest::Guest;
