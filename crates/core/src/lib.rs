//! thirty bees Core - Shared types library.
//!
//! This crate provides the types every other thirty bees crate builds on:
//! - `shop` - Back-office server, persistence mapper, installer
//! - `cli` - Command-line tools for migrations and installation
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. Entity definitions, field values and validation rules live
//! here so they can be checked without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, language maps, shop context, price display
//! - [`model`] - Entity definitions, field values, validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod model;
pub mod types;

pub use model::*;
pub use types::*;
