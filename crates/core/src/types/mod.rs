//! Core types for thirty bees.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod lang;
pub mod price;
pub mod shop;

pub use id::*;
pub use lang::LangMap;
pub use price::{PriceDisplayMethod, Reduction, ReductionError};
pub use shop::ShopContext;
