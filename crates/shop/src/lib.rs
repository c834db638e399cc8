//! thirty bees back office library.
//!
//! Persistence mapper, catalog combinations, visitor tracking, customer
//! groups and the installer, plus the JSON API serving them. The binary in
//! `main.rs` only wires configuration, tracing and the server together.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
