//! # tessera_core
//!
//! Session and credential lifecycle domain logic for Tessera.

pub mod auth;
pub mod cache;
pub mod config;
pub mod maintenance;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

#[cfg(test)]
mod testing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
