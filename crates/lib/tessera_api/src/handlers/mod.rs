//! Request handlers.

pub mod accounts;
pub mod health;
pub mod session;
pub mod token;
