//! Domain models shared across the identity subsystem.

pub mod auth;
pub mod profile;
