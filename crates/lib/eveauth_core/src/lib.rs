//! # eveauth_core
//!
//! EVE Online SSO identity and session core: login flow, provider token
//! verification, character-to-user linking, session tokens and background
//! token refresh.

pub mod auth;
pub mod config;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod profiles;
pub mod sso;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
