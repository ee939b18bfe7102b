//! Route paths served by the adapter.

pub const GET_AUTH_LOGIN: &str = "/auth/login";
pub const GET_AUTH_CALLBACK: &str = "/auth/callback";
pub const POST_AUTH_MOBILE: &str = "/auth/mobile";
pub const GET_AUTH_SESSION: &str = "/auth/session";
pub const GET_AUTH_CHARACTERS: &str = "/auth/characters";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
