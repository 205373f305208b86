//! CLI command implementations

pub mod auth;
pub mod config;
pub mod delete;
pub mod fetch;
pub mod sync;
pub mod watch;
