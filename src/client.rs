pub mod auth;
pub mod builder;
pub mod config;

pub use builder::build_client;
