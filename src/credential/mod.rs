pub mod auth_cache;
pub mod store;
pub mod types;
