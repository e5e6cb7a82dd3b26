pub mod account_pool;
pub mod config;
pub mod credential;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod signature;
pub mod util;
