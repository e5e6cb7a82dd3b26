//! 账号池（Account Pool）模块。
//!
//! 目标：在多账号场景下为每次请求挑选一个在目标模型族上未被限流的账号，
//! 并尽量粘住同一个账号，直到它被上游拒绝（429）。

pub mod clock;
pub mod events;
mod manager;
pub mod rate_limit;
mod selector;
pub mod types;

pub use manager::{AccountPool, DEFAULT_TOAST_DEBOUNCE_MS};
