pub mod cache;

pub use cache::SignatureCache;
