pub mod client;
pub mod memory;
pub mod valkey;

pub use client::{CacheClient, CacheError, CacheResult};
pub use memory::InMemoryCache;
pub use valkey::ValkeyClient;
