pub mod cache;
pub mod manager;

pub use cache::{SessionCache, SessionCacheError, SessionRecord};
pub use manager::SessionManager;
