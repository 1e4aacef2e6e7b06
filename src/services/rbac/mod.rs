pub mod catalog;
pub mod memory;
pub mod permission;
pub mod resolver;

pub use catalog::RoleCatalog;
pub use memory::InMemoryRoleCatalog;
pub use permission::Permission;
pub use resolver::PermissionResolver;
