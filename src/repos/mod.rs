pub mod directory_repo;
pub mod error;
pub mod role_catalog_repo;
