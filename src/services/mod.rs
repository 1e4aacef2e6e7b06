pub mod audit;
pub mod auth;
pub mod cache;
pub mod rbac;
pub mod session;
