//! Multi-tenant authentication hub.
//!
//! One login yields a token pair scoped to a single application; each
//! application keeps its own role/permission assignments for the principal.
//! The core lives in `services`: token issuance (`services::auth`), session
//! caching and revocation (`services::session`) and permission resolution
//! (`services::rbac`).

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
