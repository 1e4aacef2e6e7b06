use serde::Deserialize;
use uuid::Uuid;

/// Request body for `POST /auth/login`.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    /// Application the session is opened in.
    pub application_id: Uuid,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("login", &self.login)
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}
