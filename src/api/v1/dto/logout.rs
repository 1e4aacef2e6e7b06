use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LogoutResponse {
    /// Sessions revoked by this call.
    pub revoked: usize,
}
