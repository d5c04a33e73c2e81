use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Number of live hosted games.
    pub hosted_sessions: usize,
    /// Number of running battles.
    pub battles: usize,
    /// Connections waiting in the matchmaking queue.
    pub queued: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(hosted_sessions: usize, battles: usize, queued: usize) -> Self {
        Self {
            status: "ok".to_string(),
            hosted_sessions,
            battles,
            queued,
        }
    }
}
