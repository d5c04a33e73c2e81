use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with the current session load.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let queued = state.matchmaking().lock().await.len();
    let response = HealthResponse::ok(state.hosted().len(), state.battles().len(), queued);
    debug!(
        hosted = response.hosted_sessions,
        battles = response.battles,
        queued,
        "health probed"
    );
    response
}
