use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::game::{CreateGameRequest, GameSummary},
    error::AppError,
    services::hosted_service,
    state::SharedState,
};

/// Routes handling hosted game bootstrap and lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{code}", get(get_game))
}

/// Open a hosted game and return its access code.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Game created", body = GameSummary),
        (status = 400, description = "Invalid question set"),
        (status = 503, description = "Questions could not be produced")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Json(payload): Json<CreateGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = hosted_service::create_game(&state, payload).await?;
    Ok(Json(summary))
}

/// Public snapshot of a hosted game.
#[utoipa::path(
    get,
    path = "/games/{code}",
    tag = "game",
    params(("code" = String, Path, description = "Access code of the game")),
    responses(
        (status = 200, description = "Game found", body = GameSummary),
        (status = 404, description = "Unknown access code")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = hosted_service::game_summary(&state, &code).await?;
    Ok(Json(summary))
}
