use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Encore Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::QuestionInput,
            crate::dto::game::GameSummary,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::catalog::Topic,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Hosted game bootstrap and lookup"),
        (name = "realtime", description = "WebSocket protocol for hosts, players and battles"),
    )
)]
pub struct ApiDoc;
