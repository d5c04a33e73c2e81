/// Head-to-head battle orchestration and matchmaking.
pub mod battle_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Hosted game creation, lookup and intent routing.
pub mod hosted_service;
/// Question generation with catalog fallback.
pub mod question_source;
/// WebSocket connection and message handling service.
pub mod websocket_service;
