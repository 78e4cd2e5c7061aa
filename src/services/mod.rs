/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Structured record of how every session event was handled.
pub mod observability;
/// Ordered best-effort store writes.
pub mod persistence;
/// Quiz catalog listing.
pub mod quiz_service;
/// Client event dispatch, effect application, timers and session restore.
pub mod session_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Answer statistics from recorded responses.
pub mod statistics_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Periodic removal of finished or abandoned games.
pub mod sweeper;
/// WebSocket connection and message handling service.
pub mod websocket_service;
