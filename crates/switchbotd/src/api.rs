use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::CommandError;
use crate::engine::Engine;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Response for accepted commands
#[derive(Serialize)]
struct CommandResponse {
    entity_id: String,
    command: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    (StatusCode::OK, Json(snapshot.switches.clone()))
}

/// Handler for POST /v1/switch/:entity_id/:command
#[tracing::instrument(skip(state))]
async fn switch_command(
    State(state): State<Arc<AppState>>,
    Path((entity_id, command)): Path<(String, String)>,
) -> Response {
    let (command, result) = match command.as_str() {
        "turn_on" => (
            "turn_on",
            state.engine.send_switch_command(entity_id.clone(), true),
        ),
        "turn_off" => (
            "turn_off",
            state.engine.send_switch_command(entity_id.clone(), false),
        ),
        "update" => ("update", state.engine.request_update(entity_id.clone())),
        other => {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("Unknown command: {}", other),
            )
        }
    };

    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(CommandResponse { entity_id, command }),
        )
            .into_response(),
        Err(e @ CommandError::UnknownEntity(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ CommandError::IntegrationGone(_)) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    tracing::debug!("Request failed: {}", error);
    (status, Json(ErrorResponse { error })).into_response()
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/switch/:entity_id/:command", post(switch_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8565)
/// * `engine` - The engine whose state is served and which receives commands
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::ToIntegrationMessage;

    fn router(engine: Arc<Engine>) -> Router {
        create_router(Arc::new(AppState {
            version: "test",
            engine,
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = router(Arc::new(Engine::new()))
            .oneshot(Request::get("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_states_empty() {
        let response = router(Arc::new(Engine::new()))
            .oneshot(Request::get("/v1/states").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_command_for_unknown_entity() {
        let response = router(Arc::new(Engine::new()))
            .oneshot(
                Request::post("/v1/switch/switch.nope/turn_on")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let response = router(Arc::new(Engine::new()))
            .oneshot(
                Request::post("/v1/switch/switch.bot/toggle")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "Unknown command: toggle"
        );
    }

    #[tokio::test]
    async fn test_command_is_accepted_for_routed_entity() {
        let engine = Arc::new(Engine::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine.route_for_test("switch.bot", "fake", tx);

        let response = router(engine)
            .oneshot(
                Request::post("/v1/switch/switch.bot/turn_off")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"entity_id": "switch.bot", "command": "turn_off"})
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ToIntegrationMessage::SwitchCommand {
                entity_id: "switch.bot".to_string(),
                on: false,
            }
        );
    }
}
