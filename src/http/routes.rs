//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::session::{SessionHandle, SessionInput};
use crate::game::vehicle::{TankVariant, VehicleId};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - `*` or a comma-separated list in CLIENT_ORIGIN
    let allow_origin = if state.config.client_origin.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<header::HeaderValue> = state
            .config
            .client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/sessions/:id/roster", get(roster_handler))
        .route("/sessions/:id/vehicles", post(spawn_vehicle_handler))
        .route(
            "/sessions/:id/vehicles/:vehicle_id",
            delete(despawn_vehicle_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
    connected_actors: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_sessions: state.sessions.active_sessions(),
        connected_actors: state.sessions.total_actors(),
    })
}

// ============================================================================
// Session endpoints
// ============================================================================

fn session(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))
}

#[derive(Serialize)]
struct RosterResponse {
    session_id: Uuid,
    roster: String,
}

async fn roster_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RosterResponse>, AppError> {
    let handle = session(&state, id)?;
    Ok(Json(RosterResponse {
        session_id: id,
        roster: handle.roster(),
    }))
}

#[derive(Deserialize)]
struct SpawnVehicleRequest {
    variant: TankVariant,
}

#[derive(Serialize)]
struct SpawnVehicleResponse {
    vehicle_id: VehicleId,
}

async fn spawn_vehicle_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SpawnVehicleRequest>,
) -> Result<(StatusCode, Json<SpawnVehicleResponse>), AppError> {
    let handle = session(&state, id)?;
    let (reply, response) = oneshot::channel();
    handle
        .input_tx
        .send(SessionInput::SpawnVehicle {
            variant: req.variant,
            reply,
        })
        .await
        .map_err(|_| AppError::Unavailable)?;
    let vehicle_id = response.await.map_err(|_| AppError::Unavailable)?;

    info!(session_id = %id, vehicle_id = %vehicle_id, "Vehicle spawned over HTTP");
    Ok((StatusCode::CREATED, Json(SpawnVehicleResponse { vehicle_id })))
}

async fn despawn_vehicle_handler(
    State(state): State<AppState>,
    Path((id, vehicle_id)): Path<(Uuid, u32)>,
) -> Result<StatusCode, AppError> {
    let handle = session(&state, id)?;
    let vehicle_id = VehicleId(vehicle_id);
    let (reply, response) = oneshot::channel();
    handle
        .input_tx
        .send(SessionInput::DespawnVehicle { vehicle_id, reply })
        .await
        .map_err(|_| AppError::Unavailable)?;

    if response.await.map_err(|_| AppError::Unavailable)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("vehicle {vehicle_id}")))
    }
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session is not running")]
    Unavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
