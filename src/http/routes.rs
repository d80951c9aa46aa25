//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::spawn::SpawnPoint;
use crate::net::RoomStatus;
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Read-only surface, any origin may poll it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/rules", get(rules_handler))
        .route("/rooms", get(rooms_handler))
        .route("/rooms/:room_id", get(room_handler))
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
    active_rooms: usize,
    active_peers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.active_rooms(),
        active_peers: state.rooms.total_peers(),
    })
}

// ============================================================================
// Rules endpoint
// ============================================================================

#[derive(Serialize)]
struct RulesResponse {
    max_rounds: u32,
    round_secs: u64,
    final_round_secs: u64,
    intermission_secs: f32,
    defeat_grace_secs: f32,
    max_health: f32,
    max_lives: u32,
    spawn_points: Vec<SpawnPoint>,
}

/// Match rules every room on this server plays by
async fn rules_handler(State(state): State<AppState>) -> Json<RulesResponse> {
    let rules = &state.config.rules;
    Json(RulesResponse {
        max_rounds: rules.max_rounds,
        round_secs: rules.durations.standard.as_secs(),
        final_round_secs: rules.durations.final_round.as_secs(),
        intermission_secs: rules.intermission.as_secs_f32(),
        defeat_grace_secs: rules.defeat_grace.as_secs_f32(),
        max_health: rules.combat.max_health,
        max_lives: rules.combat.max_lives,
        spawn_points: state.config.spawn_points.clone(),
    })
}

// ============================================================================
// Room endpoints
// ============================================================================

async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<RoomStatus>> {
    Json(state.rooms.statuses())
}

async fn room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomStatus>, AppError> {
    let room = state
        .rooms
        .get(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))?;

    Ok(Json(room.status()))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
