///! Host-facing state API
///!
///! Read-only JSON view of every sensor and station group. The host polls
///! these endpoints on its own cadence.

use std::sync::Arc;

use air365_common::FieldKind;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::sync::watch;

use crate::module::registry::{ObserverSnapshot, SensorRegistry};
use crate::module::scheduled::PollerStatus;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SensorRegistry>,
    pollers: Arc<Vec<watch::Receiver<PollerStatus>>>,
}

impl AppState {
    pub fn new(registry: Arc<SensorRegistry>, pollers: Vec<watch::Receiver<PollerStatus>>) -> Self {
        Self {
            registry,
            pollers: Arc::new(pollers),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sensors", get(list_sensors))
        .route("/api/sensors/{entity_id}", get(get_sensor))
        .route("/api/stations/{station_no}/{field}", get(get_station_field))
        .route("/api/groups", get(list_groups))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn list_sensors(State(state): State<AppState>) -> Json<Vec<ObserverSnapshot>> {
    Json(state.registry.snapshots())
}

async fn get_sensor(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> Result<Json<ObserverSnapshot>, StatusCode> {
    state
        .registry
        .get(&entity_id)
        .map(|o| Json(o.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_station_field(
    State(state): State<AppState>,
    Path((station_no, field)): Path<(String, String)>,
) -> impl IntoResponse {
    let Ok(field) = field.parse::<FieldKind>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown field '{}'", field) })),
        );
    };

    match state.registry.find(&station_no, field) {
        Some(observer) => {
            let value = state.registry.read(&station_no, field);
            (
                StatusCode::OK,
                Json(json!({
                    "station_no": station_no,
                    "field": field,
                    "value": value.as_str(),
                    "available": value.is_known(),
                    "unit": observer.unit(),
                })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("no sensor configured for {} {}", station_no, field),
            })),
        ),
    }
}

async fn list_groups(State(state): State<AppState>) -> Json<Vec<PollerStatus>> {
    Json(state.pollers.iter().map(|rx| rx.borrow().clone()).collect())
}
