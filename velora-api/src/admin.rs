use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/admin/vehicles/{vehicle_id}/availability",
        put(set_availability),
    )
}

#[derive(Debug, Deserialize)]
struct SetAvailabilityRequest {
    quantity: u32,
}

/// Reseed a vehicle's availability counter from the authoritative inventory
/// count. Called when relational stock changes outside the cart flow.
async fn set_availability(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
    Json(req): Json<SetAvailabilityRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .ledger
        .set_inventory_availability(vehicle_id, req.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
