use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use velora_core::cart::{Cart, CartItem};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/carts", get(get_cart))
        .route("/v1/carts/items", post(add_item))
        .route("/v1/carts/items/{item_id}", patch(update_item))
        .route("/v1/carts/items/{item_id}", delete(remove_item))
        .route("/v1/carts/migrate", post(migrate_cart))
        .route("/v1/vehicles/{vehicle_id}/availability", get(get_availability))
}

/// Shopper identity as resolved by the edge: an authenticated user id and/or
/// the anonymous session token. Issuance of either is not this service's
/// concern.
struct Identity {
    user_id: Option<String>,
    session_id: Option<String>,
}

fn identity(headers: &HeaderMap) -> Identity {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Identity {
        user_id: header("x-user-id"),
        session_id: header("x-session-id"),
    }
}

#[derive(Debug, Serialize)]
struct CartResponse {
    cart: Cart,
    items: Vec<CartItem>,
    /// Echoed so an anonymous client can persist its token after the first
    /// cart interaction.
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    vehicle_id: Uuid,
    configuration_id: Option<Uuid>,
    quantity: u32,
    price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UpdateItemRequest {
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct MigrateRequest {
    user_id: String,
}

async fn cart_response(state: &AppState, cart: Cart) -> Result<CartResponse, ApiError> {
    let items = state.sessions.get_items(cart.id).await?;
    let session_id = cart.session_id.clone();
    Ok(CartResponse {
        cart,
        items,
        session_id,
    })
}

async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, ApiError> {
    let identity = identity(&headers);

    let cart = if let Some(user_id) = &identity.user_id {
        state.sessions.get_cart_by_user(user_id).await?
    } else if let Some(session_id) = &identity.session_id {
        state.sessions.get_cart_by_session(session_id).await?
    } else {
        None
    };

    let cart = cart.ok_or_else(|| ApiError::NotFound("no active cart".to_string()))?;
    Ok(Json(cart_response(&state, cart).await?))
}

async fn add_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let identity = identity(&headers);

    let cart = match &identity.user_id {
        Some(user_id) => state.sessions.get_or_create_user_cart(user_id).await?,
        None => {
            state
                .sessions
                .get_or_create_session_cart(identity.session_id)
                .await?
        }
    };

    state
        .sessions
        .add_item(
            &cart,
            req.vehicle_id,
            req.configuration_id,
            req.quantity,
            req.price_cents,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(cart_response(&state, cart).await?)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartItem>, ApiError> {
    let item = state
        .sessions
        .update_item_quantity(item_id, req.quantity)
        .await?;
    Ok(Json(item))
}

async fn remove_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.remove_item(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Invoked by the authentication flow right after a successful login, before
/// the session identity is discarded.
async fn migrate_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<Option<CartResponse>>, ApiError> {
    let identity = identity(&headers);
    let session_id = identity
        .session_id
        .ok_or_else(|| ApiError::BadRequest("x-session-id header is required".to_string()))?;

    match state
        .sessions
        .migrate_cart_on_login(&session_id, &req.user_id)
        .await?
    {
        Some(cart) => Ok(Json(Some(cart_response(&state, cart).await?))),
        None => Ok(Json(None)),
    }
}

#[derive(Debug, Serialize)]
struct AvailabilityResponse {
    vehicle_id: Uuid,
    available: i64,
}

async fn get_availability(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = state.ledger.check_availability(vehicle_id).await?;
    Ok(Json(AvailabilityResponse {
        vehicle_id,
        available,
    }))
}
