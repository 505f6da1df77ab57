use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures of the inventory reservation ledger.
///
/// `InsufficientInventory` and `NotFound` are recoverable caller-facing
/// conditions (409/404 at the API boundary); `Store` is an infrastructure
/// failure and surfaces as a 500.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("insufficient inventory for vehicle {vehicle_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        vehicle_id: Uuid,
        requested: u32,
        available: i64,
    },

    #[error("reservation not found: {0}")]
    NotFound(Uuid),

    #[error("invalid reservation quantity: {0}")]
    InvalidQuantity(u32),

    #[error("reservation store failure: {0}")]
    Store(#[source] BoxError),
}

/// Failures of cart identity resolution, persistence and migration.
#[derive(Debug, thiserror::Error)]
pub enum CartSessionError {
    #[error("cart not found: {0}")]
    CartNotFound(Uuid),

    #[error("cart item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("invalid item quantity {0}, must be between 1 and 100")]
    InvalidQuantity(u32),

    #[error("failed to create session cart: {0}")]
    SessionCreation(String),

    #[error("failed to migrate cart for session {session_id} to user {user_id}: {source}")]
    SessionMigration {
        session_id: String,
        user_id: String,
        #[source]
        source: BoxError,
    },

    #[error("cart storage failure: {0}")]
    Storage(#[source] BoxError),

    #[error(transparent)]
    Reservation(#[from] ReservationError),
}
