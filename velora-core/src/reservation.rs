use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default hold duration for an inventory reservation.
pub const DEFAULT_HOLD_SECONDS: u64 = 900; // 15 minutes

/// Who holds a reservation: an authenticated user or an anonymous session.
/// Mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReservationHolder {
    User(String),
    Session(String),
}

impl ReservationHolder {
    pub fn id(&self) -> &str {
        match self {
            ReservationHolder::User(id) => id,
            ReservationHolder::Session(id) => id,
        }
    }
}

/// A time-bounded exclusive claim on N units of a vehicle's inventory.
///
/// Lives only in the key-value store; the record carries the store TTL and is
/// immutable after creation except for its expiry (via extend) and its
/// existence (via release).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub quantity: u32,
    pub holder: ReservationHolder,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(vehicle_id: Uuid, quantity: u32, holder: ReservationHolder, ttl_seconds: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            quantity,
            holder,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds as i64),
        }
    }
}

/// Companion record written alongside a reservation without a TTL, so the
/// cleanup sweep can credit back holds that lapsed by store expiry alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationHold {
    pub vehicle_id: Uuid,
    pub quantity: u32,
}
