use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reservation::ReservationHolder;

/// Anonymous carts live 7 days, authenticated carts 30 days.
pub const ANONYMOUS_CART_DAYS: i64 = 7;
pub const AUTHENTICATED_CART_DAYS: i64 = 30;

/// Maximum quantity of a single vehicle configuration per cart line.
pub const MAX_ITEM_QUANTITY: u32 = 100;

/// Pure expiration policy, used by every path that sets or extends
/// `expires_at` so the two policies live in exactly one place.
pub fn calculate_expiration(is_authenticated: bool, from: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let base = from.unwrap_or_else(Utc::now);
    let days = if is_authenticated {
        AUTHENTICATED_CART_DAYS
    } else {
        ANONYMOUS_CART_DAYS
    };
    base + Duration::days(days)
}

/// Resolved cart identity: exactly one of user / session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(String),
    Session(String),
}

impl From<&CartOwner> for ReservationHolder {
    fn from(owner: &CartOwner) -> Self {
        match owner {
            CartOwner::User(id) => ReservationHolder::User(id.clone()),
            CartOwner::Session(id) => ReservationHolder::Session(id.clone()),
        }
    }
}

/// Durable shopping cart row.
///
/// Invariant: exactly one of `user_id` / `session_id` is set, enforced here
/// by the constructors and in the database by a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new_anonymous(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: None,
            session_id: Some(session_id),
            expires_at: calculate_expiration(false, Some(now)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_authenticated(user_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            session_id: None,
            expires_at: calculate_expiration(true, Some(now)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Resolves the identity invariant into a single owner value.
    /// Panics only if the database invariant is violated, which the CHECK
    /// constraint makes unrepresentable.
    pub fn owner(&self) -> CartOwner {
        match (&self.user_id, &self.session_id) {
            (Some(u), None) => CartOwner::User(u.clone()),
            (None, Some(s)) => CartOwner::Session(s.clone()),
            _ => unreachable!("cart row violates the user/session exclusivity constraint"),
        }
    }
}

/// A line in a cart, paired with an inventory hold while one is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub vehicle_id: Uuid,
    pub configuration_id: Option<Uuid>,
    pub quantity: u32,
    pub price_cents: Option<i64>,
    pub reservation_id: Option<Uuid>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(
        cart_id: Uuid,
        vehicle_id: Uuid,
        configuration_id: Option<Uuid>,
        quantity: u32,
        price_cents: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cart_id,
            vehicle_id,
            configuration_id,
            quantity,
            price_cents,
            reservation_id: None,
            reserved_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}
