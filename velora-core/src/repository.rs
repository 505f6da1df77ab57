use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cart::{Cart, CartItem};
use crate::error::BoxError;

pub type StoreResult<T> = Result<T, BoxError>;

/// Key-value store primitives used by the reservation ledger and the
/// session→cart mapping. Implemented over redis in production and over an
/// in-memory map in tests.
///
/// TTL values follow redis semantics: -2 for a missing key, -1 for a key
/// without an expiry, otherwise remaining seconds.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value, with an optional TTL in seconds.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()>;

    async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>>;

    async fn set_i64(&self, key: &str, value: i64) -> StoreResult<()>;

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64>;

    /// Conditional atomic decrement: subtract `amount` only if the key exists
    /// and its value is at least `amount`, returning the new value; `None`
    /// when the store refused. This is the no-oversell primitive.
    async fn try_decr_by(&self, key: &str, amount: i64) -> StoreResult<Option<i64>>;

    /// Returns true if a key was actually removed. The caller that observes
    /// `true` is the one that owned the deletion.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool>;

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Relational persistence for carts and cart items.
///
/// Lookups take `now` explicitly so the expiry filter is deterministic under
/// test. `merge_into` must be transactional: on failure the source and target
/// carts are left exactly as they were.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn create_cart(&self, cart: &Cart) -> StoreResult<()>;

    async fn find_cart(&self, cart_id: Uuid) -> StoreResult<Option<Cart>>;

    /// Non-expired cart for the session token, if any.
    async fn find_cart_by_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Cart>>;

    /// Non-expired cart for the user, if any.
    async fn find_cart_by_user(&self, user_id: &str, now: DateTime<Utc>)
        -> StoreResult<Option<Cart>>;

    async fn set_cart_expiration(&self, cart_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()>;

    /// Convert an anonymous cart in place: clear `session_id`, set `user_id`,
    /// move `expires_at` to the authenticated policy.
    async fn convert_cart_to_user(
        &self,
        cart_id: Uuid,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Re-point every item of `source_cart_id` onto `target_cart_id`, delete
    /// the source cart row and extend the target's expiry, all in a single
    /// transaction.
    async fn merge_carts(
        &self,
        source_cart_id: Uuid,
        target_cart_id: Uuid,
        target_expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Delete a cart row; items cascade.
    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()>;

    /// Carts whose `expires_at` is at or before `now`.
    async fn expired_carts(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Cart>>;

    async fn add_item(&self, item: &CartItem) -> StoreResult<()>;

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>>;

    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartItem>>;

    async fn update_item_hold(
        &self,
        item_id: Uuid,
        quantity: u32,
        reservation_id: Option<Uuid>,
        reserved_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Returns true if a row was actually deleted.
    async fn delete_item(&self, item_id: Uuid) -> StoreResult<bool>;
}
