use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use velora_core::cart::{calculate_expiration, Cart, CartItem, MAX_ITEM_QUANTITY};
use velora_core::error::BoxError;
use velora_core::error::{CartSessionError, ReservationError};
use velora_core::repository::{CartRepository, KeyValueStore};
use velora_core::reservation::ReservationHolder;

use crate::ledger::ReservationLedger;

/// 43 alphanumeric characters, ~256 bits of entropy. The token is the sole
/// anonymous-session authentication factor.
pub const SESSION_ID_LENGTH: usize = 43;

pub fn session_mapping_key(session_id: &str) -> String {
    format!("cart_session:{}", session_id)
}

/// Resolves "who is shopping" into a single durable cart row, manages its
/// expiration policy, migrates anonymous carts to users on login, and pairs
/// cart items with reservation-ledger holds.
///
/// The session→cart mapping in the key-value store is a cache: the relational
/// row is authoritative, and a stale or missing mapping degrades to a column
/// lookup, never to a wrong answer.
pub struct CartSessionManager {
    carts: Arc<dyn CartRepository>,
    store: Arc<dyn KeyValueStore>,
    ledger: Arc<ReservationLedger>,
}

impl CartSessionManager {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<ReservationLedger>,
    ) -> Self {
        Self {
            carts,
            store,
            ledger,
        }
    }

    /// URL-safe random session token from the thread CSPRNG.
    pub fn generate_session_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LENGTH)
            .map(char::from)
            .collect()
    }

    pub async fn create_anonymous_cart(
        &self,
        session_id: Option<String>,
    ) -> Result<Cart, CartSessionError> {
        let session_id = session_id.unwrap_or_else(Self::generate_session_id);
        let cart = Cart::new_anonymous(session_id.clone());

        self.carts
            .create_cart(&cart)
            .await
            .map_err(|e| CartSessionError::SessionCreation(e.to_string()))?;

        self.write_session_mapping(&session_id, cart.id, cart.expires_at)
            .await;

        info!(cart_id = %cart.id, "Anonymous cart created");
        Ok(cart)
    }

    pub async fn create_authenticated_cart(&self, user_id: &str) -> Result<Cart, CartSessionError> {
        let cart = Cart::new_authenticated(user_id.to_string());
        self.carts
            .create_cart(&cart)
            .await
            .map_err(|e| CartSessionError::SessionCreation(e.to_string()))?;
        info!(cart_id = %cart.id, user_id, "Authenticated cart created");
        Ok(cart)
    }

    /// Prefers the key-value mapping, verified against the database row;
    /// falls back to the `session_id` column. Expired rows are absent.
    pub async fn get_cart_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Cart>, CartSessionError> {
        let now = Utc::now();
        let mapping_key = session_mapping_key(session_id);

        if let Some(raw) = self
            .store
            .get(&mapping_key)
            .await
            .map_err(CartSessionError::Storage)?
        {
            if let Ok(cart_id) = Uuid::parse_str(&raw) {
                if let Some(cart) = self
                    .carts
                    .find_cart(cart_id)
                    .await
                    .map_err(CartSessionError::Storage)?
                {
                    if cart.session_id.as_deref() == Some(session_id) && !cart.is_expired(now) {
                        return Ok(Some(cart));
                    }
                }
            }
            // Mapping points at a missing, migrated or expired cart.
            warn!(cart_session = %mapping_key, "Dropping stale session mapping");
            let _ = self.store.delete(&mapping_key).await;
        }

        self.carts
            .find_cart_by_session(session_id, now)
            .await
            .map_err(CartSessionError::Storage)
    }

    pub async fn get_cart_by_user(&self, user_id: &str) -> Result<Option<Cart>, CartSessionError> {
        self.carts
            .find_cart_by_user(user_id, Utc::now())
            .await
            .map_err(CartSessionError::Storage)
    }

    pub async fn get_or_create_session_cart(
        &self,
        session_id: Option<String>,
    ) -> Result<Cart, CartSessionError> {
        if let Some(sid) = &session_id {
            if let Some(cart) = self.get_cart_by_session(sid).await? {
                return Ok(cart);
            }
        }
        self.create_anonymous_cart(session_id).await
    }

    pub async fn get_or_create_user_cart(&self, user_id: &str) -> Result<Cart, CartSessionError> {
        if let Some(cart) = self.get_cart_by_user(user_id).await? {
            return Ok(cart);
        }
        self.create_authenticated_cart(user_id).await
    }

    /// Move an anonymous cart to a user identity at login.
    ///
    /// No anonymous cart: returns `None` and touches nothing. Existing user
    /// cart: merge items into it (one transaction), drop the anonymous row,
    /// extend to the authenticated policy. No user cart: convert the
    /// anonymous cart in place. Either way the session mapping is removed
    /// and the item holds on the resulting cart are re-extended, so a nearly
    /// lapsed reservation does not expire moments after sign-in. On failure
    /// the relational transaction rolls back, so the pre-login state stays
    /// queryable.
    pub async fn migrate_cart_on_login(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<Cart>, CartSessionError> {
        let anon = match self.get_cart_by_session(session_id).await? {
            Some(cart) => cart,
            None => {
                debug!(user_id, "No anonymous cart to migrate");
                return Ok(None);
            }
        };

        let migration_err = |e: BoxError| CartSessionError::SessionMigration {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            source: e,
        };

        let now = Utc::now();
        let expires_at = calculate_expiration(true, Some(now));

        let existing = self
            .carts
            .find_cart_by_user(user_id, now)
            .await
            .map_err(migration_err)?;

        let result_cart_id = match existing {
            Some(user_cart) => {
                self.carts
                    .merge_carts(anon.id, user_cart.id, expires_at)
                    .await
                    .map_err(migration_err)?;
                info!(
                    user_id,
                    anonymous_cart_id = %anon.id,
                    user_cart_id = %user_cart.id,
                    "Merged anonymous cart into existing user cart"
                );
                user_cart.id
            }
            None => {
                self.carts
                    .convert_cart_to_user(anon.id, user_id, expires_at)
                    .await
                    .map_err(migration_err)?;
                info!(user_id, cart_id = %anon.id, "Converted anonymous cart to user cart");
                anon.id
            }
        };

        // The mapping is a cache; if this delete fails the stale entry is
        // detected and dropped on the next session lookup.
        if let Err(e) = self.store.delete(&session_mapping_key(session_id)).await {
            warn!("Failed to remove session mapping after migration: {}", e);
        }

        self.refresh_item_holds(result_cart_id).await;

        let cart = self
            .carts
            .find_cart(result_cart_id)
            .await
            .map_err(CartSessionError::Storage)?
            .ok_or(CartSessionError::CartNotFound(result_cart_id))?;
        Ok(Some(cart))
    }

    /// Recompute `expires_at` under the identity-appropriate policy, or an
    /// explicit day count; anonymous carts also get their session-mapping TTL
    /// refreshed.
    pub async fn extend_cart_expiration(
        &self,
        cart: &Cart,
        days: Option<i64>,
    ) -> Result<(), CartSessionError> {
        let now = Utc::now();
        let expires_at = match days {
            Some(d) => now + Duration::days(d),
            None => calculate_expiration(cart.is_authenticated(), Some(now)),
        };

        self.carts
            .set_cart_expiration(cart.id, expires_at)
            .await
            .map_err(CartSessionError::Storage)?;

        if let Some(session_id) = &cart.session_id {
            self.write_session_mapping(session_id, cart.id, expires_at)
                .await;
        }

        info!(cart_id = %cart.id, expires_at = %expires_at, "Cart expiration extended");
        Ok(())
    }

    /// Add a line to a cart, taking a ledger hold under the cart's identity.
    /// The hold is released if the row insert fails, so no orphan holds
    /// survive a storage error.
    pub async fn add_item(
        &self,
        cart: &Cart,
        vehicle_id: Uuid,
        configuration_id: Option<Uuid>,
        quantity: u32,
        price_cents: Option<i64>,
    ) -> Result<CartItem, CartSessionError> {
        if quantity == 0 || quantity > MAX_ITEM_QUANTITY {
            return Err(CartSessionError::InvalidQuantity(quantity));
        }

        let holder = ReservationHolder::from(&cart.owner());
        let reservation = self
            .ledger
            .create_reservation(vehicle_id, quantity, holder)
            .await?;

        let mut item = CartItem::new(cart.id, vehicle_id, configuration_id, quantity, price_cents);
        item.reservation_id = Some(reservation.id);
        item.reserved_until = Some(reservation.expires_at);

        if let Err(e) = self.carts.add_item(&item).await {
            if let Err(release_err) = self.ledger.release_reservation(reservation.id).await {
                warn!(
                    reservation_id = %reservation.id,
                    "Failed to release hold after item insert error: {}",
                    release_err
                );
            }
            return Err(CartSessionError::Storage(e));
        }

        info!(item_id = %item.id, cart_id = %cart.id, vehicle_id = %vehicle_id, quantity, "Cart item added");
        Ok(item)
    }

    /// Change a line's quantity by taking a fresh hold for the new amount
    /// first, then swapping it in and releasing the old one. A lapsed old
    /// hold is tolerated.
    pub async fn update_item_quantity(
        &self,
        item_id: Uuid,
        quantity: u32,
    ) -> Result<CartItem, CartSessionError> {
        if quantity == 0 || quantity > MAX_ITEM_QUANTITY {
            return Err(CartSessionError::InvalidQuantity(quantity));
        }

        let mut item = self
            .carts
            .find_item(item_id)
            .await
            .map_err(CartSessionError::Storage)?
            .ok_or(CartSessionError::ItemNotFound(item_id))?;

        let cart = self
            .carts
            .find_cart(item.cart_id)
            .await
            .map_err(CartSessionError::Storage)?
            .ok_or(CartSessionError::CartNotFound(item.cart_id))?;

        let holder = ReservationHolder::from(&cart.owner());
        let reservation = self
            .ledger
            .create_reservation(item.vehicle_id, quantity, holder)
            .await?;

        if let Err(e) = self
            .carts
            .update_item_hold(
                item_id,
                quantity,
                Some(reservation.id),
                Some(reservation.expires_at),
            )
            .await
        {
            if let Err(release_err) = self.ledger.release_reservation(reservation.id).await {
                warn!(
                    reservation_id = %reservation.id,
                    "Failed to release hold after item update error: {}",
                    release_err
                );
            }
            return Err(CartSessionError::Storage(e));
        }

        if let Some(old_id) = item.reservation_id {
            self.release_hold_tolerant(old_id).await;
        }

        item.quantity = quantity;
        item.reservation_id = Some(reservation.id);
        item.reserved_until = Some(reservation.expires_at);
        info!(item_id = %item_id, quantity, "Cart item quantity updated");
        Ok(item)
    }

    /// Remove a line and release its paired hold.
    pub async fn remove_item(&self, item_id: Uuid) -> Result<(), CartSessionError> {
        let item = self
            .carts
            .find_item(item_id)
            .await
            .map_err(CartSessionError::Storage)?
            .ok_or(CartSessionError::ItemNotFound(item_id))?;

        let deleted = self
            .carts
            .delete_item(item_id)
            .await
            .map_err(CartSessionError::Storage)?;
        if !deleted {
            return Err(CartSessionError::ItemNotFound(item_id));
        }

        if let Some(reservation_id) = item.reservation_id {
            self.release_hold_tolerant(reservation_id).await;
        }

        info!(item_id = %item_id, cart_id = %item.cart_id, "Cart item removed");
        Ok(())
    }

    pub async fn get_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>, CartSessionError> {
        self.carts
            .list_items(cart_id)
            .await
            .map_err(CartSessionError::Storage)
    }

    /// Delete carts past their expiry, releasing any live item holds and
    /// dropping their session mappings. Returns the number of carts removed.
    pub async fn sweep_expired_carts(&self) -> Result<u64, CartSessionError> {
        let now = Utc::now();
        let expired = self
            .carts
            .expired_carts(now, 100)
            .await
            .map_err(CartSessionError::Storage)?;

        let mut removed: u64 = 0;
        for cart in expired {
            let items = self
                .carts
                .list_items(cart.id)
                .await
                .map_err(CartSessionError::Storage)?;
            for item in items {
                if let Some(reservation_id) = item.reservation_id {
                    self.release_hold_tolerant(reservation_id).await;
                }
            }

            if let Some(session_id) = &cart.session_id {
                let _ = self.store.delete(&session_mapping_key(session_id)).await;
            }

            self.carts
                .delete_cart(cart.id)
                .await
                .map_err(CartSessionError::Storage)?;
            removed += 1;
            info!(cart_id = %cart.id, "Expired cart swept");
        }

        Ok(removed)
    }

    /// Reset every live item hold on a cart to a full window and mirror the
    /// new expiry onto the rows. Runs after the migration has committed, so
    /// problems here are logged rather than failing the login; a lapsed hold
    /// is simply left for the sweep.
    async fn refresh_item_holds(&self, cart_id: Uuid) {
        let items = match self.carts.list_items(cart_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(cart_id = %cart_id, "Failed to list items for hold refresh: {}", e);
                return;
            }
        };

        let reserved_until = Utc::now() + Duration::seconds(self.ledger.hold_seconds() as i64);
        for item in items {
            let Some(reservation_id) = item.reservation_id else {
                continue;
            };
            match self.ledger.extend_reservation(reservation_id, None).await {
                Ok(()) => {
                    if let Err(e) = self
                        .carts
                        .update_item_hold(
                            item.id,
                            item.quantity,
                            Some(reservation_id),
                            Some(reserved_until),
                        )
                        .await
                    {
                        warn!(item_id = %item.id, "Failed to record refreshed hold: {}", e);
                    }
                }
                Err(ReservationError::NotFound(_)) => {
                    debug!(reservation_id = %reservation_id, "Hold already lapsed, not extended");
                }
                Err(e) => {
                    warn!(reservation_id = %reservation_id, "Failed to extend hold at login: {}", e);
                }
            }
        }
    }

    /// A hold that already lapsed by TTL is the expected case here, not an
    /// error; anything else is logged and left to the reservation sweep.
    async fn release_hold_tolerant(&self, reservation_id: Uuid) {
        match self.ledger.release_reservation(reservation_id).await {
            Ok(_) => {}
            Err(ReservationError::NotFound(_)) => {
                debug!(reservation_id = %reservation_id, "Hold already lapsed");
            }
            Err(e) => {
                warn!(reservation_id = %reservation_id, "Failed to release hold: {}", e);
            }
        }
    }

    /// Session-mapping writes are best-effort: the cart row is authoritative
    /// and a missing mapping only costs a column lookup.
    async fn write_session_mapping(
        &self,
        session_id: &str,
        cart_id: Uuid,
        expires_at: DateTime<Utc>,
    ) {
        let ttl = (expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            warn!(cart_id = %cart_id, "Computed non-positive session TTL, skipping mapping write");
            return;
        }
        if let Err(e) = self
            .store
            .set(
                &session_mapping_key(session_id),
                &cart_id.to_string(),
                Some(ttl as u64),
            )
            .await
        {
            warn!(cart_id = %cart_id, "Failed to write session mapping: {}", e);
        }
    }
}
