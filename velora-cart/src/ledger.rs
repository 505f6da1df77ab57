use std::sync::Arc;

use chrono::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use velora_core::error::ReservationError;
use velora_core::repository::KeyValueStore;
use velora_core::reservation::{Reservation, ReservationHold, ReservationHolder};

pub fn reservation_key(id: Uuid) -> String {
    format!("reservation:{}", id)
}

pub fn reservation_hold_key(id: Uuid) -> String {
    format!("reservation_hold:{}", id)
}

pub fn availability_key(vehicle_id: Uuid) -> String {
    format!("vehicle:{}:availability", vehicle_id)
}

/// Grants, tracks, extends and releases short-lived holds on inventory
/// quantity, backed by atomic counters in the key-value store.
///
/// Each reservation is two documents: the primary record at
/// `reservation:{id}` carrying the store TTL, and a non-expiring companion at
/// `reservation_hold:{id}` holding just `{vehicle_id, quantity}`. The
/// companion is what lets the cleanup sweep credit back holds that lapsed by
/// TTL without an explicit release. Crediting is linearized on key deletion:
/// whoever actually removes a key is the one that moves the counter, so
/// concurrent release/sweep cannot double-credit.
pub struct ReservationLedger {
    store: Arc<dyn KeyValueStore>,
    hold_seconds: u64,
}

impl ReservationLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, hold_seconds: u64) -> Self {
        Self {
            store,
            hold_seconds,
        }
    }

    pub fn hold_seconds(&self) -> u64 {
        self.hold_seconds
    }

    /// Attempt a time-boxed hold on `quantity` units of a vehicle.
    ///
    /// The availability check and decrement are a single conditional store
    /// operation, so concurrent callers for the same vehicle cannot jointly
    /// oversell its stock.
    pub async fn create_reservation(
        &self,
        vehicle_id: Uuid,
        quantity: u32,
        holder: ReservationHolder,
    ) -> Result<Reservation, ReservationError> {
        if quantity == 0 {
            return Err(ReservationError::InvalidQuantity(quantity));
        }

        let counter = availability_key(vehicle_id);
        let available = self.check_availability(vehicle_id).await?;

        let decremented = self
            .store
            .try_decr_by(&counter, quantity as i64)
            .await
            .map_err(ReservationError::Store)?;

        if decremented.is_none() {
            return Err(ReservationError::InsufficientInventory {
                vehicle_id,
                requested: quantity,
                available,
            });
        }

        let reservation = Reservation::new(vehicle_id, quantity, holder, self.hold_seconds);

        // Companion first: once the counter is decremented, some durable
        // record must point back at the held quantity or the sweep can never
        // reconcile it.
        let hold = ReservationHold {
            vehicle_id,
            quantity,
        };
        let hold_doc = serde_json::to_string(&hold).map_err(|e| ReservationError::Store(e.into()))?;
        if let Err(e) = self
            .store
            .set(&reservation_hold_key(reservation.id), &hold_doc, None)
            .await
        {
            // Without a companion the sweep can never find this decrement, so
            // a failed compensation leaves the counter short until a reseed.
            if let Err(credit_err) = self.store.incr_by(&counter, quantity as i64).await {
                error!(
                    vehicle_id = %vehicle_id,
                    quantity,
                    "Failed to credit counter back after companion write failure, reseed required: {}",
                    credit_err
                );
            }
            return Err(ReservationError::Store(e));
        }

        let doc =
            serde_json::to_string(&reservation).map_err(|e| ReservationError::Store(e.into()))?;
        if let Err(e) = self
            .store
            .set(&reservation_key(reservation.id), &doc, Some(self.hold_seconds))
            .await
        {
            // Counter already moved and the companion is in place, so the
            // next sweep will credit this back.
            warn!(
                reservation_id = %reservation.id,
                vehicle_id = %vehicle_id,
                "Reservation record write failed after decrement, sweep will reconcile"
            );
            return Err(ReservationError::Store(e));
        }

        info!(
            reservation_id = %reservation.id,
            vehicle_id = %vehicle_id,
            quantity,
            holder = holder_label(&reservation.holder),
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Release a hold and credit its quantity back to the available pool.
    /// Releasing an id that no longer exists fails with `NotFound` and never
    /// double-credits.
    pub async fn release_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Reservation, ReservationError> {
        let key = reservation_key(reservation_id);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(ReservationError::Store)?
            .ok_or(ReservationError::NotFound(reservation_id))?;

        let reservation: Reservation =
            serde_json::from_str(&raw).map_err(|e| ReservationError::Store(e.into()))?;

        // Only the caller whose delete removed the record proceeds; a
        // concurrent release of the same id observes `false` here.
        let owned = self
            .store
            .delete(&key)
            .await
            .map_err(ReservationError::Store)?;
        if !owned {
            return Err(ReservationError::NotFound(reservation_id));
        }

        // The companion delete is the credit point, shared with the sweep.
        let credited = self
            .store
            .delete(&reservation_hold_key(reservation_id))
            .await
            .map_err(ReservationError::Store)?;
        if credited {
            self.store
                .incr_by(
                    &availability_key(reservation.vehicle_id),
                    reservation.quantity as i64,
                )
                .await
                .map_err(ReservationError::Store)?;
        }

        info!(
            reservation_id = %reservation_id,
            vehicle_id = %reservation.vehicle_id,
            quantity = reservation.quantity,
            "Reservation released"
        );
        Ok(reservation)
    }

    /// Current available count; a missing or negative counter reads as zero.
    pub async fn check_availability(&self, vehicle_id: Uuid) -> Result<i64, ReservationError> {
        let value = self
            .store
            .get_i64(&availability_key(vehicle_id))
            .await
            .map_err(ReservationError::Store)?;
        Ok(value.unwrap_or(0).max(0))
    }

    /// The stored record plus remaining TTL in seconds. The store TTL is
    /// authoritative for expiry; the record's `expires_at` is not rewritten
    /// on extension.
    pub async fn get_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<(Reservation, i64)>, ReservationError> {
        let key = reservation_key(reservation_id);
        let raw = match self.store.get(&key).await.map_err(ReservationError::Store)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let reservation: Reservation =
            serde_json::from_str(&raw).map_err(|e| ReservationError::Store(e.into()))?;
        let remaining = self.store.ttl(&key).await.map_err(ReservationError::Store)?;
        Ok(Some((reservation, remaining.max(0))))
    }

    /// Reset the hold's TTL to `additional` or the default. Quantity and
    /// holder are immutable after creation.
    pub async fn extend_reservation(
        &self,
        reservation_id: Uuid,
        additional: Option<Duration>,
    ) -> Result<(), ReservationError> {
        let ttl = additional
            .map(|d| d.num_seconds().max(0) as u64)
            .unwrap_or(self.hold_seconds);

        let applied = self
            .store
            .expire(&reservation_key(reservation_id), ttl)
            .await
            .map_err(ReservationError::Store)?;
        if !applied {
            return Err(ReservationError::NotFound(reservation_id));
        }

        info!(reservation_id = %reservation_id, ttl_seconds = ttl, "Reservation extended");
        Ok(())
    }

    /// Reconcile holds whose primary record lapsed by TTL without an explicit
    /// release, crediting their quantity back to the available pool. Also
    /// re-imposes the default TTL on any record found persisted without one.
    /// Returns the number of holds credited.
    pub async fn cleanup_expired_reservations(&self) -> Result<u64, ReservationError> {
        let mut reconciled: u64 = 0;

        let companions = self
            .store
            .scan_prefix("reservation_hold:")
            .await
            .map_err(ReservationError::Store)?;

        for companion_key in companions {
            let id = match companion_key
                .strip_prefix("reservation_hold:")
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                Some(id) => id,
                None => {
                    warn!(key = %companion_key, "Skipping malformed reservation hold key");
                    continue;
                }
            };

            if self
                .store
                .exists(&reservation_key(id))
                .await
                .map_err(ReservationError::Store)?
            {
                continue; // hold is still live
            }

            let raw = match self
                .store
                .get(&companion_key)
                .await
                .map_err(ReservationError::Store)?
            {
                Some(raw) => raw,
                None => continue, // released concurrently
            };
            let hold: ReservationHold = match serde_json::from_str(&raw) {
                Ok(hold) => hold,
                Err(e) => {
                    // One bad document must not starve the rest of the sweep
                    warn!(key = %companion_key, "Skipping unreadable reservation hold: {}", e);
                    continue;
                }
            };

            // Same credit linearization as release: only the deleter credits.
            if self
                .store
                .delete(&companion_key)
                .await
                .map_err(ReservationError::Store)?
            {
                self.store
                    .incr_by(&availability_key(hold.vehicle_id), hold.quantity as i64)
                    .await
                    .map_err(ReservationError::Store)?;
                reconciled += 1;
                info!(
                    reservation_id = %id,
                    vehicle_id = %hold.vehicle_id,
                    quantity = hold.quantity,
                    "Credited lapsed reservation back to available pool"
                );
            }
        }

        // A reservation record must never sit without a TTL.
        let records = self
            .store
            .scan_prefix("reservation:")
            .await
            .map_err(ReservationError::Store)?;
        for key in records {
            let remaining = self.store.ttl(&key).await.map_err(ReservationError::Store)?;
            if remaining == -1 {
                warn!(key = %key, "Reservation record had no TTL, imposing default");
                let _ = self.store.expire(&key, self.hold_seconds).await;
            }
        }

        Ok(reconciled)
    }

    /// Administrative reseed of a vehicle's availability counter, used when
    /// the authoritative relational inventory count changes.
    pub async fn set_inventory_availability(
        &self,
        vehicle_id: Uuid,
        quantity: u32,
    ) -> Result<(), ReservationError> {
        self.store
            .set_i64(&availability_key(vehicle_id), quantity as i64)
            .await
            .map_err(ReservationError::Store)?;
        info!(vehicle_id = %vehicle_id, quantity, "Inventory availability seeded");
        Ok(())
    }
}

fn holder_label(holder: &ReservationHolder) -> &'static str {
    match holder {
        ReservationHolder::User(_) => "user",
        ReservationHolder::Session(_) => "session",
    }
}
