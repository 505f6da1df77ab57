#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use velora_cart::ReservationLedger;
use velora_core::cart::{Cart, CartItem};
use velora_core::repository::{CartRepository, KeyValueStore, StoreResult};
use velora_core::reservation::DEFAULT_HOLD_SECONDS;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |t| Instant::now() < t)
    }
}

/// In-memory stand-in for the redis adapter, with real TTL semantics so the
/// lifecycle paths behave as they would against the store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a key as if its TTL lapsed, without waiting for wall time.
    pub fn force_expire(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl_seconds.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key).filter(|e| e.live()) {
            Some(e) => Ok(Some(e.value.parse::<i64>()?)),
            None => Ok(None),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        self.set(key, &value.to_string(), None).await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock().unwrap();
        let current = entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.parse::<i64>())
            .transpose()?
            .unwrap_or(0);
        let next = current + amount;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn try_decr_by(&self, key: &str, amount: i64) -> StoreResult<Option<i64>> {
        let mut entries = self.entries.lock().unwrap();
        let current = entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.parse::<i64>())
            .transpose()?
            .unwrap_or(0);
        if current < amount {
            return Ok(None);
        }
        let next = current - amount;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(Some(next))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let was_live = entries.remove(key).map_or(false, |e| e.live());
        Ok(was_live)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).is_some_and(|e| e.live()))
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key).filter(|e| e.live()) {
            None => Ok(-2),
            Some(Entry {
                expires_at: None, ..
            }) => Ok(-1),
            Some(Entry {
                expires_at: Some(t),
                ..
            }) => Ok(t.saturating_duration_since(Instant::now()).as_secs() as i64),
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key).filter(|e| e.live()) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.live())
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Delegates to a `MemoryStore` but rejects writes to keys under registered
/// prefixes, for driving the partial-failure paths.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_set_prefixes: Mutex<Vec<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_set_for(&self, prefix: &str) {
        self.fail_set_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let blocked = self
            .fail_set_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| key.starts_with(p.as_str()));
        if blocked {
            return Err(format!("injected write failure for {}", key).into());
        }
        self.inner.set(key, value, ttl_seconds).await
    }

    async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        self.inner.get_i64(key).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        self.inner.set_i64(key, value).await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.inner.incr_by(key, amount).await
    }

    async fn try_decr_by(&self, key: &str, amount: i64) -> StoreResult<Option<i64>> {
        self.inner.try_decr_by(key, amount).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        self.inner.expire(key, ttl_seconds).await
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

/// In-memory stand-in for the Postgres cart repository. Mutations take the
/// locks for the whole operation, mirroring the transactional guarantees of
/// the real implementation.
#[derive(Default)]
pub struct MemoryCartRepository {
    carts: Mutex<HashMap<Uuid, Cart>>,
    items: Mutex<HashMap<Uuid, CartItem>>,
}

impl MemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for MemoryCartRepository {
    async fn create_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.carts.lock().unwrap().insert(cart.id, cart.clone());
        Ok(())
    }

    async fn find_cart(&self, cart_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self.carts.lock().unwrap().get(&cart_id).cloned())
    }

    async fn find_cart_by_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Cart>> {
        Ok(self
            .carts
            .lock()
            .unwrap()
            .values()
            .find(|c| c.session_id.as_deref() == Some(session_id) && c.expires_at > now)
            .cloned())
    }

    async fn find_cart_by_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Cart>> {
        Ok(self
            .carts
            .lock()
            .unwrap()
            .values()
            .find(|c| c.user_id.as_deref() == Some(user_id) && c.expires_at > now)
            .cloned())
    }

    async fn set_cart_expiration(
        &self,
        cart_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut carts = self.carts.lock().unwrap();
        if let Some(cart) = carts.get_mut(&cart_id) {
            cart.expires_at = expires_at;
            cart.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn convert_cart_to_user(
        &self,
        cart_id: Uuid,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut carts = self.carts.lock().unwrap();
        if let Some(cart) = carts.get_mut(&cart_id) {
            cart.user_id = Some(user_id.to_string());
            cart.session_id = None;
            cart.expires_at = expires_at;
            cart.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn merge_carts(
        &self,
        source_cart_id: Uuid,
        target_cart_id: Uuid,
        target_expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut carts = self.carts.lock().unwrap();
        let mut items = self.items.lock().unwrap();

        for item in items.values_mut() {
            if item.cart_id == source_cart_id {
                item.cart_id = target_cart_id;
                item.updated_at = Utc::now();
            }
        }
        carts.remove(&source_cart_id);
        if let Some(target) = carts.get_mut(&target_cart_id) {
            target.expires_at = target_expires_at;
            target.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        self.carts.lock().unwrap().remove(&cart_id);
        // cascade
        self.items.lock().unwrap().retain(|_, i| i.cart_id != cart_id);
        Ok(())
    }

    async fn expired_carts(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Cart>> {
        let mut expired: Vec<Cart> = self
            .carts
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|c| c.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn add_item(&self, item: &CartItem) -> StoreResult<()> {
        self.items.lock().unwrap().insert(item.id, item.clone());
        Ok(())
    }

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        Ok(self.items.lock().unwrap().get(&item_id).cloned())
    }

    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn update_item_hold(
        &self,
        item_id: Uuid,
        quantity: u32,
        reservation_id: Option<Uuid>,
        reserved_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.get_mut(&item_id) {
            item.quantity = quantity;
            item.reservation_id = reservation_id;
            item.reserved_until = reserved_until;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> StoreResult<bool> {
        Ok(self.items.lock().unwrap().remove(&item_id).is_some())
    }
}

pub fn ledger_with_store() -> (Arc<MemoryStore>, Arc<ReservationLedger>) {
    let store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let ledger = Arc::new(ReservationLedger::new(kv, DEFAULT_HOLD_SECONDS));
    (store, ledger)
}
