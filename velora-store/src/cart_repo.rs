use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use velora_core::cart::{Cart, CartItem};
use velora_core::repository::{CartRepository, StoreResult};

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<String>,
    session_id: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Cart {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    cart_id: Uuid,
    vehicle_id: Uuid,
    configuration_id: Option<Uuid>,
    quantity: i32,
    price_cents: Option<i64>,
    reservation_id: Option<Uuid>,
    reserved_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        CartItem {
            id: row.id,
            cart_id: row.cart_id,
            vehicle_id: row.vehicle_id,
            configuration_id: row.configuration_id,
            quantity: row.quantity.max(0) as u32,
            price_cents: row.price_cents,
            reservation_id: row.reservation_id,
            reserved_until: row.reserved_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn create_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, session_id, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cart.id)
        .bind(&cart.user_id)
        .bind(&cart.session_id)
        .bind(cart.expires_at)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_cart(&self, cart_id: Uuid) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            "SELECT id, user_id, session_id, expires_at, created_at, updated_at FROM carts WHERE id = $1",
        )
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Cart::from))
    }

    async fn find_cart_by_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, session_id, expires_at, created_at, updated_at
            FROM carts WHERE session_id = $1 AND expires_at > $2
            "#,
        )
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Cart::from))
    }

    async fn find_cart_by_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, session_id, expires_at, created_at, updated_at
            FROM carts WHERE user_id = $1 AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Cart::from))
    }

    async fn set_cart_expiration(
        &self,
        cart_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE carts SET expires_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(expires_at)
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn convert_cart_to_user(
        &self,
        cart_id: Uuid,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE carts
            SET user_id = $1, session_id = NULL, expires_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(user_id)
        .bind(expires_at)
        .bind(cart_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn merge_carts(
        &self,
        source_cart_id: Uuid,
        target_cart_id: Uuid,
        target_expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Single transaction: a failure at any step leaves both carts intact.
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE cart_items SET cart_id = $1, updated_at = NOW() WHERE cart_id = $2")
            .bind(target_cart_id)
            .bind(source_cart_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(source_cart_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET expires_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(target_expires_at)
            .bind(target_cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expired_carts(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Cart>> {
        let rows = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, session_id, expires_at, created_at, updated_at
            FROM carts WHERE expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Cart::from).collect())
    }

    async fn add_item(&self, item: &CartItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items
                (id, cart_id, vehicle_id, configuration_id, quantity, price_cents,
                 reservation_id, reserved_until, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id)
        .bind(item.cart_id)
        .bind(item.vehicle_id)
        .bind(item.configuration_id)
        .bind(item.quantity as i32)
        .bind(item.price_cents)
        .bind(item.reservation_id)
        .bind(item.reserved_until)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_item(&self, item_id: Uuid) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, cart_id, vehicle_id, configuration_id, quantity, price_cents,
                   reservation_id, reserved_until, created_at, updated_at
            FROM cart_items WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CartItem::from))
    }

    async fn list_items(&self, cart_id: Uuid) -> StoreResult<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, cart_id, vehicle_id, configuration_id, quantity, price_cents,
                   reservation_id, reserved_until, created_at, updated_at
            FROM cart_items WHERE cart_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn update_item_hold(
        &self,
        item_id: Uuid,
        quantity: u32,
        reservation_id: Option<Uuid>,
        reserved_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = $1, reservation_id = $2, reserved_until = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(quantity as i32)
        .bind(reservation_id)
        .bind(reserved_until)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
