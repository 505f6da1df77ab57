use async_trait::async_trait;
use redis::AsyncCommands;
use velora_core::repository::{KeyValueStore, StoreResult};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl KeyValueStore for RedisClient {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        let value: Option<i64> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let new_value: i64 = conn.incr(key, amount).await?;
        Ok(new_value)
    }

    async fn try_decr_by(&self, key: &str, amount: i64) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        // Conditional decrement as a single server-side operation, so
        // concurrent callers for the same counter cannot jointly drive it
        // below zero. A missing key reads as zero and refuses.
        let script = redis::Script::new(
            r#"
            local current = tonumber(redis.call("GET", KEYS[1]) or "0")
            local amount = tonumber(ARGV[1])
            if current >= amount then
                return redis.call("DECRBY", KEYS[1], amount)
            else
                return nil
            end
        "#,
        );

        let new_value: Option<i64> = script.key(key).arg(amount).invoke_async(&mut conn).await?;
        Ok(new_value)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let remaining: i64 = conn.ttl(key).await?;
        Ok(remaining)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let applied: bool = conn.expire(key, ttl_seconds as i64).await?;
        Ok(applied)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}
