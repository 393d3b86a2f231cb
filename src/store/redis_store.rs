#[cfg(feature = "redis-store")]
use crate::store::traits::{KeyStore, ScanPage, StoreError};
#[cfg(feature = "redis-store")]
use async_trait::async_trait;
#[cfg(feature = "redis-store")]
use redis::aio::ConnectionManager;
#[cfg(feature = "redis-store")]
use redis::IntoConnectionInfo;

#[cfg(feature = "redis-store")]
fn command_err(e: redis::RedisError) -> StoreError {
    StoreError::Command(e.to_string())
}

/// Redis-backed store using `SCAN ... MATCH ... COUNT ...`.
///
/// `ConnectionManager` multiplexes one connection and reconnects on its own; it is cheap to
/// clone, so every command works on a clone instead of locking a shared connection.
#[cfg(feature = "redis-store")]
#[derive(Clone)]
pub struct RedisKeyStore {
    conn: ConnectionManager,
    target: String,
}

#[cfg(feature = "redis-store")]
impl RedisKeyStore {
    pub async fn connect(url: &str, username: Option<&str>, password: Option<&str>) -> Result<Self, StoreError> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| StoreError::Connection(format!("bad store url: {}", e)))?;
        if let Some(u) = username {
            info.redis.username = Some(u.to_string());
        }
        if let Some(p) = password {
            info.redis.password = Some(p.to_string());
        }
        let target = format!("{:?}", info.addr);
        let client = redis::Client::open(info).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", target, e)))?;
        Ok(Self { conn, target })
    }
}

#[cfg(feature = "redis-store")]
#[async_trait]
impl KeyStore for RedisKeyStore {
    fn name(&self) -> String {
        "redis".into()
    }

    async fn scan_page(&self, cursor: u64, pattern: &str, count_hint: usize) -> Result<ScanPage, StoreError> {
        let mut conn = self.conn.clone();
        // keys are binary-safe on the server side
        let (next, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count_hint)
            .query_async(&mut conn)
            .await
            .map_err(command_err)?;
        Ok(ScanPage::from_raw_keys(keys, next))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(command_err)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET").arg(key).arg(value).query_async(&mut conn).await.map_err(command_err)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(command_err)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let n: u64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await.map_err(command_err)?;
        Ok(n > 0)
    }

    async fn touch(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let n: u64 = redis::cmd("TOUCH").arg(key).query_async(&mut conn).await.map_err(command_err)?;
        Ok(n > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", self.target, e)))?;
        Ok(())
    }
}
