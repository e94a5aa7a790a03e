//! Cache store abstraction with a Redis implementation

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio::time::Instant;

use gatehouse_core::RedisConfig;

use crate::error::StartupError;

/// How long startup waits for the cache to answer PING.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid cache address '{0}', expected host:port")]
    InvalidAddr(String),
}

/// Key/value cache used by repositories
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Redis-backed cache over a reconnecting multiplexed connection
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(conf: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_info(conf)?)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn connection_info(conf: &RedisConfig) -> Result<ConnectionInfo, CacheError> {
    let (host, port) = conf
        .addr
        .rsplit_once(':')
        .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
        .filter(|(host, _)| !host.is_empty())
        .ok_or_else(|| CacheError::InvalidAddr(conf.addr.clone()))?;

    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host.to_string(), port),
        redis: RedisConnectionInfo {
            db: conf.db,
            password: (!conf.password.is_empty()).then(|| conf.password.clone()),
            ..Default::default()
        },
    })
}

/// Connect to Redis and require a PING reply within [`CONNECT_TIMEOUT`].
pub async fn new_redis(conf: &RedisConfig) -> Result<RedisCache, StartupError> {
    tracing::info!(addr = %conf.addr, db = conf.db, "connecting to redis");

    let connect = async {
        let cache = RedisCache::connect(conf).await?;
        cache.ping().await?;
        Ok::<_, CacheError>(cache)
    };

    let cache = tokio::time::timeout(CONNECT_TIMEOUT, connect)
        .await
        .map_err(|_| StartupError::CacheTimeout(CONNECT_TIMEOUT))??;

    tracing::info!("redis connected");
    Ok(cache)
}

/// In-process cache with TTL, for tests and single-node development
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|(_, expires)| *expires > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Keys written once and never read again are dropped here.
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
