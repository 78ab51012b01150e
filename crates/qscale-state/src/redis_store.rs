//! Redis-backed timer store.
//!
//! For fleets where the autoscaler may run on more than one host, the
//! timer lives in a shared Redis database instead of a local redb file.
//! A connection is opened per tick; failing to reach the server puts the
//! tick in degraded mode exactly like a missing redb file.

use std::sync::Mutex;
use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{StoreConnector, TimerStore};

/// Opens a Redis connection at the start of every tick.
pub struct RedisConnector {
    client: redis::Client,
    timeout: Duration,
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The connection info may carry a password.
        f.debug_struct("RedisConnector")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisConnector {
    /// `timeout` bounds the connect and every command afterwards.
    pub fn new(
        host: &str,
        port: u16,
        db: u32,
        password: Option<&str>,
        timeout: Duration,
    ) -> StateResult<Self> {
        let url = connection_url(host, port, db, password);
        let client = redis::Client::open(url.as_str()).map_err(|e| StateError::Open(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

fn connection_url(host: &str, port: u16, db: u32, password: Option<&str>) -> String {
    match password {
        Some(pw) => format!(
            "redis://:{}@{host}:{port}/{db}",
            utf8_percent_encode(pw, NON_ALPHANUMERIC)
        ),
        None => format!("redis://{host}:{port}/{db}"),
    }
}

impl StoreConnector for RedisConnector {
    fn connect(&self) -> StateResult<Box<dyn TimerStore>> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        conn.set_write_timeout(Some(self.timeout))
            .map_err(|e| StateError::Unavailable(e.to_string()))?;
        debug!("redis timer store connected");
        Ok(Box::new(RedisStore {
            conn: Mutex::new(conn),
        }))
    }
}

struct RedisStore {
    conn: Mutex<redis::Connection>,
}

impl RedisStore {
    fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> redis::RedisResult<T> {
        let mut conn = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cmd.query(&mut *conn)
    }
}

impl TimerStore for RedisStore {
    fn get(&self, key: &str) -> StateResult<Option<String>> {
        self.query(redis::cmd("GET").arg(key))
            .map_err(|e| StateError::Read(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> StateResult<()> {
        self.query::<()>(redis::cmd("SET").arg(key).arg(value))
            .map_err(|e| StateError::Write(e.to_string()))?;
        debug!(%key, %value, "timer stored");
        Ok(())
    }

    fn delete(&self, key: &str) -> StateResult<bool> {
        let removed: i64 = self
            .query(redis::cmd("DEL").arg(key))
            .map_err(|e| StateError::Write(e.to_string()))?;
        debug!(%key, existed = removed > 0, "timer deleted");
        Ok(removed > 0)
    }
}
