//! Connection pool
//!
//! Maps an address key (`scheme://host:port`) to at most one connection.
//! Presence in the pool means the connection is believed open and idle; the
//! pool never checks, a dead connection is found out when it is next used.

use super::connection::{lock, Connection};
use super::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A shared connection as stored in the pool
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Connection pool
///
/// Lookup and insertion happen under one lock, so two callers asking for
/// the same key never both establish a connection. The lock is held while
/// a missing connection is established.
#[derive(Debug, Default)]
pub struct Pool {
    slots: Mutex<HashMap<String, SharedConnection>>,
}

impl Pool {
    pub fn new() -> Self {
        Pool::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, SharedConnection>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the pooled connection for `key`, or establish and pool a new one
    ///
    /// Returns the connection and whether it came from the pool. A failed
    /// `establish` leaves the pool unchanged.
    pub fn acquire<F>(&self, key: &str, establish: F) -> Result<(SharedConnection, bool)>
    where
        F: FnOnce() -> Result<Connection>,
    {
        let mut slots = self.slots();

        if let Some(conn) = slots.get(key) {
            return Ok((Arc::clone(conn), true));
        }

        let conn = Arc::new(Mutex::new(establish()?));
        slots.insert(key.to_string(), Arc::clone(&conn));
        Ok((conn, false))
    }

    /// Remove `conn` from the pool
    ///
    /// Entries are matched by identity, so a newer connection pooled under
    /// the same key is left alone. Returns whether anything was removed.
    pub fn evict(&self, conn: &SharedConnection) -> bool {
        let mut slots = self.slots();

        let key = slots
            .iter()
            .find(|(_, pooled)| Arc::ptr_eq(pooled, conn))
            .map(|(key, _)| key.clone());

        match key {
            Some(key) => {
                slots.remove(&key);
                log::debug!("evicted connection for {}", key);
                true
            }
            None => false,
        }
    }

    /// Evict and close every pooled connection
    ///
    /// Connections currently in use are closed once their user releases
    /// them.
    pub fn close_all(&self) {
        let drained: Vec<(String, SharedConnection)> = self.slots().drain().collect();

        for (key, conn) in drained {
            if let Err(e) = lock(&conn).close() {
                log::debug!("closing connection for {}: {}", key, e);
            }
        }
    }

    /// Whether a connection is pooled under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.slots().contains_key(key)
    }

    /// The connection pooled under `key`, if any
    pub fn get(&self, key: &str) -> Option<SharedConnection> {
        self.slots().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}
