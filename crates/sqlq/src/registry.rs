//! Open database handles.
//!
//! The registry owns every connection from open to close. Tasks and
//! synchronous calls refer to connections by [`DbHandle`] only and resolve
//! them here at the moment they need the connection, so a closed handle turns
//! into an error instead of a dangling reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{Error, Result};

/// Opaque handle to an open connection. Handles are never reused within a
/// process, so a stale handle cannot alias a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DbHandle(pub u32);

impl DbHandle {
    /// Build from the integer a script passes around.
    pub fn from_raw(raw: i32) -> Self {
        DbHandle(raw as u32)
    }

    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection shared between the registry, the worker and synchronous callers.
pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Set of open connections, used for lookup and bulk close on shutdown.
pub struct HandleRegistry {
    connections: Mutex<HashMap<DbHandle, SharedConnection>>,
    next_handle: AtomicU32,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        HandleRegistry {
            connections: Mutex::new(HashMap::new()),
            next_handle: AtomicU32::new(1),
        }
    }

    /// Open `path` (or `":memory:"`) and register the connection.
    ///
    /// The engine's own busy handler is disabled: busy statuses are retried
    /// by the caller against its busy timeout.
    pub fn open(&self, path: &str) -> Result<DbHandle> {
        let open_error = |source| Error::Open {
            path: path.to_string(),
            source,
        };
        let conn = Connection::open(path).map_err(open_error)?;
        conn.busy_timeout(Duration::ZERO).map_err(open_error)?;

        let handle = DbHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.connections
            .lock()
            .insert(handle, Arc::new(Mutex::new(conn)));
        tracing::debug!(%handle, path, "opened database");
        Ok(handle)
    }

    /// Unregister and close `handle`.
    ///
    /// If the worker is still executing against the connection, the close
    /// completes when it lets go.
    pub fn close(&self, handle: DbHandle) -> Result<()> {
        let conn = self
            .connections
            .lock()
            .remove(&handle)
            .ok_or(Error::UnknownHandle(handle))?;

        match Arc::try_unwrap(conn) {
            Ok(conn) => conn
                .into_inner()
                .close()
                .map_err(|(_, source)| Error::Close { handle, source })?,
            Err(_in_use) => {
                tracing::debug!(%handle, "connection busy on worker, deferring close");
            }
        }
        tracing::debug!(%handle, "closed database");
        Ok(())
    }

    pub(crate) fn get(&self, handle: DbHandle) -> Option<SharedConnection> {
        self.connections.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: DbHandle) -> bool {
        self.connections.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every registered connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        let count = drained.len();
        for (handle, conn) in drained {
            if let Ok(conn) = Arc::try_unwrap(conn) {
                if let Err((_, err)) = conn.into_inner().close() {
                    tracing::warn!(%handle, error = %err, "failed to close database");
                }
            }
        }
        count
    }
}
