//! Fixed-size SQLite connection pool.
//!
//! Idle connections sit in a bounded channel. `get` takes one out and the
//! returned guard sends it back when dropped, whatever path the caller exits
//! through.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rusqlite::Connection;

use crate::error::StorageError;

pub struct ConnectionPool {
    idle_tx: Sender<Connection>,
    idle_rx: Receiver<Connection>,
    size: usize,
    checkout_timeout: Duration,
}

impl ConnectionPool {
    /// Open `size` connections up front with `open`.
    pub fn build<F>(size: usize, checkout_timeout: Duration, mut open: F) -> Result<Self, StorageError>
    where
        F: FnMut() -> Result<Connection, StorageError>,
    {
        let size = size.max(1);
        let (idle_tx, idle_rx) = bounded(size);
        for _ in 0..size {
            let conn = open()?;
            // capacity is `size`, so this never blocks
            let _ = idle_tx.send(conn);
        }

        tracing::debug!(size, "connection pool ready");

        Ok(ConnectionPool {
            idle_tx,
            idle_rx,
            size,
            checkout_timeout,
        })
    }

    pub fn get(&self) -> Result<PooledConnection<'_>, StorageError> {
        match self.idle_rx.recv_timeout(self.checkout_timeout) {
            Ok(conn) => Ok(PooledConnection {
                conn: Some(conn),
                pool: self,
            }),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(timeout = ?self.checkout_timeout, "connection pool exhausted");
                Err(StorageError::PoolTimeout(self.checkout_timeout))
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PooledConnection<'a> {
    // `Some` from checkout until `drop` takes it back to the pool
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.pool.idle_tx.send(conn);
        }
    }
}
