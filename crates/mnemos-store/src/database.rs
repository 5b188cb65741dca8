// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! embedded migrations.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use mnemos_core::MnemosError;
use tokio_rusqlite::Connection;

use crate::migrations::run_migrations;

/// Convert tokio_rusqlite errors into MnemosError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> MnemosError {
    MnemosError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single SQLite connection behind the memory subsystem.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, enable WAL and foreign
    /// keys, and run all pending migrations.
    pub async fn open(path: &str) -> Result<Self, MnemosError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database with the full schema. Test-friendly.
    pub async fn open_in_memory() -> Result<Self, MnemosError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, MnemosError> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        Ok(Self { conn })
    }

    /// Access the underlying connection for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the connection, flushing the WAL.
    pub async fn close(self) -> Result<(), MnemosError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}
